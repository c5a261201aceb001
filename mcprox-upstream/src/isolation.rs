//! Docker isolation interface (spec §6): "`ShouldIsolate`,
//! `StartIsolatedCommand`, `Stop`, `Cleanup`, `SetResourceLimits`,
//! `GetContainerStats`, `GetDefaultImage`, `SetDefaultImages`." A concrete
//! Docker-backed implementation is out of this crate's scope; `UpstreamClient`
//! only needs the subset used during `connect()`.

use async_trait::async_trait;
use mcprox_core::model::{IsolationConfig, UpstreamRecord};
use mcprox_core::Result;

#[derive(Debug, Clone, Default)]
pub struct ContainerStats {
    pub cpu_percent: f64,
    pub memory_bytes: u64,
}

/// Handle to a process running inside (or outside, if not isolated) a
/// container; `UpstreamClient` holds one per subprocess transport.
pub struct IsolatedProcessHandle {
    pub container_id: Option<String>,
}

#[async_trait]
pub trait DockerIsolation: Send + Sync {
    fn should_isolate(&self, config: &UpstreamRecord) -> bool;

    async fn start_isolated_command(
        &self,
        config: &UpstreamRecord,
        isolation: &IsolationConfig,
    ) -> Result<IsolatedProcessHandle>;

    async fn stop(&self, handle: &IsolatedProcessHandle) -> Result<()>;
    async fn cleanup(&self, handle: &IsolatedProcessHandle) -> Result<()>;
    async fn container_stats(&self, handle: &IsolatedProcessHandle) -> Result<ContainerStats>;
    fn default_image(&self) -> &str;

    /// Updates the CPU/memory caps applied to isolated launches started
    /// after this call (spec §6 `SetResourceLimits`).
    fn set_resource_limits(&self, limits: &IsolationConfig);

    /// Overrides the image `default_image()` reports until changed again
    /// (spec §6 `SetDefaultImages`).
    fn set_default_image(&self, image: &str);
}

#[cfg(any(test, feature = "test-util"))]
pub mod test_double {
    use super::*;

    /// Never isolates; every `UpstreamClient` test that doesn't care about
    /// Docker can use this.
    #[derive(Default)]
    pub struct NoIsolation;

    #[async_trait]
    impl DockerIsolation for NoIsolation {
        fn should_isolate(&self, _config: &UpstreamRecord) -> bool {
            false
        }

        async fn start_isolated_command(
            &self,
            _config: &UpstreamRecord,
            _isolation: &IsolationConfig,
        ) -> Result<IsolatedProcessHandle> {
            Ok(IsolatedProcessHandle { container_id: None })
        }

        async fn stop(&self, _handle: &IsolatedProcessHandle) -> Result<()> {
            Ok(())
        }

        async fn cleanup(&self, _handle: &IsolatedProcessHandle) -> Result<()> {
            Ok(())
        }

        async fn container_stats(&self, _handle: &IsolatedProcessHandle) -> Result<ContainerStats> {
            Ok(ContainerStats::default())
        }

        fn default_image(&self) -> &str {
            "mcprox/isolated-runtime:latest"
        }

        fn set_resource_limits(&self, _limits: &IsolationConfig) {}

        fn set_default_image(&self, _image: &str) {}
    }
}
