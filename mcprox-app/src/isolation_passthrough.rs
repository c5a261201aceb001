//! Default `DockerIsolation` (spec §6): a concrete Docker backend is out
//! of scope ("consumed, not defined here"), so this crate ships the
//! faithful no-op — it honors `UpstreamRecord.isolation` by reporting
//! whether isolation was requested, but never actually starts a
//! container. An embedder that wires a real Docker backend supplies its
//! own `DockerIsolation` to `Collaborators` instead.

use mcprox_core::model::{IsolationConfig, UpstreamRecord};
use mcprox_core::Result;
use mcprox_upstream::isolation::{ContainerStats, DockerIsolation, IsolatedProcessHandle};

#[derive(Default)]
pub struct PassthroughIsolation;

#[async_trait::async_trait]
impl DockerIsolation for PassthroughIsolation {
    fn should_isolate(&self, config: &UpstreamRecord) -> bool {
        config.isolation.as_ref().map(|i| i.enabled).unwrap_or(false)
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
