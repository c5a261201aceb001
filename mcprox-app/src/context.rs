//! `AppContext` (spec §4.7): wires every component in a fixed order and
//! closes them in strict reverse, aggregating the *last* close error
//! without ever treating a close failure as fatal. Grounded on the
//! teacher's `ratchet_resilience::shutdown::ShutdownCoordinator`, adapted
//! from its escalating-signal model to the much simpler ordered-teardown
//! contract this spec calls for.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use mcprox_activity::ActivityLog;
use mcprox_config::ProxyConfig;
use mcprox_core::{Error, Result};
use mcprox_identity::IdentityEngine;
use mcprox_store::{AsyncQueue, AsyncQueueHandle, Store};
use mcprox_upstream::client::TransportFactory;
use mcprox_upstream::index::{IndexSink, NullIndexSink};
use mcprox_upstream::oauth::OAuthCollaborator;
use mcprox_upstream::{isolation::DockerIsolation, UpstreamManager};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cache::{Cache, StoreCache};
use crate::isolation_passthrough::PassthroughIsolation;
use crate::logging::LogManager;
use crate::oauth_store::StoreBackedOAuth;

/// Everything an embedder needs to hand `AppContext::new` that this crate
/// cannot itself construct: the upstream transport library and any
/// caller-supplied OAuth/Docker collaborators, all explicitly "consumed,
/// not defined" by spec §6. Omitted fields fall back to this crate's own
/// store-backed defaults.
pub struct Collaborators {
    pub transport_factory: Arc<dyn TransportFactory>,
    pub oauth: Option<Arc<dyn OAuthCollaborator>>,
    pub isolation: Option<Arc<dyn DockerIsolation>>,
    pub index: Option<Arc<dyn IndexSink>>,
}

pub struct AppContext {
    store: Store,
    queue: std::sync::Mutex<Option<AsyncQueueHandle>>,
    identity: IdentityEngine,
    activity: ActivityLog,
    upstream: Arc<UpstreamManager>,
    index: Arc<dyn IndexSink>,
    cache: Arc<dyn Cache>,
    logs: LogManager,
    config: ProxyConfig,
    background: std::sync::Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl AppContext {
    /// Constructs components in the order spec §4.7 names: Store, then
    /// IndexSink, then UpstreamManager (given Store and the externally
    /// supplied transport collaborator), then Cache, then the OAuth
    /// token-store manager and Docker isolation (built here, defaulting to
    /// this crate's store-backed/passthrough implementations, since
    /// UpstreamManager's own constructor requires them as arguments before
    /// Cache is built — see DESIGN.md), then the log manager last.
    pub fn new(config: ProxyConfig, collaborators: Collaborators) -> Result<Self> {
        config
            .validate()
            .map_err(|e| Error::invalid_config(e.to_string()))?;

        let store = Store::open_with_timeout(
            &config.store.path,
            Duration::from_secs(config.store.open_timeout_secs),
        )?;
        let index: Arc<dyn IndexSink> = collaborators.index.unwrap_or_else(|| Arc::new(NullIndexSink));

        let queue = AsyncQueue::start(store.clone(), config.store.queue_capacity);
        let identity = IdentityEngine::new(store.clone());
        let activity = ActivityLog::new(store.clone(), config.activity.clone());

        let oauth = collaborators
            .oauth
            .unwrap_or_else(|| Arc::new(StoreBackedOAuth::new(store.clone())));
        let isolation = collaborators
            .isolation
            .unwrap_or_else(|| Arc::new(PassthroughIsolation));

        let upstream = Arc::new(UpstreamManager::new(
            store.clone(),
            queue.queue(),
            activity.clone(),
            config.upstream.clone(),
            collaborators.transport_factory,
            oauth,
            isolation,
            index.clone(),
        ));

        let cache: Arc<dyn Cache> = Arc::new(StoreCache::new(store.clone()));
        let logs = LogManager::init("info");

        let mut ctx = Self {
            store,
            queue: std::sync::Mutex::new(Some(queue)),
            identity,
            activity,
            upstream,
            index,
            cache,
            logs,
            config,
            background: std::sync::Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        };
        ctx.spawn_background_tasks();
        Ok(ctx)
    }

    fn spawn_background_tasks(&mut self) {
        if self.config.identity.auto_cleanup_enabled {
            let identity = self.identity.clone();
            let threshold = ChronoDuration::seconds(self.config.identity.stale_threshold_secs as i64);
            let interval = Duration::from_secs(self.config.identity.cleanup_interval_secs);
            let handle = tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    ticker.tick().await;
                    match identity.cleanup_stale(threshold) {
                        Ok(removed) if removed > 0 => {
                            info!(removed, "stale identity cleanup sweep completed")
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "stale identity cleanup sweep failed"),
                    }
                }
            });
            self.background.get_mut().unwrap().push(handle);
        }

        if self.config.activity.auto_prune_enabled {
            let activity = self.activity.clone();
            let max_age = ChronoDuration::seconds(self.config.activity.auto_prune_max_age_secs as i64);
            let interval = Duration::from_secs(self.config.activity.auto_prune_interval_secs);
            let handle = tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                loop {
                    ticker.tick().await;
                    let cutoff = chrono::Utc::now() - max_age;
                    match activity.prune(cutoff) {
                        Ok(removed) if removed > 0 => {
                            info!(removed, "time-based activity retention sweep completed")
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "activity retention sweep failed"),
                    }
                }
            });
            self.background.get_mut().unwrap().push(handle);
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn queue(&self) -> &AsyncQueueHandle {
        &self.queue
    }

    pub fn identity(&self) -> &IdentityEngine {
        &self.identity
    }

    pub fn activity(&self) -> &ActivityLog {
        &self.activity
    }

    pub fn upstream(&self) -> &Arc<UpstreamManager> {
        &self.upstream
    }

    pub fn index(&self) -> &Arc<dyn IndexSink> {
        &self.index
    }

    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.cache
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Reverses construction order strictly (spec §4.7): `UpstreamManager`
    /// disconnects, then `Cache`, then `Index`, then `Store`'s queue worker
    /// stops. Each failure is recorded and logged but never aborts the
    /// remaining steps; the *last* error observed is returned.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        for handle in self.background.lock().unwrap().drain(..) {
            handle.abort();
        }

        let mut last_error: Option<Error> = None;

        if let Err(e) = self.upstream.disconnect_all().await {
            warn!(error = %e, "UpstreamManager.DisconnectAll failed during close");
            last_error = Some(e);
        }
        if let Err(e) = self.cache.close() {
            warn!(error = %e, "Cache.Close failed during close");
            last_error = Some(e);
        }
        if let Err(e) = self.index.close() {
            warn!(error = %e, "Index.Close failed during close");
            last_error = Some(e);
        }
        if let Err(e) = self.queue.clone().stop().await {
            warn!(error = %e, "Store queue worker failed to stop cleanly during close");
            last_error = Some(e);
        }
        self.logs.close();

        match last_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcprox_upstream::isolation::test_double::NoIsolation;
    use mcprox_upstream::transport::test_double::ScriptedTransport;
    use mcprox_upstream::transport::McpTransport;

    struct EchoFactory;

    #[async_trait::async_trait]
    impl TransportFactory for EchoFactory {
        async fn create(&self, _config: &mcprox_core::model::UpstreamRecord) -> Result<Arc<dyn McpTransport>> {
            Ok(Arc::new(ScriptedTransport::new(vec![])))
        }
    }

    fn config(dir: &tempfile::TempDir) -> ProxyConfig {
        let mut cfg = ProxyConfig::default();
        cfg.store.path = dir.path().join("db").to_string_lossy().into_owned();
        cfg
    }

    #[tokio::test]
    async fn construction_wires_every_component_and_close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = AppContext::new(
            config(&dir),
            Collaborators {
                transport_factory: Arc::new(EchoFactory),
                oauth: None,
                isolation: Some(Arc::new(NoIsolation)),
                index: None,
            },
        )
        .unwrap();

        assert_eq!(ctx.upstream().get_stats().await.len(), 0);
        assert_eq!(ctx.activity().count().unwrap(), 0);

        ctx.close().await.unwrap();
        ctx.close().await.unwrap();
    }

    #[tokio::test]
    async fn omitted_collaborators_default_to_store_backed_implementations() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = AppContext::new(
            config(&dir),
            Collaborators {
                transport_factory: Arc::new(EchoFactory),
                oauth: None,
                isolation: None,
                index: None,
            },
        )
        .unwrap();

        assert_eq!(ctx.upstream().get_stats().await.len(), 0);
        ctx.close().await.unwrap();
    }
}
