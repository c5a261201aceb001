//! `UpstreamManager` (spec §4.6): owns the set of `UpstreamClient`s keyed by
//! server name, aggregates tool discovery, dispatches qualified tool calls,
//! and fans out upstream notifications. Grounded on the namespacing scheme
//! in `other_examples`' `codex-rs-core-src-mcp_connection_manager.rs`
//! (`"<server><delimiter><tool>"` aggregation) adapted to this spec's
//! `serverName:toolName` delimiter and quarantine semantics.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use mcprox_activity::ActivityLog;
use mcprox_config::UpstreamConfig;
use mcprox_core::model::{
    ActivityRecord, ActivitySource, ActivityStatus, ActivityType, OAuthCompletionEvent,
    ToolDescriptor, UpstreamRecord,
};
use mcprox_core::{Error, Result};
use mcprox_store::{containers, AsyncQueue, OperationPayload, Store};
use serde_json::Value;
use tokio::sync::{mpsc, RwLock, Semaphore};
use tracing::{info, warn};

use crate::backoff::BackoffCalculator;
use crate::client::{ClientState, TransportFactory, UpstreamClient};
use crate::index::IndexSink;
use crate::isolation::DockerIsolation;
use crate::notify::NotificationBus;
use crate::oauth::OAuthCollaborator;
use crate::transport::{ToolCallOutcome, UpstreamNotification};

#[derive(Debug, Clone)]
pub struct ServerStats {
    pub name: String,
    pub state: &'static str,
    pub tool_count: usize,
    pub enabled: bool,
    pub quarantined: bool,
}

pub struct UpstreamManager {
    store: Store,
    queue: AsyncQueue,
    activity: ActivityLog,
    config: UpstreamConfig,
    clients: RwLock<HashMap<String, Arc<UpstreamClient>>>,
    transport_factory: Arc<dyn TransportFactory>,
    oauth: Arc<dyn OAuthCollaborator>,
    isolation: Arc<dyn DockerIsolation>,
    index: Arc<dyn IndexSink>,
    notifications: Arc<NotificationBus>,
    handshake_timeout: Duration,
}

impl UpstreamManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Store,
        queue: AsyncQueue,
        activity: ActivityLog,
        config: UpstreamConfig,
        transport_factory: Arc<dyn TransportFactory>,
        oauth: Arc<dyn OAuthCollaborator>,
        isolation: Arc<dyn DockerIsolation>,
        index: Arc<dyn IndexSink>,
    ) -> Self {
        Self {
            store,
            queue,
            activity,
            config,
            clients: RwLock::new(HashMap::new()),
            transport_factory,
            oauth,
            isolation,
            index,
            notifications: Arc::new(NotificationBus::new()),
            handshake_timeout: Duration::from_secs(10),
        }
    }

    fn build_client(&self, record: UpstreamRecord) -> Arc<UpstreamClient> {
        let backoff = BackoffCalculator::from_config(&self.config);
        Arc::new(UpstreamClient::new(
            record,
            self.transport_factory.clone(),
            self.oauth.clone(),
            self.isolation.clone(),
            self.index.clone(),
            self.notifications.clone(),
            backoff,
            self.handshake_timeout,
        ))
    }

    /// Constructs (or reconstructs) a client from `cfg` and persists it, but
    /// does not connect (spec §4.6 `AddServerConfig`).
    pub async fn add_server_config(&self, name: &str, cfg: UpstreamRecord) -> Result<()> {
        cfg.validate().map_err(Error::invalid_config)?;
        self.queue
            .submit_sync(
                OperationPayload::SaveServer {
                    record: Box::new(cfg.clone()),
                },
                Duration::from_secs(30),
            )
            .await?;
        let client = self.build_client(cfg);
        self.clients.write().await.insert(name.to_string(), client);
        Ok(())
    }

    /// `AddServerConfig` plus an immediate `connect()` (spec §4.6
    /// `AddServer`).
    pub async fn add_server(&self, name: &str, cfg: UpstreamRecord) -> Result<()> {
        self.add_server_config(name, cfg).await?;
        let client = self.get_client(name).await?;
        client.connect().await
    }

    /// Tears down and drops the client, then deletes its durable record
    /// (spec §4.6 `RemoveServer`).
    pub async fn remove_server(&self, name: &str) -> Result<()> {
        if let Some(client) = self.clients.write().await.remove(name) {
            client.remove().await;
        }
        self.queue
            .submit_sync(
                OperationPayload::DeleteServer { name: name.to_string() },
                Duration::from_secs(30),
            )
            .await
    }

    /// Toggles `enabled` via the queue's dedicated operation, then refreshes
    /// the live client's in-memory config snapshot in place — unlike
    /// `add_server_config`, this never reconstructs the client, so an
    /// existing connection survives (spec §4.6 "toggling quarantine never
    /// disconnects" applies equally to enable/disable of a connected client).
    pub async fn set_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        self.queue
            .submit_sync(
                OperationPayload::EnableServer { name: name.to_string(), enabled },
                Duration::from_secs(30),
            )
            .await?;
        if let Ok(client) = self.get_client(name).await {
            let mut cfg = client.config_snapshot().await;
            cfg.enabled = enabled;
            client.update_config(cfg).await;
        }
        Ok(())
    }

    /// Toggles `quarantined` without disconnecting the client (spec §4.6
    /// quarantine semantics) and records a `quarantine-change` activity.
    pub async fn set_quarantined(&self, name: &str, quarantined: bool) -> Result<()> {
        self.queue
            .submit_sync(
                OperationPayload::QuarantineServer { name: name.to_string(), quarantined },
                Duration::from_secs(30),
            )
            .await?;
        if let Ok(client) = self.get_client(name).await {
            let mut cfg = client.config_snapshot().await;
            cfg.quarantined = quarantined;
            client.update_config(cfg).await;
        }
        self.record_activity(
            ActivityType::QuarantineChange,
            Some(name),
            None,
            ActivityStatus::Success,
            None,
            0,
            None,
            None,
        )
        .await;
        Ok(())
    }

    async fn get_client(&self, name: &str) -> Result<Arc<UpstreamClient>> {
        self.clients
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("upstream server {name}")))
    }

    /// Connects every enabled, non-quarantined client concurrently, bounded
    /// by `max_concurrent_connects`. Returns once every launched client has
    /// reached a terminal post-connect state (ready or degraded); individual
    /// failures don't short-circuit the rest (spec §4.6 "not fail-fast").
    pub async fn connect_all(&self) -> Result<()> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_connects));
        let candidates: Vec<Arc<UpstreamClient>> = {
            let clients = self.clients.read().await;
            let mut out = Vec::new();
            for client in clients.values() {
                let cfg = client.config_snapshot().await;
                if cfg.enabled && !cfg.quarantined {
                    out.push(client.clone());
                }
            }
            out
        };

        let mut handles = Vec::with_capacity(candidates.len());
        for client in candidates {
            let permit = semaphore.clone().acquire_owned().await.map_err(|e| {
                Error::internal(format!("connect_all semaphore closed: {e}"))
            })?;
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let _ = client.connect().await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
        Ok(())
    }

    /// Concurrent, best-effort teardown (spec §4.6 `DisconnectAll`).
    pub async fn disconnect_all(&self) -> Result<()> {
        let clients: Vec<Arc<UpstreamClient>> = self.clients.read().await.values().cloned().collect();
        let handles: Vec<_> = clients
            .into_iter()
            .map(|client| tokio::spawn(async move { client.close().await }))
            .collect();
        for handle in handles {
            let _ = handle.await;
        }
        Ok(())
    }

    pub async fn retry_connection(&self, name: &str) -> Result<()> {
        let client = self.get_client(name).await?;
        client.retry().await
    }

    /// Re-discovers and aggregates tool metadata across all ready,
    /// non-quarantined clients, namespaced `serverName:toolName` (spec §4.6
    /// `DiscoverTools`). Each client's own `discover_tools` forwards any
    /// changed tools to the index and the notification bus as a side
    /// effect of the refresh (spec §2 data flow, §9 notification bus).
    pub async fn discover_tools(&self) -> Result<HashMap<String, ToolDescriptor>> {
        let mut aggregate = HashMap::new();
        let clients: Vec<(String, Arc<UpstreamClient>)> = {
            let clients = self.clients.read().await;
            clients
                .iter()
                .map(|(name, client)| (name.clone(), client.clone()))
                .collect()
        };

        for (name, client) in clients {
            let cfg = client.config_snapshot().await;
            if cfg.quarantined || !client.state().await.is_ready() {
                continue;
            }
            if let Err(e) = client.discover_tools(self.handshake_timeout).await {
                warn!(server = %name, error = %e, "tool re-discovery failed");
            }
            for tool in client.cached_tools().await {
                aggregate.insert(format!("{name}:{}", tool.name), tool);
            }
        }
        Ok(aggregate)
    }

    /// Describes a quarantined-but-connected server's tools for display,
    /// tagged as visible-not-callable — resolves the spec's open
    /// `ListQuarantinedTools` question (SPEC_FULL.md §11).
    pub async fn list_quarantined_tools(&self, name: &str) -> Result<Vec<ToolDescriptor>> {
        let client = self.get_client(name).await?;
        let cfg = client.config_snapshot().await;
        if !cfg.quarantined {
            return Ok(Vec::new());
        }
        Ok(client.cached_tools().await)
    }

    /// Splits on the first `:`, enforces server existence/quarantine/enabled
    /// gating, dispatches, and emits the corresponding activity record on
    /// every outcome (spec §4.6 `CallTool`).
    pub async fn call_tool(
        &self,
        qualified_tool_name: &str,
        arguments: Value,
        timeout: Duration,
        session_id: Option<String>,
        request_id: Option<String>,
    ) -> Result<ToolCallOutcome> {
        let (server, tool) = qualified_tool_name.split_once(':').ok_or_else(|| {
            Error::invalid_config(format!(
                "qualified tool name `{qualified_tool_name}` missing ':' separator"
            ))
        })?;

        let client = match self.get_client(server).await {
            Ok(c) => c,
            Err(e) => return Err(e),
        };
        let cfg = client.config_snapshot().await;

        if cfg.quarantined {
            self.record_activity(
                ActivityType::PolicyDecision,
                Some(server),
                Some(tool),
                ActivityStatus::Blocked,
                Some("server is quarantined".into()),
                0,
                session_id,
                request_id,
            )
            .await;
            return Err(Error::Quarantined {
                server: server.to_string(),
            });
        }
        if !cfg.enabled {
            self.record_activity(
                ActivityType::PolicyDecision,
                Some(server),
                Some(tool),
                ActivityStatus::Blocked,
                Some("server is disabled".into()),
                0,
                session_id,
                request_id,
            )
            .await;
            return Err(Error::Disabled {
                server: server.to_string(),
            });
        }

        let start = Utc::now();
        let result = client.call_tool(tool, arguments, timeout).await;
        let duration_ms = (Utc::now() - start).num_milliseconds().max(0) as u64;

        match &result {
            Ok(_) => {
                self.record_activity(
                    ActivityType::ToolCall,
                    Some(server),
                    Some(tool),
                    ActivityStatus::Success,
                    None,
                    duration_ms,
                    session_id,
                    request_id,
                )
                .await;
            }
            Err(e) => {
                self.record_activity(
                    ActivityType::ToolCall,
                    Some(server),
                    Some(tool),
                    ActivityStatus::Error,
                    Some(e.to_string()),
                    duration_ms,
                    session_id,
                    request_id,
                )
                .await;
            }
        }

        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn record_activity(
        &self,
        activity_type: ActivityType,
        server: Option<&str>,
        tool: Option<&str>,
        status: ActivityStatus,
        error_message: Option<String>,
        duration_ms: u64,
        session_id: Option<String>,
        request_id: Option<String>,
    ) {
        let record = ActivityRecord {
            id: String::new(),
            activity_type,
            source: ActivitySource::Mcp,
            server_name: server.map(str::to_string),
            tool_name: tool.map(str::to_string),
            arguments: None,
            response: None,
            response_truncated: false,
            status,
            error_message,
            duration_ms: Some(duration_ms),
            timestamp: Utc::now(),
            session_id,
            request_id,
            metadata: Default::default(),
        };
        if let Err(e) = self.activity.save(record) {
            warn!(error = %e, "failed to record activity for upstream call_tool");
        }
    }

    pub async fn get_stats(&self) -> Vec<ServerStats> {
        let clients = self.clients.read().await;
        let mut out = Vec::with_capacity(clients.len());
        for (name, client) in clients.iter() {
            let cfg = client.config_snapshot().await;
            let state = client.state().await;
            out.push(ServerStats {
                name: name.clone(),
                state: state.label(),
                tool_count: client.cached_tools().await.len(),
                enabled: cfg.enabled,
                quarantined: cfg.quarantined,
            });
        }
        out
    }

    /// Registers a handler on the notification bus (spec §4.6
    /// `AddNotificationHandler`).
    pub async fn add_notification_handler(&self) -> mpsc::Receiver<UpstreamNotification> {
        self.notifications.add_handler().await
    }

    pub async fn publish_notification(&self, notification: UpstreamNotification) {
        self.notifications.publish(notification).await;
    }

    /// Forces re-aggregation on the next `discover_tools` call. This manager
    /// computes the aggregate on demand rather than caching it, so there is
    /// no cached state to drop — kept as an explicit operation so callers
    /// don't need to know that (spec §4.6 `InvalidateAllToolCountCaches`).
    pub async fn invalidate_all_tool_count_caches(&self) {
        info!("tool count caches invalidated; next discover_tools call recomputes");
    }

    /// Persists a cross-process OAuth completion nudge (SPEC_FULL.md §11,
    /// resolving spec.md §9's `NotifyOAuthCompletion` open question).
    pub async fn notify_oauth_completion(&self, server_name: &str) -> Result<()> {
        let event = OAuthCompletionEvent::new(server_name);
        self.store
            .put(containers::OAUTH_COMPLETION, server_name, &event)
    }

    /// Consumes unprocessed `OAuthCompletionEvent`s and retries the matching
    /// degraded-needs-oauth client.
    pub async fn poll_oauth_completions(&self) -> Result<usize> {
        let events: Vec<(String, OAuthCompletionEvent)> =
            self.store.range_scan(containers::OAUTH_COMPLETION)?;
        let mut processed = 0usize;
        for (server_name, mut event) in events {
            if event.is_processed() {
                continue;
            }
            if let Ok(client) = self.get_client(&server_name).await {
                if matches!(client.state().await, ClientState::Degraded { needs_oauth: true, .. }) {
                    let _ = client.retry().await;
                }
            }
            event.mark_processed(Utc::now());
            self.store
                .put(containers::OAUTH_COMPLETION, &server_name, &event)?;
            processed += 1;
        }
        Ok(processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::NullIndexSink;
    use crate::isolation::test_double::NoIsolation;
    use crate::oauth::test_double::InMemoryOAuth;
    use crate::transport::test_double::ScriptedTransport;
    use crate::transport::McpTransport;
    use mcprox_activity::ActivityLog;
    use mcprox_config::ActivityConfig;
    use mcprox_core::model::TransportKind;
    use mcprox_store::AsyncQueueHandle;

    struct FixedTransportFactory {
        fail: bool,
    }

    #[async_trait::async_trait]
    impl TransportFactory for FixedTransportFactory {
        async fn create(&self, _config: &UpstreamRecord) -> Result<Arc<dyn McpTransport>> {
            let transport = Arc::new(ScriptedTransport::new(vec![ToolDescriptor {
                name: "search".into(),
                description: None,
                input_schema: serde_json::json!({}),
                annotations: Default::default(),
            }]));
            if self.fail {
                transport
                    .fail_initialize
                    .store(true, std::sync::atomic::Ordering::SeqCst);
            }
            Ok(transport)
        }
    }

    async fn manager(fail: bool) -> (tempfile::TempDir, UpstreamManager, AsyncQueueHandle) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("db")).unwrap();
        let queue = AsyncQueueHandle::start(store.clone(), 100);
        let activity = ActivityLog::new(store.clone(), ActivityConfig::default());
        let manager = UpstreamManager::new(
            store,
            queue.queue(),
            activity,
            UpstreamConfig::default(),
            Arc::new(FixedTransportFactory { fail }),
            Arc::new(InMemoryOAuth::default()),
            Arc::new(NoIsolation),
            Arc::new(NullIndexSink),
        );
        (dir, manager, queue)
    }

    fn config(name: &str) -> UpstreamRecord {
        let mut cfg = UpstreamRecord::new(name, TransportKind::Subprocess);
        cfg.command = Some("npx".into());
        cfg.enabled = true;
        cfg
    }

    #[tokio::test]
    async fn add_server_connects_and_discover_tools_namespaces_by_server() {
        let (_dir, manager, _queue) = manager(false).await;
        manager.add_server("gh", config("gh")).await.unwrap();
        let tools = manager.discover_tools().await.unwrap();
        assert!(tools.contains_key("gh:search"));
    }

    #[tokio::test]
    async fn call_tool_on_quarantined_server_is_blocked() {
        let (_dir, manager, _queue) = manager(false).await;
        let mut cfg = config("gh");
        cfg.quarantined = true;
        manager.add_server("gh", cfg).await.unwrap();

        let result = manager
            .call_tool("gh:search", serde_json::json!({}), Duration::from_secs(1), None, None)
            .await;
        assert!(matches!(result, Err(Error::Quarantined { .. })));
    }

    #[tokio::test]
    async fn call_tool_on_disabled_server_is_blocked() {
        let (_dir, manager, _queue) = manager(false).await;
        let mut cfg = config("gh");
        cfg.enabled = false;
        manager.add_server_config("gh", cfg).await.unwrap();

        let result = manager
            .call_tool("gh:search", serde_json::json!({}), Duration::from_secs(1), None, None)
            .await;
        assert!(matches!(result, Err(Error::Disabled { .. })));
    }

    #[tokio::test]
    async fn call_tool_on_unknown_server_is_not_found() {
        let (_dir, manager, _queue) = manager(false).await;
        let result = manager
            .call_tool("ghost:search", serde_json::json!({}), Duration::from_secs(1), None, None)
            .await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn call_tool_success_is_logged_as_activity() {
        let (_dir, manager, _queue) = manager(false).await;
        manager.add_server("gh", config("gh")).await.unwrap();
        manager
            .call_tool("gh:search", serde_json::json!({}), Duration::from_secs(1), None, None)
            .await
            .unwrap();
        assert_eq!(manager.activity.count().unwrap(), 1);
    }

    #[tokio::test]
    async fn quarantined_server_tools_are_excluded_from_discovery_but_listable() {
        let (_dir, manager, _queue) = manager(false).await;
        manager.add_server("gh", config("gh")).await.unwrap();
        // Quarantine after connect (quarantine never disconnects, spec §4.6).
        manager.set_quarantined("gh", true).await.unwrap();

        let tools = manager.discover_tools().await.unwrap();
        assert!(!tools.contains_key("gh:search"));

        let quarantined_tools = manager.list_quarantined_tools("gh").await.unwrap();
        assert_eq!(quarantined_tools.len(), 1);
    }

    #[tokio::test]
    async fn connect_all_reaches_degraded_for_failing_server_without_blocking_others() {
        let (_dir, manager, _queue) = manager(true).await;
        manager.add_server_config("gh", config("gh")).await.unwrap();
        manager.connect_all().await.unwrap();
        let stats = manager.get_stats().await;
        assert_eq!(stats[0].state, "degraded");
    }

    #[tokio::test]
    async fn remove_server_drops_client_and_persisted_record() {
        let (_dir, manager, _queue) = manager(false).await;
        manager.add_server("gh", config("gh")).await.unwrap();
        manager.remove_server("gh").await.unwrap();
        let result = manager
            .call_tool("gh:search", serde_json::json!({}), Duration::from_secs(1), None, None)
            .await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn oauth_completion_retries_degraded_needs_oauth_client() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("db")).unwrap();
        let queue = AsyncQueueHandle::start(store.clone(), 100);
        let activity = ActivityLog::new(store.clone(), ActivityConfig::default());

        struct AuthFailFactory;
        #[async_trait::async_trait]
        impl TransportFactory for AuthFailFactory {
            async fn create(&self, _config: &UpstreamRecord) -> Result<Arc<dyn McpTransport>> {
                let transport = Arc::new(ScriptedTransport::new(vec![]));
                transport
                    .fail_with_auth
                    .store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(transport)
            }
        }

        let manager = UpstreamManager::new(
            store,
            queue.queue(),
            activity,
            UpstreamConfig::default(),
            Arc::new(AuthFailFactory),
            Arc::new(InMemoryOAuth::default()),
            Arc::new(NoIsolation),
            Arc::new(NullIndexSink),
        );
        manager.add_server("gh", config("gh")).await.unwrap();
        assert!(matches!(
            manager.get_client("gh").await.unwrap().state().await,
            ClientState::Degraded { needs_oauth: true, .. }
        ));

        manager.notify_oauth_completion("gh").await.unwrap();
        let processed = manager.poll_oauth_completions().await.unwrap();
        assert_eq!(processed, 1);
    }
}
