//! `UpstreamClient` (spec §4.5): the per-server connection state machine.
//!
//! States: disconnected → connecting → ready → degraded → disconnected;
//! terminal `removed`. Modeled after the teacher's
//! `ratchet_mcp::recovery::{ReconnectionManager, DegradationManager}`, merged
//! into a single state machine since this spec does not separate primary/
//! fallback transports.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mcprox_core::model::{ToolDescriptor, UpstreamRecord};
use mcprox_core::{Error, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::backoff::BackoffCalculator;
use crate::index::IndexSink;
use crate::isolation::DockerIsolation;
use crate::notify::NotificationBus;
use crate::oauth::OAuthCollaborator;
use crate::transport::{McpTransport, TransportError, ToolCallOutcome, UpstreamNotification};

/// Builds the concrete transport for a server's configured kind. A real
/// implementation dispatches on `config.transport` to pick subprocess-stdio,
/// HTTP, SSE, streamable-HTTP, or auto-detect (spec §6); out of scope here.
#[async_trait::async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(&self, config: &UpstreamRecord) -> Result<Arc<dyn McpTransport>>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientState {
    Disconnected,
    Connecting { attempt: u32 },
    Ready { since: DateTime<Utc> },
    Degraded { reason: String, needs_oauth: bool, attempt: u32 },
    Removed,
}

impl ClientState {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }

    pub fn is_removed(&self) -> bool {
        matches!(self, Self::Removed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting { .. } => "connecting",
            Self::Ready { .. } => "ready",
            Self::Degraded { .. } => "degraded",
            Self::Removed => "removed",
        }
    }
}

pub struct UpstreamClient {
    pub name: String,
    config: RwLock<UpstreamRecord>,
    state: Mutex<ClientState>,
    transport: Mutex<Option<Arc<dyn McpTransport>>>,
    tools: RwLock<Vec<ToolDescriptor>>,
    tool_hashes: RwLock<HashMap<String, String>>,
    attempt: AtomicU32,
    transport_factory: Arc<dyn TransportFactory>,
    oauth: Arc<dyn OAuthCollaborator>,
    isolation: Arc<dyn DockerIsolation>,
    index: Arc<dyn IndexSink>,
    notifications: Arc<NotificationBus>,
    backoff: BackoffCalculator,
    handshake_timeout: Duration,
}

impl UpstreamClient {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: UpstreamRecord,
        transport_factory: Arc<dyn TransportFactory>,
        oauth: Arc<dyn OAuthCollaborator>,
        isolation: Arc<dyn DockerIsolation>,
        index: Arc<dyn IndexSink>,
        notifications: Arc<NotificationBus>,
        backoff: BackoffCalculator,
        handshake_timeout: Duration,
    ) -> Self {
        Self {
            name: config.name.clone(),
            config: RwLock::new(config),
            state: Mutex::new(ClientState::Disconnected),
            transport: Mutex::new(None),
            tools: RwLock::new(Vec::new()),
            tool_hashes: RwLock::new(HashMap::new()),
            attempt: AtomicU32::new(0),
            transport_factory,
            oauth,
            isolation,
            index,
            notifications,
            backoff,
            handshake_timeout,
        }
    }

    pub async fn state(&self) -> ClientState {
        self.state.lock().await.clone()
    }

    pub async fn config_snapshot(&self) -> UpstreamRecord {
        self.config.read().await.clone()
    }

    pub async fn update_config(&self, config: UpstreamRecord) {
        *self.config.write().await = config;
    }

    pub async fn cached_tools(&self) -> Vec<ToolDescriptor> {
        self.tools.read().await.clone()
    }

    /// Launches the transport and performs the handshake. On success,
    /// transitions to `ready` and runs `discover_tools`. On failure,
    /// transitions to `degraded` and schedules a backoff retry (spec §4.5).
    /// Callable from `disconnected` or `degraded`; a no-op if already
    /// `connecting`/`ready`/`removed`.
    pub async fn connect(self: &Arc<Self>) -> Result<()> {
        {
            let state = self.state.lock().await;
            if matches!(*state, ClientState::Connecting { .. } | ClientState::Ready { .. } | ClientState::Removed) {
                return Ok(());
            }
        }

        let attempt = self.attempt.fetch_add(1, Ordering::SeqCst) + 1;
        *self.state.lock().await = ClientState::Connecting { attempt };

        let config = self.config_snapshot().await;
        if self.isolation.should_isolate(&config) {
            debug!(server = %self.name, "routing subprocess launch through isolation");
        }

        let transport = match self.transport_factory.create(&config).await {
            Ok(t) => t,
            Err(e) => {
                self.enter_degraded(format!("transport construction failed: {e}"), false, attempt)
                    .await;
                self.schedule_retry(attempt);
                return Err(e);
            }
        };

        match transport.initialize(self.handshake_timeout).await {
            Ok(()) => {
                self.register_push_notifications(transport.clone()).await;
                *self.transport.lock().await = Some(transport);
                self.attempt.store(0, Ordering::SeqCst);
                *self.state.lock().await = ClientState::Ready { since: Utc::now() };
                info!(server = %self.name, "upstream connected");
                if let Err(e) = self.discover_tools(self.handshake_timeout).await {
                    warn!(server = %self.name, error = %e, "post-connect tool discovery failed");
                }
                Ok(())
            }
            Err(TransportError::AuthenticationRequired) => {
                let has_store = self.oauth.has_token_store(&self.name).await;
                if !has_store {
                    info!(server = %self.name, "needs-oauth: no token store for server");
                }
                self.enter_degraded("authentication required".into(), true, attempt)
                    .await;
                Err(Error::AuthRequired {
                    server: self.name.clone(),
                })
            }
            Err(e) => {
                let message = e.to_string();
                self.enter_degraded(message.clone(), false, attempt).await;
                self.schedule_retry(attempt);
                Err(Error::transport_failed(&self.name, message))
            }
        }
    }

    /// Registers a fresh channel with the transport and spawns a forwarder
    /// that republishes every unsolicited push onto this client's shared
    /// notification bus (spec §6: the transport "exposes... a notification
    /// callback"). The forwarder task ends on its own once the transport
    /// drops or replaces the sink, e.g. on the next `connect()`.
    async fn register_push_notifications(&self, transport: Arc<dyn McpTransport>) {
        let (tx, mut rx) = mpsc::channel(64);
        transport.register_notification_sink(tx).await;
        let notifications = self.notifications.clone();
        let server = self.name.clone();
        tokio::spawn(async move {
            while let Some(notification) = rx.recv().await {
                notifications.publish(notification).await;
            }
            debug!(server = %server, "push-notification forwarder stopped");
        });
    }

    async fn enter_degraded(&self, reason: String, needs_oauth: bool, attempt: u32) {
        warn!(server = %self.name, reason = %reason, needs_oauth, "upstream degraded");
        *self.state.lock().await = ClientState::Degraded {
            reason,
            needs_oauth,
            attempt,
        };
    }

    /// Spawns a background task that sleeps the backoff delay then retries,
    /// mirroring the teacher's `ReconnectionManager::start_reconnection_task`.
    /// Skipped when the degraded reason is `needs-oauth` — those wait for an
    /// external `NotifyOAuthCompletion` instead (spec §4.5).
    fn schedule_retry(self: &Arc<Self>, attempt: u32) {
        let delay = self.backoff.delay_for_attempt(attempt);
        let client = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let still_degraded_without_oauth = matches!(
                client.state().await,
                ClientState::Degraded { needs_oauth: false, .. }
            );
            if still_degraded_without_oauth {
                let _ = client.connect().await;
            }
        });
    }

    /// Forces a disconnect and re-enters `connecting` (spec §4.5 `retry()`).
    pub async fn retry(self: &Arc<Self>) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            if state.is_removed() {
                return Err(Error::not_found(format!("client {} removed", self.name)));
            }
            *state = ClientState::Disconnected;
        }
        if let Some(transport) = self.transport.lock().await.take() {
            transport.close().await;
        }
        self.connect().await
    }

    /// Tears down the transport and frees resources (spec §4.5 `remove()`).
    pub async fn remove(&self) {
        self.close().await;
        *self.state.lock().await = ClientState::Removed;
    }

    /// Idempotent (spec §4.5 `Close()`).
    pub async fn close(&self) {
        if let Some(transport) = self.transport.lock().await.take() {
            transport.close().await;
        }
    }

    /// Fetches tool metadata, caches it, and recomputes stable per-tool
    /// content hashes, returning the names whose hash changed since the
    /// previous discovery (spec §4.5 "emits hash-change events to the outer
    /// indexer" — the caller/manager is the indexer here).
    pub async fn discover_tools(&self, timeout: Duration) -> Result<Vec<String>> {
        let transport = self.transport.lock().await.clone().ok_or_else(|| {
            Error::transport_failed(&self.name, "discover_tools called while disconnected")
        })?;

        let discovered = transport
            .list_tools(timeout)
            .await
            .map_err(|e| Error::transport_failed(&self.name, e.to_string()))?;

        let mut changed = Vec::new();
        {
            let mut hashes = self.tool_hashes.write().await;
            for tool in &discovered {
                let hash = hash_tool(tool);
                let prior = hashes.insert(tool.name.clone(), hash.clone());
                if prior.as_deref() != Some(hash.as_str()) {
                    changed.push(tool.name.clone());
                }
            }
        }

        *self.tools.write().await = discovered.clone();

        if !changed.is_empty() {
            let changed_tools: Vec<ToolDescriptor> = discovered
                .into_iter()
                .filter(|t| changed.contains(&t.name))
                .collect();
            if let Err(e) = self.index.index_tools(&self.name, &changed_tools) {
                warn!(server = %self.name, error = %e, "failed to forward discovered tools to index");
            }
            self.notifications
                .publish(UpstreamNotification::ToolListChanged {
                    server: self.name.clone(),
                })
                .await;
        }

        Ok(changed)
    }

    /// Fails with a transport error if not ready (spec §4.5: "Fails with
    /// disconnected if not ready" — the error taxonomy has no dedicated
    /// `disconnected` variant, so this surfaces as `TransportFailed`).
    pub async fn call_tool(
        &self,
        tool_name: &str,
        arguments: Value,
        timeout: Duration,
    ) -> Result<ToolCallOutcome> {
        if !self.state().await.is_ready() {
            return Err(Error::transport_failed(
                &self.name,
                "client not ready (disconnected)",
            ));
        }
        let transport = self.transport.lock().await.clone().ok_or_else(|| {
            Error::transport_failed(&self.name, "no live transport despite ready state")
        })?;

        transport
            .call_tool(tool_name, arguments, timeout)
            .await
            .map_err(|e| Error::transport_failed(&self.name, e.to_string()))
    }
}

fn hash_tool(tool: &ToolDescriptor) -> String {
    let bytes = serde_json::to_vec(tool).unwrap_or_default();
    hex::encode(Sha256::digest(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::NullIndexSink;
    use crate::isolation::test_double::NoIsolation;
    use crate::oauth::test_double::InMemoryOAuth;
    use crate::transport::test_double::ScriptedTransport;
    use mcprox_config::UpstreamConfig;
    use mcprox_core::model::TransportKind;

    struct FixedTransportFactory {
        transport: Arc<ScriptedTransport>,
    }

    #[async_trait::async_trait]
    impl TransportFactory for FixedTransportFactory {
        async fn create(&self, _config: &UpstreamRecord) -> Result<Arc<dyn McpTransport>> {
            Ok(self.transport.clone())
        }
    }

    fn make_client(transport: Arc<ScriptedTransport>) -> Arc<UpstreamClient> {
        let mut config = UpstreamRecord::new("gh", TransportKind::Subprocess);
        config.command = Some("npx".into());
        Arc::new(UpstreamClient::new(
            config,
            Arc::new(FixedTransportFactory { transport }),
            Arc::new(InMemoryOAuth::default()),
            Arc::new(NoIsolation),
            Arc::new(NullIndexSink),
            Arc::new(NotificationBus::new()),
            BackoffCalculator::from_config(&UpstreamConfig::default()),
            Duration::from_secs(5),
        ))
    }

    #[tokio::test]
    async fn connect_success_reaches_ready_and_discovers_tools() {
        let transport = Arc::new(ScriptedTransport::new(vec![ToolDescriptor {
            name: "search".into(),
            description: None,
            input_schema: serde_json::json!({}),
            annotations: Default::default(),
        }]));
        let client = make_client(transport);
        client.connect().await.unwrap();
        assert!(client.state().await.is_ready());
        assert_eq!(client.cached_tools().await.len(), 1);
    }

    #[tokio::test]
    async fn connect_failure_enters_degraded() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        transport.fail_initialize.store(true, Ordering::SeqCst);
        let client = make_client(transport);
        let result = client.connect().await;
        assert!(result.is_err());
        assert!(matches!(client.state().await, ClientState::Degraded { .. }));
    }

    #[tokio::test]
    async fn auth_failure_sets_needs_oauth_flag() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        transport.fail_with_auth.store(true, Ordering::SeqCst);
        let client = make_client(transport);
        let result = client.connect().await;
        assert!(matches!(result, Err(Error::AuthRequired { .. })));
        match client.state().await {
            ClientState::Degraded { needs_oauth, .. } => assert!(needs_oauth),
            other => panic!("expected degraded state, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn call_tool_fails_when_not_ready() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let client = make_client(transport);
        let result = client.call_tool("search", serde_json::json!({}), Duration::from_secs(1)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn call_tool_succeeds_once_ready() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let client = make_client(transport);
        client.connect().await.unwrap();
        let outcome = client
            .call_tool("search", serde_json::json!({"q": "x"}), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(outcome.response["tool"], "search");
    }

    #[tokio::test]
    async fn remove_is_terminal() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let client = make_client(transport.clone());
        client.connect().await.unwrap();
        client.remove().await;
        assert!(client.state().await.is_removed());
        assert!(transport.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn discover_tools_reports_changed_names() {
        let transport = Arc::new(ScriptedTransport::new(vec![ToolDescriptor {
            name: "search".into(),
            description: None,
            input_schema: serde_json::json!({}),
            annotations: Default::default(),
        }]));
        let client = make_client(transport.clone());
        client.connect().await.unwrap();

        // Same tool set again: no changes.
        let changed = client.discover_tools(Duration::from_secs(1)).await.unwrap();
        assert!(changed.is_empty());

        // Change the schema: hash must change.
        *transport.tools.lock().unwrap() = vec![ToolDescriptor {
            name: "search".into(),
            description: Some("now documented".into()),
            input_schema: serde_json::json!({}),
            annotations: Default::default(),
        }];
        let changed = client.discover_tools(Duration::from_secs(1)).await.unwrap();
        assert_eq!(changed, vec!["search".to_string()]);
    }

    struct RecordingIndex {
        calls: std::sync::Mutex<Vec<(String, usize)>>,
    }

    impl IndexSink for RecordingIndex {
        fn index_tools(&self, server: &str, tools: &[ToolDescriptor]) -> Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push((server.to_string(), tools.len()));
            Ok(())
        }

        fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn changed_tools_are_forwarded_to_index_and_notification_bus() {
        let transport = Arc::new(ScriptedTransport::new(vec![ToolDescriptor {
            name: "search".into(),
            description: None,
            input_schema: serde_json::json!({}),
            annotations: Default::default(),
        }]));
        let index = Arc::new(RecordingIndex {
            calls: std::sync::Mutex::new(Vec::new()),
        });
        let bus = Arc::new(NotificationBus::new());
        let mut rx = bus.add_handler().await;

        let mut config = UpstreamRecord::new("gh", TransportKind::Subprocess);
        config.command = Some("npx".into());
        let client = Arc::new(UpstreamClient::new(
            config,
            Arc::new(FixedTransportFactory {
                transport: transport.clone(),
            }),
            Arc::new(InMemoryOAuth::default()),
            Arc::new(NoIsolation),
            index.clone(),
            bus,
            BackoffCalculator::from_config(&UpstreamConfig::default()),
            Duration::from_secs(5),
        ));

        client.connect().await.unwrap();

        assert_eq!(index.calls.lock().unwrap().len(), 1);
        assert!(matches!(
            rx.recv().await,
            Some(UpstreamNotification::ToolListChanged { server }) if server == "gh"
        ));
    }

    #[tokio::test]
    async fn transport_pushed_notifications_reach_the_bus() {
        let transport = Arc::new(ScriptedTransport::new(vec![]));
        let bus = Arc::new(NotificationBus::new());
        let mut rx = bus.add_handler().await;

        let mut config = UpstreamRecord::new("gh", TransportKind::Subprocess);
        config.command = Some("npx".into());
        let client = Arc::new(UpstreamClient::new(
            config,
            Arc::new(FixedTransportFactory {
                transport: transport.clone(),
            }),
            Arc::new(InMemoryOAuth::default()),
            Arc::new(NoIsolation),
            Arc::new(NullIndexSink),
            bus,
            BackoffCalculator::from_config(&UpstreamConfig::default()),
            Duration::from_secs(5),
        ));

        client.connect().await.unwrap();
        transport
            .push_notification(UpstreamNotification::ResourceUpdated {
                server: "gh".into(),
                uri: "file:///x".into(),
            })
            .await;

        assert!(matches!(
            rx.recv().await,
            Some(UpstreamNotification::ResourceUpdated { server, .. }) if server == "gh"
        ));
    }
}
