//! The transport seam (spec §6): "subprocess-stdio, HTTP, SSE,
//! streamable-HTTP, auto-detect... The transport library receives
//! `(command, args, env, workingDir)` for subprocess or `(url, headers,
//! optional token store)` for network, plus an MCP session; it exposes
//! `Initialize`, `ListTools`, `CallTool`, `Close` and a notification
//! callback." Transports themselves are consumed, not defined, by this
//! crate — this module is the trait a concrete transport library implements.

use std::time::Duration;

use async_trait::async_trait;
use mcprox_core::model::ToolDescriptor;
use serde_json::Value;
use tokio::sync::mpsc;

/// Notifications a transport may push asynchronously, outside the
/// request/response cycle (spec §4.6 `AddNotificationHandler`).
#[derive(Debug, Clone)]
pub enum UpstreamNotification {
    ToolListChanged { server: String },
    ResourceUpdated { server: String, uri: String },
    Other { server: String, method: String, params: Value },
}

/// Result of a single `CallTool` invocation.
#[derive(Debug, Clone, Default)]
pub struct ToolCallOutcome {
    pub response: Value,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

/// What a transport reports back from a failed operation, distinguishing the
/// OAuth case so `UpstreamClient` can drive its `needs-oauth` diagnostic
/// (spec §4.5 "OAuth integration").
#[derive(Debug, Clone)]
pub enum TransportError {
    AuthenticationRequired,
    Io(String),
    Protocol(String),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AuthenticationRequired => write!(f, "authentication required"),
            Self::Io(m) => write!(f, "transport io error: {m}"),
            Self::Protocol(m) => write!(f, "protocol error: {m}"),
        }
    }
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// One live connection to an upstream MCP server. A concrete implementation
/// owns the subprocess or network session; `UpstreamClient` never reaches
/// past this trait.
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Performs the handshake. Must be called exactly once before any other
    /// method.
    async fn initialize(&self, timeout: Duration) -> TransportResult<()>;

    async fn list_tools(&self, timeout: Duration) -> TransportResult<Vec<ToolDescriptor>>;

    async fn call_tool(
        &self,
        tool_name: &str,
        arguments: Value,
        timeout: Duration,
    ) -> TransportResult<ToolCallOutcome>;

    /// Registers the sink unsolicited pushes (tool-list-changed,
    /// resource-updated) should be forwarded to (spec §6: the transport
    /// "exposes... a notification callback"). Called once per `connect()`
    /// before any other method after `initialize`; a transport with no push
    /// source of its own can leave this a no-op.
    async fn register_notification_sink(&self, sink: mpsc::Sender<UpstreamNotification>);

    /// Idempotent.
    async fn close(&self);
}

#[cfg(any(test, feature = "test-util"))]
pub mod test_double {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Scripted transport for exercising `UpstreamClient`/`UpstreamManager`
    /// without a real subprocess or network session.
    pub struct ScriptedTransport {
        pub fail_initialize: AtomicBool,
        pub fail_with_auth: AtomicBool,
        pub tools: Mutex<Vec<ToolDescriptor>>,
        pub closed: AtomicBool,
        notification_sink: Mutex<Option<mpsc::Sender<UpstreamNotification>>>,
    }

    impl ScriptedTransport {
        pub fn new(tools: Vec<ToolDescriptor>) -> Self {
            Self {
                fail_initialize: AtomicBool::new(false),
                fail_with_auth: AtomicBool::new(false),
                tools: Mutex::new(tools),
                closed: AtomicBool::new(false),
                notification_sink: Mutex::new(None),
            }
        }

        /// Simulates an unsolicited push from the upstream server, delivered
        /// to whatever sink was last registered via
        /// `register_notification_sink`. A no-op if nothing registered yet.
        pub async fn push_notification(&self, notification: UpstreamNotification) {
            let sink = self.notification_sink.lock().unwrap().clone();
            if let Some(sink) = sink {
                let _ = sink.send(notification).await;
            }
        }
    }

    #[async_trait]
    impl McpTransport for ScriptedTransport {
        async fn initialize(&self, _timeout: Duration) -> TransportResult<()> {
            if self.fail_with_auth.load(Ordering::SeqCst) {
                return Err(TransportError::AuthenticationRequired);
            }
            if self.fail_initialize.load(Ordering::SeqCst) {
                return Err(TransportError::Io("connection refused".into()));
            }
            Ok(())
        }

        async fn list_tools(&self, _timeout: Duration) -> TransportResult<Vec<ToolDescriptor>> {
            Ok(self.tools.lock().unwrap().clone())
        }

        async fn call_tool(
            &self,
            tool_name: &str,
            arguments: Value,
            _timeout: Duration,
        ) -> TransportResult<ToolCallOutcome> {
            Ok(ToolCallOutcome {
                response: serde_json::json!({"tool": tool_name, "echo": arguments}),
                input_tokens: Some(1),
                output_tokens: Some(1),
            })
        }

        async fn register_notification_sink(&self, sink: mpsc::Sender<UpstreamNotification>) {
            *self.notification_sink.lock().unwrap() = Some(sink);
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }
}
