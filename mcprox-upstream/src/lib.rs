//! Upstream MCP server connection lifecycle, aggregation, and dispatch
//! (spec §4.5, §4.6).

pub mod backoff;
pub mod client;
pub mod index;
pub mod isolation;
pub mod manager;
pub mod notify;
pub mod oauth;
pub mod transport;

pub use client::{ClientState, TransportFactory, UpstreamClient};
pub use index::{IndexSink, NullIndexSink};
pub use manager::{ServerStats, UpstreamManager};
pub use notify::NotificationBus;
pub use transport::{McpTransport, ToolCallOutcome, TransportError, UpstreamNotification};
