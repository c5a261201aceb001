//! Durable and in-flight record types (spec §3 DATA MODEL).

mod activity;
mod identity;
mod session;
mod tool;
mod upstream;

pub use activity::{
    ActivitySource, ActivityStatus, ActivityType, IntentType, Severity, SensitiveDataDetection,
    SensitiveDataSummary,
};
pub use identity::ServerIdentity;
pub use session::{OAuthCompletionEvent, SessionRecord, SessionStatus};
pub use tool::{ExecutionKind, ToolCallRecord, ToolDescriptor, ToolHashRecord, ToolStatRecord};
pub use upstream::{IsolationConfig, OAuthBundle, TransportKind, UpstreamRecord};

/// Re-export shared across the workspace: the single activity-record type.
pub use activity::ActivityRecord;
