//! `SessionRecord` and `OAuthCompletionEvent` (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Closed,
}

/// An MCP client session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub client_name: String,
    pub client_version: String,
    pub status: SessionStatus,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub last_activity: DateTime<Utc>,
    #[serde(default)]
    pub tool_call_count: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl SessionRecord {
    pub fn close(&mut self, at: DateTime<Utc>) {
        self.status = SessionStatus::Closed;
        self.end_time = Some(at);
    }
}

/// Cross-process nudge that an OAuth flow for `server_name` has completed.
/// Persisted into the `oauth_completion` container (spec §6) so the
/// `UpstreamManager` can consume it and retry the matching client — see
/// SPEC_FULL.md §11 for the resolution of spec §9(b).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthCompletionEvent {
    pub server_name: String,
    pub completed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

impl OAuthCompletionEvent {
    pub fn new(server_name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            completed_at: Utc::now(),
            processed_at: None,
        }
    }

    pub fn is_processed(&self) -> bool {
        self.processed_at.is_some()
    }

    pub fn mark_processed(&mut self, at: DateTime<Utc>) {
        self.processed_at = Some(at);
    }
}
