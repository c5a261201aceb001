//! Tool-invocation and tool-bookkeeping records (spec §3).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a tool call was executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionKind {
    Direct,
    CodeExecution,
}

/// Token-usage metrics reported by a transport, when available.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

/// One upstream tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub server_id: String,
    pub server_name: String,
    pub tool_name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_nanos: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_call_id: Option<String>,
    pub execution_kind: ExecutionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_version: Option<String>,
    #[serde(default)]
    pub tool_annotations: BTreeMap<String, serde_json::Value>,
}

/// Per-tool usage counter and last-used timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolStatRecord {
    pub server_name: String,
    pub tool_name: String,
    pub call_count: u64,
    pub last_used: DateTime<Utc>,
}

/// Per-tool content hash, used for change detection between discoveries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolHashRecord {
    pub server_name: String,
    pub tool_name: String,
    pub hash: String,
    pub updated: DateTime<Utc>,
}

/// Tool metadata as reported by an upstream's `ListTools`, cached on the
/// `UpstreamClient` after a successful `DiscoverTools` (spec §4.5, §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: serde_json::Value,
    #[serde(default)]
    pub annotations: BTreeMap<String, serde_json::Value>,
}
