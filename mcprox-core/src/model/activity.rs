//! `ActivityRecord` — the unified event log entry (spec §3, §4.4).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    ToolCall,
    PolicyDecision,
    QuarantineChange,
    ServerChange,
    SystemStart,
    SystemStop,
    InternalToolCall,
    ConfigChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivitySource {
    Mcp,
    Cli,
    Api,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Success,
    Error,
    Blocked,
}

/// Operation classification extracted from request metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    Read,
    Write,
    Destructive,
}

impl IntentType {
    /// Derives intent from the legacy `metadata.tool_variant` field when
    /// `metadata.intent.operation_type` is absent (spec §4.4 derived
    /// projections).
    pub fn from_tool_variant(variant: &str) -> Option<Self> {
        match variant {
            "call_tool_read" => Some(Self::Read),
            "call_tool_write" => Some(Self::Write),
            "call_tool_destructive" => Some(Self::Destructive),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Destructive => "destructive",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Fixed rank used when computing the max severity across detections:
    /// critical > high > medium > low.
    fn rank(&self) -> u8 {
        match self {
            Severity::Low => 0,
            Severity::Medium => 1,
            Severity::High => 2,
            Severity::Critical => 3,
        }
    }

    pub fn max(self, other: Self) -> Self {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensitiveDataDetection {
    #[serde(rename = "type")]
    pub detection_type: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensitiveDataSummary {
    pub detected: bool,
    #[serde(default)]
    pub detections: Vec<SensitiveDataDetection>,
}

impl SensitiveDataSummary {
    /// The set of unique detection types present.
    pub fn detection_types(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for d in &self.detections {
            if !seen.contains(&d.detection_type.as_str()) {
                seen.push(d.detection_type.as_str());
            }
        }
        seen
    }

    /// Max severity across all detections, by the fixed rank.
    pub fn max_severity(&self) -> Option<Severity> {
        self.detections
            .iter()
            .map(|d| d.severity)
            .reduce(Severity::max)
    }
}

/// The unified event-log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    /// Lexicographically sortable, time-ordered id (ULID).
    pub id: String,
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    pub source: ActivitySource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
    #[serde(default)]
    pub response_truncated: bool,
    pub status: ActivityStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl ActivityRecord {
    /// Reads `metadata.intent.operation_type`, falling back to
    /// `metadata.tool_variant` (spec §4.4 derived projections).
    pub fn intent_type(&self) -> Option<IntentType> {
        if let Some(intent) = self.metadata.get("intent") {
            if let Some(op) = intent.get("operation_type").and_then(|v| v.as_str()) {
                return match op {
                    "read" => Some(IntentType::Read),
                    "write" => Some(IntentType::Write),
                    "destructive" => Some(IntentType::Destructive),
                    _ => None,
                };
            }
        }
        let variant = self.metadata.get("tool_variant")?.as_str()?;
        IntentType::from_tool_variant(variant)
    }

    pub fn sensitive_data(&self) -> Option<SensitiveDataSummary> {
        let value = self.metadata.get("sensitive_data_detection")?;
        serde_json::from_value(value.clone()).ok()
    }

    /// True for internal_tool_call records whose status is success and whose
    /// tool name begins with `call_tool_` — the real upstream call is
    /// separately logged as a tool_call (spec §4.4).
    pub fn is_redundant_call_tool_success(&self) -> bool {
        self.activity_type == ActivityType::InternalToolCall
            && self.status == ActivityStatus::Success
            && self
                .tool_name
                .as_deref()
                .is_some_and(|t| t.starts_with("call_tool_"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_record() -> ActivityRecord {
        ActivityRecord {
            id: "01".into(),
            activity_type: ActivityType::ToolCall,
            source: ActivitySource::Mcp,
            server_name: Some("gh".into()),
            tool_name: Some("call_tool_destructive".into()),
            arguments: None,
            response: None,
            response_truncated: false,
            status: ActivityStatus::Success,
            error_message: None,
            duration_ms: Some(10),
            timestamp: Utc::now(),
            session_id: None,
            request_id: None,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn intent_type_from_tool_variant_when_intent_absent() {
        let mut r = base_record();
        r.metadata.insert(
            "tool_variant".into(),
            serde_json::Value::String("call_tool_destructive".into()),
        );
        assert_eq!(r.intent_type(), Some(IntentType::Destructive));
    }

    #[test]
    fn intent_type_prefers_explicit_intent() {
        let mut r = base_record();
        r.metadata.insert(
            "intent".into(),
            serde_json::json!({"operation_type": "read"}),
        );
        r.metadata.insert(
            "tool_variant".into(),
            serde_json::Value::String("call_tool_destructive".into()),
        );
        assert_eq!(r.intent_type(), Some(IntentType::Read));
    }

    #[test]
    fn sensitive_data_max_severity_uses_fixed_rank() {
        let summary = SensitiveDataSummary {
            detected: true,
            detections: vec![
                SensitiveDataDetection {
                    detection_type: "aws_access_key".into(),
                    severity: Severity::Critical,
                },
                SensitiveDataDetection {
                    detection_type: "credit_card".into(),
                    severity: Severity::Medium,
                },
            ],
        };
        assert_eq!(summary.max_severity(), Some(Severity::Critical));
    }

    #[test]
    fn is_redundant_call_tool_success_matches_spec_scenario() {
        let mut r = base_record();
        r.activity_type = ActivityType::InternalToolCall;
        r.tool_name = Some("call_tool_write".into());
        r.status = ActivityStatus::Success;
        assert!(r.is_redundant_call_tool_success());

        r.status = ActivityStatus::Error;
        assert!(!r.is_redundant_call_tool_success());
    }
}
