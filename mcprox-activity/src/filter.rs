//! A plain value type evaluated by a pure predicate (spec §9 design note:
//! "avoid attaching it to a query DSL that mixes storage access").

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use mcprox_core::model::{
    ActivityRecord, ActivityStatus, ActivityType, IntentType, Severity,
};

/// Tri-state match for the `sensitiveData` filter field: `None` means "don't
/// care", `Some(true)`/`Some(false)` require detection present/absent.
pub type SensitiveDataFilter = Option<bool>;

#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub types: HashSet<ActivityType>,
    pub server: Option<String>,
    pub tool: Option<String>,
    pub session_id: Option<String>,
    pub status: Option<ActivityStatus>,
    pub request_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub intent_type: Option<IntentType>,
    pub sensitive_data: SensitiveDataFilter,
    pub detection_type: Option<String>,
    pub severity: Option<Severity>,
    /// Defaults to `true` per spec §4.4; construct with
    /// `Filter::default_exclude_call_tool_success()` or set explicitly.
    pub exclude_call_tool_success: bool,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl Filter {
    /// A `Filter` with every field at its "don't care" default, matching
    /// every record, except `exclude_call_tool_success` which defaults to
    /// `true` per spec — pass `false` explicitly to include those records.
    pub fn new() -> Self {
        Self {
            exclude_call_tool_success: true,
            ..Default::default()
        }
    }

    /// Pure function of `record`'s content and `self`'s content (spec §8
    /// invariant). All optional fields are AND-composed; within `types` the
    /// match is OR.
    pub fn matches(&self, record: &ActivityRecord) -> bool {
        if self.exclude_call_tool_success && record.is_redundant_call_tool_success() {
            return false;
        }
        if !self.types.is_empty() && !self.types.contains(&record.activity_type) {
            return false;
        }
        if let Some(ref server) = self.server {
            if record.server_name.as_deref() != Some(server.as_str()) {
                return false;
            }
        }
        if let Some(ref tool) = self.tool {
            if record.tool_name.as_deref() != Some(tool.as_str()) {
                return false;
            }
        }
        if let Some(ref session_id) = self.session_id {
            if record.session_id.as_deref() != Some(session_id.as_str()) {
                return false;
            }
        }
        if let Some(status) = self.status {
            if record.status != status {
                return false;
            }
        }
        if let Some(ref request_id) = self.request_id {
            if record.request_id.as_deref() != Some(request_id.as_str()) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if record.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if record.timestamp > until {
                return false;
            }
        }
        if let Some(intent) = self.intent_type {
            if record.intent_type() != Some(intent) {
                return false;
            }
        }
        if let Some(want_detected) = self.sensitive_data {
            let detected = record
                .sensitive_data()
                .map(|s| s.detected)
                .unwrap_or(false);
            if detected != want_detected {
                return false;
            }
        }
        if let Some(ref detection_type) = self.detection_type {
            let has_type = record
                .sensitive_data()
                .map(|s| s.detection_types().iter().any(|t| t == detection_type))
                .unwrap_or(false);
            if !has_type {
                return false;
            }
        }
        if let Some(severity) = self.severity {
            let max = record.sensitive_data().and_then(|s| s.max_severity());
            if max != Some(severity) {
                return false;
            }
        }
        true
    }

    pub fn effective_limit(&self, default_limit: usize, max_limit: usize) -> usize {
        self.limit.unwrap_or(default_limit).min(max_limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcprox_core::model::{ActivitySource, SensitiveDataDetection, SensitiveDataSummary};
    use std::collections::BTreeMap;

    fn record_with_metadata(metadata: BTreeMap<String, serde_json::Value>) -> ActivityRecord {
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
            duration_ms: Some(1),
            timestamp: Utc::now(),
            session_id: None,
            request_id: None,
            metadata,
        }
    }

    #[test]
    fn empty_filter_matches_every_record() {
        let mut filter = Filter::new();
        filter.exclude_call_tool_success = false;
        let record = record_with_metadata(BTreeMap::new());
        assert!(filter.matches(&record));
    }

    #[test]
    fn intent_type_filter_matches_scenario_from_spec() {
        let mut metadata = BTreeMap::new();
        metadata.insert(
            "tool_variant".into(),
            serde_json::Value::String("call_tool_destructive".into()),
        );
        let record = record_with_metadata(metadata);

        let mut destructive_filter = Filter::new();
        destructive_filter.exclude_call_tool_success = false;
        destructive_filter.intent_type = Some(IntentType::Destructive);
        assert!(destructive_filter.matches(&record));

        let mut read_filter = Filter::new();
        read_filter.exclude_call_tool_success = false;
        read_filter.intent_type = Some(IntentType::Read);
        assert!(!read_filter.matches(&record));
    }

    #[test]
    fn sensitive_data_filter_matches_scenario_from_spec() {
        let mut metadata = BTreeMap::new();
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
        metadata.insert(
            "sensitive_data_detection".into(),
            serde_json::to_value(summary).unwrap(),
        );
        let record = record_with_metadata(metadata);

        let mut critical = Filter::new();
        critical.exclude_call_tool_success = false;
        critical.sensitive_data = Some(true);
        critical.severity = Some(Severity::Critical);
        assert!(critical.matches(&record));

        let mut high = Filter::new();
        high.exclude_call_tool_success = false;
        high.severity = Some(Severity::High);
        assert!(!high.matches(&record));

        let mut wrong_type = Filter::new();
        wrong_type.exclude_call_tool_success = false;
        wrong_type.detection_type = Some("github_token".into());
        assert!(!wrong_type.matches(&record));
    }

    #[test]
    fn exclude_call_tool_success_default_true_hides_redundant_internal_calls() {
        let mut record = record_with_metadata(BTreeMap::new());
        record.activity_type = ActivityType::InternalToolCall;
        record.tool_name = Some("call_tool_write".into());
        record.status = ActivityStatus::Success;

        let filter = Filter::new();
        assert!(!filter.matches(&record));
    }
}
