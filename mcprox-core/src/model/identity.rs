//! `ServerIdentity` — the canonical fingerprint (spec §3, §4.3).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The canonical, content-addressed identity of an upstream server
/// configuration. `id` is a pure function of `attributes`; see
/// `mcprox-identity::IdentityEngine::generate_server_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerIdentity {
    /// Hex-encoded SHA-256 over the canonical encoding of `attributes`.
    pub id: String,
    /// First 12 hex characters of `id`, for human display.
    pub fingerprint: String,
    pub server_name: String,
    /// Snapshot of the attributes the id was computed from, stored as JSON
    /// for forward compatibility with attribute-set changes.
    pub attributes: serde_json::Value,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Ordered set (insertion order, de-duplicated) of config paths that
    /// have referenced this identity.
    pub config_paths: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ServerIdentity {
    pub fn fingerprint_of(id: &str) -> String {
        id.chars().take(12).collect()
    }

    pub fn record_config_path(&mut self, path: &str) {
        if !self.config_paths.iter().any(|p| p == path) {
            self.config_paths.push(path.to_string());
        }
    }

    pub fn is_stale(&self, now: DateTime<Utc>, threshold: chrono::Duration) -> bool {
        now.signed_duration_since(self.last_seen) > threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_first_12_chars() {
        let id = "a".repeat(64);
        assert_eq!(ServerIdentity::fingerprint_of(&id).len(), 12);
    }

    #[test]
    fn record_config_path_deduplicates() {
        let mut identity = ServerIdentity {
            id: "abc".into(),
            fingerprint: "abc".into(),
            server_name: "gh".into(),
            attributes: serde_json::json!({}),
            first_seen: Utc::now(),
            last_seen: Utc::now(),
            config_paths: vec![],
            metadata: BTreeMap::new(),
        };
        identity.record_config_path("/etc/a.json");
        identity.record_config_path("/etc/a.json");
        identity.record_config_path("/etc/b.json");
        assert_eq!(identity.config_paths, vec!["/etc/a.json", "/etc/b.json"]);
    }
}
