//! `UpstreamRecord` — durable configuration and status of one upstream (spec §3).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Transport kind for an upstream server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    Subprocess,
    Http,
    Sse,
    StreamableHttp,
    /// Transport not yet determined; resolved on first connect attempt.
    Auto,
}

/// OAuth configuration bundle attached to an upstream.
///
/// Scopes are stored in whatever order the operator supplied them; the
/// `IdentityEngine` is responsible for sorting them before hashing, not this
/// type, so that the raw record still reflects the operator's intent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthBundle {
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    #[serde(default)]
    pub pkce_enabled: bool,
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Per-server isolation (Docker) configuration; the mechanics live in the
/// external Docker-isolation collaborator (spec §6), this is just the
/// durable knob.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IsolationConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_limit_mb: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_limit: Option<f64>,
}

/// Durable configuration and status of one upstream MCP server.
///
/// Invariant: exactly one of `url`/`command` is set, unless
/// `transport == Auto`, in which case both may be empty pending detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamRecord {
    /// Stable name; also the primary key in the `upstreams` container.
    pub name: String,
    pub transport: TransportKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth: Option<OAuthBundle>,

    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub quarantined: bool,

    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isolation: Option<IsolationConfig>,
}

impl UpstreamRecord {
    /// Construct a new record with sane defaults (disabled, not quarantined),
    /// matching scenario 1 of spec §8: freshly-saved servers default to
    /// `enabled = false`.
    pub fn new(name: impl Into<String>, transport: TransportKind) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            transport,
            url: None,
            command: None,
            args: Vec::new(),
            working_dir: None,
            env: BTreeMap::new(),
            headers: BTreeMap::new(),
            oauth: None,
            enabled: false,
            quarantined: false,
            created: now,
            updated: now,
            isolation: None,
        }
    }

    /// Validates the "exactly one of {url, command}" invariant described in
    /// spec §3. `Auto` transport defers detection, so it is exempt.
    pub fn validate(&self) -> Result<(), String> {
        if matches!(self.transport, TransportKind::Auto) {
            return Ok(());
        }
        let has_url = self.url.as_deref().is_some_and(|s| !s.is_empty());
        let has_command = self.command.as_deref().is_some_and(|s| !s.is_empty());
        match (has_url, has_command) {
            (true, true) => Err(format!(
                "server {}: exactly one of url/command must be set, both were given",
                self.name
            )),
            (false, false) => Err(format!(
                "server {}: exactly one of url/command must be set, neither was given",
                self.name
            )),
            _ => Ok(()),
        }
    }

    pub fn qualified_key(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_defaults_disabled_and_not_quarantined() {
        let r = UpstreamRecord::new("gh", TransportKind::Subprocess);
        assert!(!r.enabled);
        assert!(!r.quarantined);
    }

    #[test]
    fn validate_rejects_both_url_and_command() {
        let mut r = UpstreamRecord::new("gh", TransportKind::Http);
        r.url = Some("https://example.com".into());
        r.command = Some("npx".into());
        assert!(r.validate().is_err());
    }

    #[test]
    fn validate_rejects_neither_url_nor_command() {
        let r = UpstreamRecord::new("gh", TransportKind::Http);
        assert!(r.validate().is_err());
    }

    #[test]
    fn validate_allows_auto_with_nothing_set() {
        let r = UpstreamRecord::new("gh", TransportKind::Auto);
        assert!(r.validate().is_ok());
    }

    #[test]
    fn validate_accepts_command_only() {
        let mut r = UpstreamRecord::new("gh", TransportKind::Subprocess);
        r.command = Some("npx".into());
        assert!(r.validate().is_ok());
    }
}
