//! Upstream-connection defaults (spec §4.5, §4.6).

use serde::{Deserialize, Serialize};

use crate::domains::default_true;
use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Maximum number of clients connecting concurrently during
    /// `ConnectAll` (spec §4.6 "bounded fan-out").
    pub max_concurrent_connects: usize,

    /// Initial backoff delay before the first retry.
    pub retry_initial_delay_ms: u64,

    /// Cap on the exponential backoff delay (spec §4.5 "capped").
    pub retry_max_delay_ms: u64,

    /// Backoff multiplier.
    pub retry_backoff_multiplier: f64,

    /// Whether newly-registered servers are auto-connected by `AddServer`.
    #[serde(default = "default_true")]
    pub auto_connect_new_servers: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            max_concurrent_connects: 8,
            retry_initial_delay_ms: 500,
            retry_max_delay_ms: 30_000,
            retry_backoff_multiplier: 2.0,
            auto_connect_new_servers: true,
        }
    }
}

impl Validatable for UpstreamConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(
            self.max_concurrent_connects as u64,
            "max_concurrent_connects",
            self.domain_name(),
        )?;
        validate_positive(
            self.retry_initial_delay_ms,
            "retry_initial_delay_ms",
            self.domain_name(),
        )?;
        validate_positive(
            self.retry_max_delay_ms,
            "retry_max_delay_ms",
            self.domain_name(),
        )?;
        if self.retry_max_delay_ms < self.retry_initial_delay_ms {
            return Err(self.validation_error(
                "retry_max_delay_ms must be >= retry_initial_delay_ms",
            ));
        }
        validate_positive(
            self.retry_backoff_multiplier,
            "retry_backoff_multiplier",
            self.domain_name(),
        )?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "upstream"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(UpstreamConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_max_delay_below_initial_delay() {
        let mut cfg = UpstreamConfig::default();
        cfg.retry_max_delay_ms = 10;
        cfg.retry_initial_delay_ms = 500;
        assert!(cfg.validate().is_err());
    }
}
