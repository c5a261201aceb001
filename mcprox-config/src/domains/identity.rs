//! Identity garbage-collection configuration (spec §4.3 `CleanupStale`,
//! SPEC_FULL.md §11 "Stale-identity GC scheduling").

use serde::{Deserialize, Serialize};

use crate::domains::default_false;
use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Whether `AppContext` runs a background `CleanupStale` sweep.
    #[serde(default = "default_false")]
    pub auto_cleanup_enabled: bool,

    /// `lastSeen` age after which an identity is considered stale.
    pub stale_threshold_secs: u64,

    /// Interval between automatic sweeps, when enabled.
    pub cleanup_interval_secs: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            auto_cleanup_enabled: false,
            stale_threshold_secs: 30 * 24 * 60 * 60,
            cleanup_interval_secs: 6 * 60 * 60,
        }
    }
}

impl Validatable for IdentityConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(
            self.stale_threshold_secs,
            "stale_threshold_secs",
            self.domain_name(),
        )?;
        validate_positive(
            self.cleanup_interval_secs,
            "cleanup_interval_secs",
            self.domain_name(),
        )?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "identity"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_cleanup_is_off_by_default() {
        let cfg = IdentityConfig::default();
        assert!(!cfg.auto_cleanup_enabled);
        assert!(cfg.validate().is_ok());
    }
}
