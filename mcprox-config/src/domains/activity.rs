//! Activity-log retention configuration (spec §4.4, §7 retention failures).

use serde::{Deserialize, Serialize};

use crate::domains::{default_false, default_true};
use crate::error::ConfigResult;
use crate::validation::{validate_fraction, validate_positive, Validatable};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityConfig {
    /// Default page size for `List` when the caller does not specify one.
    pub default_list_limit: usize,
    /// Hard cap on page size regardless of caller request.
    pub max_list_limit: usize,

    /// `PruneExcess` target count.
    pub retention_target_max: u64,
    /// `PruneExcess` safety factor (0.0, 1.0]; final count is
    /// approximately `target_max * safety_factor`.
    pub retention_safety_factor: f64,

    /// Whether `excludeCallToolSuccess` defaults to true in filters
    /// (spec §4.4).
    #[serde(default = "default_true")]
    pub exclude_call_tool_success_by_default: bool,

    /// Whether `AppContext` runs a periodic time-based `Prune` sweep in
    /// addition to the per-insert `PruneExcess` enforcement
    /// (SPEC_FULL.md §11 "Activity retention scheduling").
    #[serde(default = "default_false")]
    pub auto_prune_enabled: bool,
    /// Interval between automatic sweeps, when enabled.
    pub auto_prune_interval_secs: u64,
    /// Records older than this are eligible for the automatic sweep.
    pub auto_prune_max_age_secs: u64,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            default_list_limit: 50,
            max_list_limit: 100,
            retention_target_max: 100_000,
            retention_safety_factor: 0.9,
            exclude_call_tool_success_by_default: true,
            auto_prune_enabled: false,
            auto_prune_interval_secs: 60 * 60,
            auto_prune_max_age_secs: 30 * 24 * 60 * 60,
        }
    }
}

impl Validatable for ActivityConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(
            self.default_list_limit as u64,
            "default_list_limit",
            self.domain_name(),
        )?;
        validate_positive(
            self.max_list_limit as u64,
            "max_list_limit",
            self.domain_name(),
        )?;
        if self.default_list_limit > self.max_list_limit {
            return Err(self.validation_error("default_list_limit must be <= max_list_limit"));
        }
        validate_positive(
            self.retention_target_max,
            "retention_target_max",
            self.domain_name(),
        )?;
        validate_fraction(
            self.retention_safety_factor,
            "retention_safety_factor",
            self.domain_name(),
        )?;
        if self.auto_prune_enabled {
            validate_positive(
                self.auto_prune_interval_secs,
                "auto_prune_interval_secs",
                self.domain_name(),
            )?;
            validate_positive(
                self.auto_prune_max_age_secs,
                "auto_prune_max_age_secs",
                self.domain_name(),
            )?;
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "activity"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_limits() {
        let cfg = ActivityConfig::default();
        assert_eq!(cfg.default_list_limit, 50);
        assert_eq!(cfg.max_list_limit, 100);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_default_limit_above_max() {
        let mut cfg = ActivityConfig::default();
        cfg.default_list_limit = 200;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_safety_factor() {
        let mut cfg = ActivityConfig::default();
        cfg.retention_safety_factor = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn auto_prune_is_off_by_default() {
        let cfg = ActivityConfig::default();
        assert!(!cfg.auto_prune_enabled);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_zero_interval_when_auto_prune_enabled() {
        let mut cfg = ActivityConfig::default();
        cfg.auto_prune_enabled = true;
        cfg.auto_prune_interval_secs = 0;
        assert!(cfg.validate().is_err());
    }
}
