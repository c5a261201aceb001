//! HealthSurface configuration (SPEC_FULL.md §11 "Health surface detail").

use serde::{Deserialize, Serialize};

use crate::error::ConfigResult;
use crate::validation::{validate_fraction, Validatable};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Fraction of enabled servers that must be reachable for `readiness()`
    /// to report ready.
    pub min_ready_fraction: f64,

    /// Deadline for the liveness probe's AsyncQueue enqueue check.
    pub liveness_probe_timeout_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            min_ready_fraction: 0.5,
            liveness_probe_timeout_ms: 1_000,
        }
    }
}

impl Validatable for HealthConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_fraction(
            self.min_ready_fraction,
            "min_ready_fraction",
            self.domain_name(),
        )?;
        if self.liveness_probe_timeout_ms == 0 {
            return Err(self.validation_error("liveness_probe_timeout_ms must not be 0"));
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "health"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(HealthConfig::default().validate().is_ok());
    }
}
