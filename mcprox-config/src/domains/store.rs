//! Embedded store configuration (spec §4.1, §6 storage layout).

use serde::{Deserialize, Serialize};

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the embedded store file on disk.
    pub path: String,

    /// How long the Store waits for the underlying file lock before
    /// concluding it is stale and recovering (spec §4.1).
    pub open_timeout_secs: u64,

    /// Capacity of the AsyncQueue's bounded channel (spec §4.2, fixed at
    /// 100 by spec but made configurable for tests).
    pub queue_capacity: usize,

    /// Timeout for synchronous AsyncQueue operations (spec §4.2, 30s).
    pub sync_op_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            open_timeout_secs: 5,
            queue_capacity: 100,
            sync_op_timeout_secs: 30,
        }
    }
}

impl Validatable for StoreConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.path.trim().is_empty() {
            return Err(self.validation_error("path must not be empty"));
        }
        validate_positive(self.open_timeout_secs, "open_timeout_secs", self.domain_name())?;
        validate_positive(self.queue_capacity as u64, "queue_capacity", self.domain_name())?;
        validate_positive(
            self.sync_op_timeout_secs,
            "sync_op_timeout_secs",
            self.domain_name(),
        )?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "store"
    }
}

fn default_store_path() -> String {
    "mcprox.db".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = StoreConfig::default();
        assert_eq!(cfg.queue_capacity, 100);
        assert_eq!(cfg.sync_op_timeout_secs, 30);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_empty_path() {
        let mut cfg = StoreConfig::default();
        cfg.path = "".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_queue_capacity() {
        let mut cfg = StoreConfig::default();
        cfg.queue_capacity = 0;
        assert!(cfg.validate().is_err());
    }
}
