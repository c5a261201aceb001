//! Layered TOML configuration loading (file defaults, overridable at each
//! domain), mirroring the teacher's `ratchet-config::loader` file-then-domain
//! approach without the full CLI/env-parsing surface, which is out of scope
//! per spec.md §1.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domains::activity::ActivityConfig;
use crate::domains::health::HealthConfig;
use crate::domains::identity::IdentityConfig;
use crate::domains::store::StoreConfig;
use crate::domains::upstream::UpstreamConfig;
use crate::error::ConfigResult;
use crate::validation::Validatable;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    pub store: StoreConfig,
    pub upstream: UpstreamConfig,
    pub activity: ActivityConfig,
    pub identity: IdentityConfig,
    pub health: HealthConfig,
}

impl ProxyConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        self.store.validate()?;
        self.upstream.validate()?;
        self.activity.validate()?;
        self.identity.validate()?;
        self.health.validate()?;
        Ok(())
    }

    pub fn from_toml_str(contents: &str) -> ConfigResult<Self> {
        let cfg: ProxyConfig = toml::from_str(contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }
}
