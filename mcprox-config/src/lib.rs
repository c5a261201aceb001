//! Layered configuration domains for mcprox's connection/dispatch substrate.
//!
//! Each domain is an independent, `#[serde(default)]` struct with its own
//! `Validatable` implementation, following the teacher's one-module-per-concern
//! convention (see `ratchet-config::domains`).

pub mod domains;
pub mod error;
pub mod loader;
pub mod validation;

pub use domains::activity::ActivityConfig;
pub use domains::health::HealthConfig;
pub use domains::identity::IdentityConfig;
pub use domains::store::StoreConfig;
pub use domains::upstream::UpstreamConfig;
pub use error::{ConfigError, ConfigResult};
pub use loader::ProxyConfig;
pub use validation::Validatable;
