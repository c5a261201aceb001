//! Application wiring, shutdown ordering, and the health surface (spec
//! §4.7, SPEC_FULL.md §11).

pub mod cache;
pub mod context;
pub mod health;
pub mod index;
pub mod isolation_passthrough;
pub mod logging;
pub mod oauth_store;

pub use cache::{Cache, CacheStats, StoreCache};
pub use context::{AppContext, Collaborators};
pub use health::{HealthSurface, Liveness, Readiness};
pub use index::{IndexSink, NullIndexSink};
pub use isolation_passthrough::PassthroughIsolation;
pub use logging::LogManager;
pub use oauth_store::StoreBackedOAuth;
