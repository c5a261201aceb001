//! Search index sink (spec §2 data flow: "tool metadata streams into the
//! search indexer (external)... and into Store"). The trait itself lives in
//! `mcprox-upstream` now that `UpstreamClient` forwards newly-discovered
//! tools through it directly (see that crate's `index` module); re-exported
//! here so callers of this crate don't need to depend on `mcprox-upstream`
//! just to name the type.

pub use mcprox_upstream::index::{IndexSink, NullIndexSink};
