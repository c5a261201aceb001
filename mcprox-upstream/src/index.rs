//! Search index sink (spec §2 data flow: "tool metadata streams into the
//! search indexer (external)... and into Store"). The indexer itself is an
//! external system, consumed not defined here, the same way
//! `TransportFactory`/`OAuthCollaborator`/`DockerIsolation` are: this trait
//! is the seam `UpstreamClient` forwards newly-discovered or changed tools
//! through.

use mcprox_core::model::ToolDescriptor;
use mcprox_core::Result;

pub trait IndexSink: Send + Sync {
    fn index_tools(&self, server: &str, tools: &[ToolDescriptor]) -> Result<()>;
    fn close(&self) -> Result<()>;
}

/// No external indexer configured; tool metadata still lands in `Store` via
/// `UpstreamClient`'s own cache regardless of whether an indexer is wired.
#[derive(Default)]
pub struct NullIndexSink;

impl IndexSink for NullIndexSink {
    fn index_tools(&self, _server: &str, _tools: &[ToolDescriptor]) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}
