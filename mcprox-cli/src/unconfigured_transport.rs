//! Placeholder `TransportFactory` for the CLI binary.
//!
//! No concrete MCP transport library is in scope for this crate (spec §6:
//! transports are "consumed, not defined here"); an embedder linking a real
//! transport crate supplies its own `TransportFactory` to `Collaborators`
//! instead of this one. This factory lets the CLI start up, inspect
//! configuration, and query stored state without ever connecting upstream.

use std::sync::Arc;

use async_trait::async_trait;
use mcprox_core::model::UpstreamRecord;
use mcprox_core::{Error, Result};
use mcprox_upstream::client::TransportFactory;
use mcprox_upstream::transport::McpTransport;

pub struct UnconfiguredTransportFactory;

#[async_trait]
impl TransportFactory for UnconfiguredTransportFactory {
    async fn create(&self, config: &UpstreamRecord) -> Result<Arc<dyn McpTransport>> {
        Err(Error::transport_failed(
            config.name.clone(),
            "no transport library is linked into this build of mcprox",
        ))
    }
}
