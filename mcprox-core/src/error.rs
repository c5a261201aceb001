//! Error taxonomy for the connection/dispatch substrate.

use std::time::Duration;
use thiserror::Error;

/// Result type used throughout the mcprox crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by the Store, AsyncQueue, IdentityEngine, ActivityLog,
/// UpstreamClient and UpstreamManager.
#[derive(Error, Debug)]
pub enum Error {
    #[error("not found: {what}")]
    NotFound { what: String },

    #[error("already exists: {what}")]
    AlreadyExists { what: String },

    #[error("invalid config: {message}")]
    InvalidConfig { message: String },

    #[error("transport failed for server {server}: {message}")]
    TransportFailed { server: String, message: String },

    #[error("authentication required for server {server}")]
    AuthRequired { server: String },

    #[error("server {server} is quarantined")]
    Quarantined { server: String },

    #[error("server {server} is disabled")]
    Disabled { server: String },

    #[error("operation queue is full")]
    QueueFull,

    #[error("operation timed out after {waited:?}")]
    Timeout { waited: Duration },

    #[error("operation cancelled: {reason}")]
    Cancelled { reason: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn already_exists(what: impl Into<String>) -> Self {
        Self::AlreadyExists { what: what.into() }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn transport_failed(server: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TransportFailed {
            server: server.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether retrying the same operation might succeed without operator
    /// intervention (used by UpstreamClient's backoff loop to decide whether
    /// to keep retrying or to stay degraded awaiting external action).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::TransportFailed { .. } | Error::Timeout { .. } | Error::QueueFull
        )
    }
}
