//! Log manager (spec §4.7 `Close()` ordering names a `Logs` step).
//! Grounded on the teacher's `ratchet_logging::init::init_simple_tracing`:
//! `tracing_subscriber::fmt` with an env filter, falling back to `info` and
//! tolerating a subscriber that is already installed (tests install their
//! own).

use tracing_subscriber::EnvFilter;

pub struct LogManager {
    closed: std::sync::atomic::AtomicBool,
}

impl LogManager {
    /// Installs the global `tracing` subscriber at `default_level` unless
    /// one is already set (e.g. by a test harness or an embedding binary).
    pub fn init(default_level: &str) -> Self {
        let env_filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(default_level))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        if tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .try_init()
            .is_err()
        {
            tracing::debug!("global tracing subscriber already installed, skipping");
        }

        Self {
            closed: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Idempotent; `tracing`'s global subscriber has no explicit close, so
    /// this only guards against double-close bookkeeping for callers that
    /// track it.
    pub fn close(&self) {
        self.closed.store(true, std::sync::atomic::Ordering::SeqCst);
    }
}
