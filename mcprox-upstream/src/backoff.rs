//! Exponential backoff with a cap, for `UpstreamClient` reconnection
//! (spec §4.5 "schedule retry with exponential backoff (capped)").

use std::time::Duration;

use mcprox_config::UpstreamConfig;
use rand::Rng;

/// Computes the delay before reconnection attempt `attempt` (1-indexed),
/// capped at `max_delay`, with up to ±20% jitter so that many clients
/// failing at once don't all retry in lockstep.
pub struct BackoffCalculator {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
}

impl BackoffCalculator {
    pub fn from_config(config: &UpstreamConfig) -> Self {
        Self {
            initial_delay: Duration::from_millis(config.retry_initial_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
            multiplier: config.retry_backoff_multiplier,
        }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let multiplier = self.multiplier.powi(exponent);
        let base_nanos = (self.initial_delay.as_nanos() as f64) * multiplier;
        let capped = Duration::from_nanos(base_nanos as u64).min(self.max_delay);
        jitter(capped)
    }
}

fn jitter(delay: Duration) -> Duration {
    let factor = rand::rng().random_range(0.8..1.2);
    Duration::from_nanos((delay.as_nanos() as f64 * factor) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calc() -> BackoffCalculator {
        BackoffCalculator {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }

    #[test]
    fn delay_grows_with_attempt_number() {
        let calc = calc();
        // jitter makes exact comparison flaky near boundaries, so compare
        // midpoints several attempts apart.
        let early = calc.delay_for_attempt(1);
        let later = calc.delay_for_attempt(4);
        assert!(later > early);
    }

    #[test]
    fn delay_is_capped_at_max() {
        let calc = calc();
        let delay = calc.delay_for_attempt(20);
        assert!(delay <= Duration::from_secs(36)); // max + jitter headroom
    }
}
