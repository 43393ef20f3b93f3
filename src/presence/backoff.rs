//! Subscription retry policy
//!
//! `delay = clamp(base × 2^attempt × (1 ± jitter), base, cap)`, with a
//! bounded attempt budget after which the subscription is abandoned.

use rand::Rng;
use std::time::Duration;

use crate::config::RetryConfig;

/// Exponential backoff with jitter
#[derive(Debug, Clone)]
pub struct Backoff {
    config: RetryConfig,
}

impl Backoff {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = rand::thread_rng().gen_range(-self.config.jitter..=self.config.jitter);
        self.delay_with_jitter(attempt, factor)
    }

    /// Deterministic core; `jitter_factor` must lie in `-jitter..=jitter`.
    pub fn delay_with_jitter(&self, attempt: u32, jitter_factor: f64) -> Duration {
        let base = self.config.base_ms as f64;
        // Saturate the exponent well before f64 range becomes a concern
        let exp = 2f64.powi(attempt.min(32) as i32);
        let raw = base * exp * (1.0 + jitter_factor);
        let clamped = raw.clamp(base, self.config.cap_ms as f64);
        Duration::from_millis(clamped as u64)
    }

    /// True once `attempt` retries have been spent.
    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt >= self.config.max_attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }
}
