//! Exponential backoff retry policy with a fixed cooldown for capacity errors.

use std::time::Duration;

use crate::error::RpcError;

/// Configuration for the retry policy.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
    /// Caps exponential growth.
    pub max_backoff: Duration,
    /// Multiplier applied to the backoff on each retry.
    pub multiplier: f64,
    /// Fixed delay after a capacity error (429, rate limited, no healthy providers).
    pub capacity_cooldown: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
            capacity_cooldown: Duration::from_secs(5),
        }
    }
}

/// Stateless retry policy: computes the next delay given the attempt number.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Delay after the `attempt`-th failure (1-based), or `None` once every
    /// attempt has been used.
    pub fn next_delay(&self, attempt: u32, error: &RpcError) -> Option<Duration> {
        if !self.should_retry(attempt) {
            return None;
        }
        if error.is_capacity() {
            return Some(self.config.capacity_cooldown);
        }
        Some(self.backoff(attempt))
    }

    /// Plain exponential backoff for the `attempt`-th failure.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_ms = self.config.initial_backoff.as_millis() as f64 * self.config.multiplier.powi(exp);
        let cap_ms = self.config.max_backoff.as_millis() as f64;
        Duration::from_millis(base_ms.min(cap_ms) as u64)
    }

    /// `true` if another attempt may follow the `attempt`-th failure.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.config.max_attempts
    }
}
