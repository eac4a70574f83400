//! Token bucket rate limiter.
//!
//! Tokens accrue continuously at `limit / period` up to `limit`. Each call
//! consumes one token. When the bucket is empty, [`RateLimiter::acquire`]
//! sleeps until a token is available: excess calls are delayed, never dropped.
//! Waiters are served in arrival order.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Operations allowed per `period` (also the burst capacity).
    pub limit: u32,
    pub period: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            limit: 1_000,
            period: Duration::from_secs(10),
        }
    }
}

impl RateLimiterConfig {
    fn refill_per_sec(&self) -> f64 {
        f64::from(self.limit) / self.period.as_secs_f64().max(f64::EPSILON)
    }
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket.
///
/// The async mutex is held while a caller sleeps for its token, so later
/// callers queue behind it (tokio's mutex is fair).
pub struct TokenBucket {
    config: RateLimiterConfig,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            state: Mutex::new(BucketState {
                tokens: f64::from(config.limit),
                last_refill: Instant::now(),
            }),
            config,
        }
    }

    /// Take one token without waiting; `false` if the bucket is empty.
    pub async fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().await;
        self.refill(&mut state);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Take one token, waiting for it if necessary. Returns the time spent
    /// waiting for the refill.
    pub async fn acquire(&self) -> Duration {
        let mut state = self.state.lock().await;
        self.refill(&mut state);

        let mut waited = Duration::ZERO;
        if state.tokens < 1.0 {
            let deficit = 1.0 - state.tokens;
            let wait = Duration::from_secs_f64(deficit / self.config.refill_per_sec());
            tokio::time::sleep(wait).await;
            waited = wait;
            self.refill(&mut state);
        }
        // Float drift after the sleep can leave the bucket a hair short.
        state.tokens = (state.tokens - 1.0).max(0.0);
        waited
    }

    /// Currently available tokens.
    pub async fn available(&self) -> f64 {
        let mut state = self.state.lock().await;
        self.refill(&mut state);
        state.tokens
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens =
            (state.tokens + elapsed * self.config.refill_per_sec()).min(f64::from(self.config.limit));
        state.last_refill = now;
    }
}

/// Rate limiter shared by every call of one client.
pub struct RateLimiter {
    bucket: TokenBucket,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            bucket: TokenBucket::new(config),
        }
    }

    /// Wait for a slot. Logs when the caller had to queue.
    pub async fn acquire(&self) {
        let waited = self.bucket.acquire().await;
        if !waited.is_zero() {
            tracing::debug!(waited_ms = waited.as_millis() as u64, "rate limiter delayed call");
        }
    }

    pub async fn try_acquire(&self) -> bool {
        self.bucket.try_acquire().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn limiter(limit: u32, period_ms: u64) -> RateLimiter {
        RateLimiter::new(RateLimiterConfig {
            limit,
            period: Duration::from_millis(period_ms),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn burst_up_to_limit_is_immediate() {
        let rl = limiter(5, 1_000);
        let start = Instant::now();
        for _ in 0..5 {
            rl.acquire().await;
        }
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert!(!rl.try_acquire().await);
    }

    #[tokio::test(start_paused = true)]
    async fn excess_calls_are_delayed_not_dropped() {
        let rl = limiter(2, 1_000);
        let start = Instant::now();
        for _ in 0..4 {
            rl.acquire().await;
        }
        // Two tokens up front, then one every 500ms.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(999), "elapsed={elapsed:?}");
        assert!(elapsed <= Duration::from_millis(1_100), "elapsed={elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn waiters_are_served_in_order() {
        let rl = Arc::new(limiter(1, 100));
        rl.acquire().await;

        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut tasks = Vec::new();
        for i in 0..3 {
            let rl = rl.clone();
            let order = order.clone();
            tasks.push(tokio::spawn(async move {
                rl.acquire().await;
                order.lock().unwrap().push(i);
            }));
            // Make sure task `i` is queued before `i + 1` is spawned.
            tokio::task::yield_now().await;
        }
        for t in tasks {
            t.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn refill_is_capped_at_limit() {
        let rl = limiter(3, 1_000);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!((rl.bucket.available().await - 3.0).abs() < 1e-9);
    }
}
