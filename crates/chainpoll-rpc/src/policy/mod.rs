//! Resilience policies composed by [`crate::ResilientClient`].
//!
//! ```text
//! Request → [RateLimiter] → [RetryPolicy] → [CircuitBreaker] → op()
//! ```

pub mod circuit_breaker;
pub mod rate_limiter;
pub mod retry;

pub use circuit_breaker::{CallPermit, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use rate_limiter::{RateLimiter, RateLimiterConfig, TokenBucket};
pub use retry::{RetryConfig, RetryPolicy};
