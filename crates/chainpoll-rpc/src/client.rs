//! Resilient execution of chain RPC calls.
//!
//! Every call goes through, outer to inner:
//! ```text
//! [RateLimiter] → [RetryPolicy] → [CircuitBreaker] → op()
//! ```
//! The limiter is passed once per `execute`; each retry attempt asks the
//! breaker for a permit and fails fast with `CircuitOpen` without one (open,
//! or half-open with its trial call already running). The retry loop treats
//! that like any other transient error.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::RpcError;
use crate::policy::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, RateLimiter, RateLimiterConfig, RetryConfig,
    RetryPolicy,
};

/// Configuration for [`ResilientClient`].
#[derive(Debug, Clone)]
pub struct RpcConfig {
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub rate_limiter: RateLimiterConfig,
    /// Per-attempt timeout; `None` leaves timing to the operation.
    pub call_timeout: Option<Duration>,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            rate_limiter: RateLimiterConfig::default(),
            call_timeout: Some(Duration::from_secs(30)),
        }
    }
}

struct Inner {
    name: Arc<str>,
    retry: RetryPolicy,
    circuit: CircuitBreaker,
    rate_limiter: RateLimiter,
    call_timeout: Option<Duration>,
}

/// Wraps arbitrary async RPC operations with rate limiting, retry and a
/// circuit breaker. Cheap to clone; clones share the bucket and the breaker.
#[derive(Clone)]
pub struct ResilientClient {
    inner: Arc<Inner>,
}

impl ResilientClient {
    pub fn new(name: impl Into<Arc<str>>, config: RpcConfig) -> Self {
        let name = name.into();
        Self {
            inner: Arc::new(Inner {
                circuit: CircuitBreaker::new(name.clone(), config.circuit_breaker),
                retry: RetryPolicy::new(config.retry),
                rate_limiter: RateLimiter::new(config.rate_limiter),
                call_timeout: config.call_timeout,
                name,
            }),
        }
    }

    /// Client with default configuration.
    pub fn default_for(name: impl Into<Arc<str>>) -> Self {
        Self::new(name, RpcConfig::default())
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.inner.circuit.state()
    }

    /// Run `op` until it succeeds or every attempt is used up; the last error
    /// is returned in the latter case.
    pub async fn execute<T, F, Fut>(&self, mut op: F) -> Result<T, RpcError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RpcError>>,
    {
        let inner = &*self.inner;
        inner.rate_limiter.acquire().await;

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let result = if let Some(permit) = inner.circuit.admit() {
                let outcome = self.call_once(&mut op).await;
                match &outcome {
                    Ok(_) => permit.success(),
                    Err(_) => permit.failure(),
                }
                outcome
            } else {
                Err(RpcError::CircuitOpen {
                    client: inner.name.to_string(),
                })
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            match inner.retry.next_delay(attempt, &err) {
                Some(delay) => {
                    tracing::warn!(
                        client = %inner.name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        capacity = err.is_capacity(),
                        error = %err,
                        "rpc call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    tracing::error!(
                        client = %inner.name,
                        attempts = attempt,
                        error = %err,
                        "rpc call failed, giving up"
                    );
                    return Err(err);
                }
            }
        }
    }

    async fn call_once<T, F, Fut>(&self, op: &mut F) -> Result<T, RpcError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RpcError>>,
    {
        match self.inner.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, op()).await {
                Ok(result) => result,
                Err(_) => Err(RpcError::Timeout {
                    ms: limit.as_millis() as u64,
                }),
            },
            None => op().await,
        }
    }
}

impl std::fmt::Debug for ResilientClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientClient")
            .field("name", &self.inner.name)
            .field("circuit", &self.inner.circuit.state())
            .finish()
    }
}
