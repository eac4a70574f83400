//! Glue between job configuration and the resilient RPC client.

use std::time::Duration;

use chainpoll_core::config::{JobConfig, RpcSettings};
use chainpoll_core::error::PollError;
use chainpoll_rpc::policy::{CircuitBreakerConfig, RateLimiterConfig, RetryConfig};
use chainpoll_rpc::{ResilientClient, RpcConfig, RpcError};

/// Translate a job's resilience settings into client configuration.
pub fn rpc_config(settings: &RpcSettings) -> RpcConfig {
    RpcConfig {
        retry: RetryConfig {
            max_attempts: settings.max_attempts,
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            max_backoff: Duration::from_millis(settings.max_backoff_ms),
            multiplier: 2.0,
            capacity_cooldown: Duration::from_millis(settings.capacity_cooldown_ms),
        },
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold: settings.failure_threshold,
            open_duration: Duration::from_millis(settings.open_duration_ms),
            success_threshold: 1,
        },
        rate_limiter: RateLimiterConfig {
            limit: settings.rate_limit,
            period: Duration::from_millis(settings.rate_period_ms),
        },
        ..RpcConfig::default()
    }
}

/// A fresh client for one job. Jobs never share clients, so one provider's
/// throttling cannot starve another job's budget.
pub fn client_for(cfg: &JobConfig) -> ResilientClient {
    ResilientClient::new(cfg.id(), rpc_config(cfg.rpc()))
}

pub(crate) fn rpc_err(e: RpcError) -> PollError {
    PollError::Rpc(e.to_string())
}
