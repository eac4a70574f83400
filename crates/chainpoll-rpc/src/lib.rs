//! chainpoll-rpc — resilient execution of chain RPC calls.
//!
//! Chain repositories hand their calls to a [`ResilientClient`], which
//! rate-limits, retries (with a fixed cooldown for provider capacity errors)
//! and trips a circuit breaker on sustained failure.

pub mod client;
pub mod error;
pub mod policy;

pub use client::{ResilientClient, RpcConfig};
pub use error::RpcError;
pub use policy::{CircuitState, RateLimiterConfig, RetryConfig};
