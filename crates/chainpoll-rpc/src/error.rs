//! RPC error types.

use thiserror::Error;

/// Errors produced by a chain RPC call or by the resilience layer around it.
#[derive(Debug, Error)]
pub enum RpcError {
    /// HTTP-level failure; `status` is set when the server answered.
    #[error("HTTP error{}: {message}", .status.map(|s| format!(" {s}")).unwrap_or_default())]
    Http { status: Option<u16>, message: String },

    /// Provider rejected the call for exceeding its quota.
    #[error("Rate limit exceeded (provider: {provider})")]
    RateLimited { provider: String },

    /// Provider pool reported no healthy backend.
    #[error("No healthy providers")]
    NoHealthyProviders,

    /// Circuit breaker is open; the call was not attempted.
    #[error("Circuit breaker open for client: {client}")]
    CircuitOpen { client: String },

    /// Request timed out after the configured duration.
    #[error("Request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// JSON-RPC error object returned by the node.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Response could not be deserialized.
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl RpcError {
    /// Shorthand for a plain message error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// `true` for provider capacity errors: HTTP 429, rate-limit responses and
    /// "no healthy providers". These are retried after a fixed cooldown
    /// instead of an exponential backoff.
    pub fn is_capacity(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::NoHealthyProviders => true,
            Self::Http { status: Some(429), .. } => true,
            Self::Http { message, .. } | Self::Rpc { message, .. } | Self::Other(message) => {
                mentions_capacity(message)
            }
            _ => false,
        }
    }

    /// `true` if the call was rejected by the local circuit breaker.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }
}

fn mentions_capacity(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    ["rate limit", "too many requests", "no healthy providers"]
        .iter()
        .any(|needle| lower.contains(needle))
}
