//! Error types for the polling pipeline.

use thiserror::Error;

/// Errors that can fail a single poll cycle (or the job's start-up).
#[derive(Debug, Error)]
pub enum PollError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Handler error in '{handler}': {reason}")]
    Handler { handler: String, reason: String },

    #[error("Persisted cursor for job '{job}' is a {found} cursor, expected {expected}")]
    CursorMismatch {
        job: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("No block found within {limit} slots of slot {slot} (searching {direction})")]
    SlotSearchExhausted {
        slot: u64,
        limit: u64,
        direction: &'static str,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Other(String),
}

impl PollError {
    /// Short, stable label used when recording the error to a stats sink.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Rpc(_) => "rpc",
            Self::Storage(_) => "storage",
            Self::Handler { .. } => "handler",
            Self::CursorMismatch { .. } => "cursor_mismatch",
            Self::SlotSearchExhausted { .. } => "slot_search_exhausted",
            Self::Config(_) => "config",
            Self::Other(_) => "other",
        }
    }
}

/// Invalid job configuration. Always fatal at construction time.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("job '{job}': from ({from}) is greater than to ({to})")]
    InvertedBounds { job: String, from: u64, to: u64 },

    #[error("job '{job}': batch size must be greater than zero")]
    ZeroBatchSize { job: String },

    #[error("job id must not be empty")]
    EmptyId,

    #[error("duplicate job id '{0}'")]
    DuplicateId(String),

    #[error("unknown {what} '{value}'")]
    Unknown { what: &'static str, value: String },

    #[error("job '{job}': {reason}")]
    Invalid { job: String, reason: String },

    #[error("environment variable {name}: cannot parse '{value}'")]
    Env { name: &'static str, value: String },

    #[error("cannot read job file: {0}")]
    Parse(String),
}

/// Error returned by a handler.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}
