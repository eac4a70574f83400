//! Shared types for the polling pipeline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ─── Range ────────────────────────────────────────────────────────────────────

/// An inclusive `[from, to]` window of chain-native positions.
///
/// `from <= to` holds for every value of this type; the only way to build one
/// is [`Range::new`], which refuses inverted bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Range {
    from: u64,
    to: u64,
}

impl Range {
    /// Returns `None` when `from > to`.
    pub fn new(from: u64, to: u64) -> Option<Self> {
        (from <= to).then_some(Self { from, to })
    }

    /// A zero-width window at `at`.
    pub fn point(at: u64) -> Self {
        Self { from: at, to: at }
    }

    pub fn from(&self) -> u64 {
        self.from
    }

    pub fn to(&self) -> u64 {
        self.to
    }

    /// Number of positions covered (always ≥ 1).
    pub fn width(&self) -> u64 {
        self.to - self.from + 1
    }

    pub fn contains(&self, position: u64) -> bool {
        self.from <= position && position <= self.to
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.from, self.to)
    }
}

// ─── SequenceWindow ──────────────────────────────────────────────────────────

/// A `{from_sequence, limit}` window, used by chains that page event streams
/// by sequence number (Aptos, Sei).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SequenceWindow {
    pub from_sequence: u64,
    pub limit: u64,
}

impl SequenceWindow {
    /// Last sequence number the window can return.
    pub fn last(&self) -> u64 {
        self.from_sequence + self.limit.saturating_sub(1)
    }
}

impl fmt::Display for SequenceWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}+{}", self.from_sequence, self.limit)
    }
}

// ─── Advance ─────────────────────────────────────────────────────────────────

/// Result of asking a range advancer for the next unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance<W> {
    /// Fetch this window.
    Fetch(W),
    /// Nothing new this cycle; `head` is the position the chain reported.
    CaughtUp { head: u64 },
}

impl<W> Advance<W> {
    pub fn is_caught_up(&self) -> bool {
        matches!(self, Self::CaughtUp { .. })
    }

    pub fn window(&self) -> Option<&W> {
        match self {
            Self::Fetch(w) => Some(w),
            Self::CaughtUp { .. } => None,
        }
    }
}

// ─── Commitment ──────────────────────────────────────────────────────────────

/// Durability level requested when reading the chain head.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    #[default]
    Latest,
    Safe,
    Finalized,
    /// Solana's "confirmed".
    Confirmed,
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Latest => "latest",
            Self::Safe => "safe",
            Self::Finalized => "finalized",
            Self::Confirmed => "confirmed",
        }
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Commitment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "latest" => Ok(Self::Latest),
            "safe" => Ok(Self::Safe),
            "finalized" => Ok(Self::Finalized),
            "confirmed" => Ok(Self::Confirmed),
            other => Err(ConfigError::Unknown {
                what: "commitment",
                value: other.to_string(),
            }),
        }
    }
}

// ─── EventFilter ─────────────────────────────────────────────────────────────

/// Which contracts/programs and event topics a job watches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    /// Contract addresses, program ids or Move module addresses (empty = all).
    #[serde(default)]
    pub addresses: Vec<String>,
    /// Event signatures / topic0 values / Move event types (empty = all).
    #[serde(default)]
    pub topics: Vec<String>,
}

impl EventFilter {
    /// Create a filter for a single address.
    pub fn address(addr: impl Into<String>) -> Self {
        Self {
            addresses: vec![addr.into()],
            ..Default::default()
        }
    }

    /// Add a topic filter.
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topics.push(topic.into());
        self
    }

    /// Returns `true` if `address` matches this filter.
    pub fn matches_address(&self, address: &str) -> bool {
        self.addresses.is_empty()
            || self.addresses.iter().any(|a| a.eq_ignore_ascii_case(address))
    }

    /// Returns `true` if `topic` matches this filter.
    pub fn matches_topic(&self, topic: &str) -> bool {
        self.topics.is_empty() || self.topics.iter().any(|t| t.eq_ignore_ascii_case(topic))
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
