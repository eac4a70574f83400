//! Job cursors: the last successfully processed position, per chain family.
//!
//! A cursor is the only durable state a job has. It is written after a whole
//! fetch → dispatch cycle succeeded, so a crash mid-cycle re-fetches the same
//! window on restart instead of losing it.

use serde::{Deserialize, Serialize};

use crate::error::PollError;

/// Height-based position (EVM, Near, Algorand, Cosmos, Wormchain).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeightCursor {
    pub last_block: u64,
}

impl HeightCursor {
    pub fn new(last_block: u64) -> Self {
        Self { last_block }
    }

    /// Returns the next block to process (cursor + 1).
    pub fn next_block(&self) -> u64 {
        self.last_block.saturating_add(1)
    }
}

/// Sequence-based position (Aptos, Sei).
///
/// Both the previous and the last sequence are kept: the distance between
/// them sizes the next window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceCursor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_sequence: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sequence: Option<u64>,
}

impl SequenceCursor {
    pub fn new(previous_sequence: u64, last_sequence: u64) -> Self {
        Self {
            previous_sequence: Some(previous_sequence),
            last_sequence: Some(last_sequence),
        }
    }

    /// Shift `last` into `previous` and record a new `last`.
    pub fn advance(&self, last_sequence: u64) -> Self {
        Self {
            previous_sequence: self.last_sequence.or(Some(last_sequence)),
            last_sequence: Some(last_sequence),
        }
    }

    /// `true` when nothing moved between the two most recent saves.
    pub fn is_stalled(&self) -> bool {
        match (self.previous_sequence, self.last_sequence) {
            (Some(prev), Some(last)) => prev == last,
            _ => true,
        }
    }
}

/// Sui position: a checkpoint and the digest of its last transaction, which
/// is the paging token for the next transaction query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointCursor {
    pub checkpoint: u64,
    pub digest: String,
}

impl CheckpointCursor {
    pub fn new(checkpoint: u64, digest: impl Into<String>) -> Self {
        Self {
            checkpoint,
            digest: digest.into(),
        }
    }
}

/// Solana position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotCursor {
    pub last_slot: u64,
}

impl SlotCursor {
    pub fn new(last_slot: u64) -> Self {
        Self { last_slot }
    }
}

/// Persisted cursor of any chain family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Cursor {
    Height(HeightCursor),
    Sequence(SequenceCursor),
    CheckpointDigest(CheckpointCursor),
    Slot(SlotCursor),
}

impl Cursor {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Height(_) => "height",
            Self::Sequence(_) => "sequence",
            Self::CheckpointDigest(_) => "checkpoint_digest",
            Self::Slot(_) => "slot",
        }
    }

    /// Best single-number summary of the position, for gauges and logs.
    pub fn position(&self) -> Option<u64> {
        match self {
            Self::Height(c) => Some(c.last_block),
            Self::Sequence(c) => c.last_sequence,
            Self::CheckpointDigest(c) => Some(c.checkpoint),
            Self::Slot(c) => Some(c.last_slot),
        }
    }
}

/// A family-specific cursor that travels through the store as a [`Cursor`].
pub trait FamilyCursor: Clone + Send + Sync + std::fmt::Debug + 'static {
    /// Name of the [`Cursor`] variant this type maps to.
    const KIND: &'static str;

    fn into_cursor(self) -> Cursor;

    /// Single-number position used for end-of-range checks and gauges.
    fn position(&self) -> Option<u64> {
        self.clone().into_cursor().position()
    }

    /// Extract this family's cursor; `None` if `cursor` is another variant.
    fn from_cursor(cursor: Cursor) -> Option<Self>;

    /// Like [`FamilyCursor::from_cursor`], but reports a mismatch as an error.
    fn try_from_cursor(job: &str, cursor: Cursor) -> Result<Self, PollError> {
        let found = cursor.kind();
        Self::from_cursor(cursor).ok_or_else(|| PollError::CursorMismatch {
            job: job.to_string(),
            expected: Self::KIND,
            found,
        })
    }
}

macro_rules! family_cursor {
    ($ty:ty, $variant:ident, $kind:literal) => {
        impl FamilyCursor for $ty {
            const KIND: &'static str = $kind;

            fn into_cursor(self) -> Cursor {
                Cursor::$variant(self)
            }

            fn from_cursor(cursor: Cursor) -> Option<Self> {
                match cursor {
                    Cursor::$variant(c) => Some(c),
                    _ => None,
                }
            }
        }

        impl From<$ty> for Cursor {
            fn from(c: $ty) -> Self {
                Cursor::$variant(c)
            }
        }
    };
}

family_cursor!(HeightCursor, Height, "height");
family_cursor!(SequenceCursor, Sequence, "sequence");
family_cursor!(CheckpointCursor, CheckpointDigest, "checkpoint_digest");
family_cursor!(SlotCursor, Slot, "slot");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn height_next_block() {
        assert_eq!(HeightCursor::new(500).next_block(), 501);
        assert_eq!(HeightCursor::new(u64::MAX).next_block(), u64::MAX);
    }

    #[test]
    fn sequence_advance_shifts_last_into_previous() {
        let c = SequenceCursor::new(146_000, 146_040);
        let next = c.advance(146_080);
        assert_eq!(next.previous_sequence, Some(146_040));
        assert_eq!(next.last_sequence, Some(146_080));
        assert!(!next.is_stalled());
        assert!(next.advance(146_080).is_stalled());
    }

    #[test]
    fn fresh_sequence_cursor_is_stalled() {
        assert!(SequenceCursor::default().is_stalled());
        let first = SequenceCursor::default().advance(7);
        assert_eq!(first, SequenceCursor::new(7, 7));
    }

    #[test]
    fn cursor_serializes_with_kind_tag() {
        let c: Cursor = HeightCursor::new(10).into();
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "height", "last_block": 10 }));

        let back: Cursor = serde_json::from_value(json).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn sequence_cursor_omits_missing_fields() {
        let c: Cursor = SequenceCursor::default().into();
        let json = serde_json::to_string(&c).unwrap();
        assert_eq!(json, r#"{"kind":"sequence"}"#);
    }

    #[test]
    fn mismatched_variant_is_reported() {
        let c: Cursor = SlotCursor::new(42).into();
        let err = HeightCursor::try_from_cursor("evm-mainnet", c).unwrap_err();
        assert!(matches!(
            err,
            PollError::CursorMismatch { expected: "height", found: "slot", .. }
        ));
    }

    #[test]
    fn position_summary() {
        assert_eq!(Cursor::from(CheckpointCursor::new(9, "abc")).position(), Some(9));
        assert_eq!(Cursor::from(SequenceCursor::default()).position(), None);
    }
}
