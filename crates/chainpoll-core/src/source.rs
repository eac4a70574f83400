//! The seams the engine is generic over.
//!
//! A [`RangeAdvancer`] is the pure "what next?" function of a chain family; a
//! [`PollSource`] couples it with a chain repository and turns one call into
//! a [`Batch`] of raw items plus the cursor to persist once they are handled.

use async_trait::async_trait;

use crate::config::JobConfig;
use crate::cursor::FamilyCursor;
use crate::error::PollError;
use crate::types::Advance;

/// Pure range-advancement logic for one chain family.
///
/// Implementations must not hold hidden state: the same
/// `(cursor, head, cfg)` triple always yields the same answer.
pub trait RangeAdvancer: Send + Sync {
    type Cursor;
    type Window;

    fn next_range(
        &self,
        cursor: Option<&Self::Cursor>,
        head: u64,
        cfg: &JobConfig,
    ) -> Advance<Self::Window>;
}

/// Output of one fetch.
#[derive(Debug, Clone)]
pub struct Batch<I, C> {
    pub items: Vec<I>,
    /// Cursor to persist after `items` were handled. `None` keeps the current one.
    pub cursor: Option<C>,
    /// Human-readable description of what was fetched (for logs).
    pub window: String,
}

impl<I, C> Batch<I, C> {
    /// Nothing fetched this cycle; the cursor stays where it is.
    pub fn caught_up(head: u64) -> Self {
        Self {
            items: vec![],
            cursor: None,
            window: format!("caught up at {head}"),
        }
    }

    pub fn is_caught_up(&self) -> bool {
        self.items.is_empty() && self.cursor.is_none()
    }
}

/// A chain-specific producer of batches, driven by the polling engine.
#[async_trait]
pub trait PollSource: Send + Sync {
    type Item: Send + Sync + 'static;
    type Cursor: FamilyCursor;

    /// `false` once the job has passed its configured `to` bound.
    fn has_next(&self, cursor: Option<&Self::Cursor>, cfg: &JobConfig) -> bool {
        match cursor.and_then(|c| c.position()) {
            Some(position) => !cfg.is_past_end(position),
            None => true,
        }
    }

    /// Read the chain head, pick the next window, fetch it.
    async fn fetch_next(
        &self,
        cursor: Option<&Self::Cursor>,
        cfg: &JobConfig,
    ) -> Result<Batch<Self::Item, Self::Cursor>, PollError>;
}
