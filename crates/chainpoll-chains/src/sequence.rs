//! Sequence-based chains (Aptos, Sei): event streams paged by sequence number.
//!
//! The window is `{from_sequence, limit}`. `from_sequence` is the persisted
//! `last_sequence` itself, so the last item of one cycle is read again at the
//! start of the next. The limit follows the stream's pace: the distance
//! covered by the previous cycle, or `batch_size` when the cursor did not
//! move (or is incomplete).

use async_trait::async_trait;

use chainpoll_core::config::JobConfig;
use chainpoll_core::cursor::SequenceCursor;
use chainpoll_core::error::PollError;
use chainpoll_core::source::{Batch, PollSource, RangeAdvancer};
use chainpoll_core::types::{Advance, Commitment, EventFilter, SequenceWindow};
use chainpoll_rpc::{ResilientClient, RpcError};

use crate::client::rpc_err;

/// Items that carry their position in the stream.
pub trait Sequenced {
    fn sequence(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SequenceAdvancer;

impl RangeAdvancer for SequenceAdvancer {
    type Cursor = SequenceCursor;
    type Window = SequenceWindow;

    fn next_range(
        &self,
        cursor: Option<&SequenceCursor>,
        head: u64,
        cfg: &JobConfig,
    ) -> Advance<SequenceWindow> {
        let last = cursor.and_then(|c| c.last_sequence);
        let (from_sequence, overridden) = match (last, cfg.from()) {
            (Some(last), Some(from)) if from > last => (from, true),
            (Some(last), _) => (last, false),
            (None, Some(from)) => (from, true),
            (None, None) => (head, true),
        };
        if from_sequence > head {
            return Advance::CaughtUp { head };
        }
        // Only the already-handled item would be re-read.
        if !overridden && last == Some(head) {
            return Advance::CaughtUp { head };
        }

        let mut limit = match cursor {
            Some(c) if !overridden && !c.is_stalled() => match (c.previous_sequence, c.last_sequence) {
                (Some(prev), Some(last)) => last.saturating_sub(prev) + 1,
                _ => cfg.batch_size(),
            },
            _ => cfg.batch_size(),
        };
        if let Some(to) = cfg.to() {
            if from_sequence > to {
                return Advance::CaughtUp { head };
            }
            limit = limit.min(to - from_sequence + 1);
        }
        limit = limit.min(head - from_sequence + 1);

        Advance::Fetch(SequenceWindow {
            from_sequence,
            limit,
        })
    }
}

/// Chain reads for a sequence-based event stream.
#[async_trait]
pub trait SequenceRepository: Send + Sync {
    type Item: Sequenced + Send + Sync + 'static;

    /// Highest sequence number currently in the stream selected by `filter`.
    async fn head(&self, commitment: Commitment, filter: &EventFilter) -> Result<u64, RpcError>;

    /// Up to `window.limit` items starting at `window.from_sequence`.
    async fn fetch(&self, window: SequenceWindow, filter: &EventFilter) -> Result<Vec<Self::Item>, RpcError>;
}

/// [`PollSource`] for any [`SequenceRepository`].
pub struct SequenceSource<R> {
    repo: R,
    client: ResilientClient,
    advancer: SequenceAdvancer,
}

impl<R: SequenceRepository> SequenceSource<R> {
    pub fn new(repo: R, client: ResilientClient) -> Self {
        Self {
            repo,
            client,
            advancer: SequenceAdvancer,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }
}

#[async_trait]
impl<R: SequenceRepository> PollSource for SequenceSource<R> {
    type Item = R::Item;
    type Cursor = SequenceCursor;

    async fn fetch_next(
        &self,
        cursor: Option<&SequenceCursor>,
        cfg: &JobConfig,
    ) -> Result<Batch<R::Item, SequenceCursor>, PollError> {
        let commitment = cfg.commitment();
        let filter = cfg.filter();
        let head = self
            .client
            .execute(|| self.repo.head(commitment, filter))
            .await
            .map_err(rpc_err)?;

        let window = match self.advancer.next_range(cursor, head, cfg) {
            Advance::Fetch(window) => window,
            Advance::CaughtUp { head } => return Ok(Batch::caught_up(head)),
        };

        let items = self
            .client
            .execute(|| self.repo.fetch(window, filter))
            .await
            .map_err(rpc_err)?;

        let next = items
            .iter()
            .map(Sequenced::sequence)
            .max()
            .map(|max| cursor.copied().unwrap_or_default().advance(max));

        tracing::debug!(%window, head, items = items.len(), "fetched sequence window");
        Ok(Batch {
            items,
            cursor: next,
            window: window.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainpoll_core::config::Chain;

    fn cfg(batch: u64) -> JobConfig {
        JobConfig::builder("seq", Chain::Aptos).batch_size(batch).build().unwrap()
    }

    fn window(from_sequence: u64, limit: u64) -> Advance<SequenceWindow> {
        Advance::Fetch(SequenceWindow { from_sequence, limit })
    }

    #[test]
    fn stalled_cursor_uses_batch_size() {
        let c = SequenceCursor::new(146_040, 146_040);
        assert_eq!(SequenceAdvancer.next_range(Some(&c), 1_000_000, &cfg(100)), window(146_040, 100));
    }

    #[test]
    fn moving_cursor_uses_last_distance() {
        let c = SequenceCursor::new(146_000, 146_040);
        assert_eq!(SequenceAdvancer.next_range(Some(&c), 1_000_000, &cfg(100)), window(146_040, 41));
    }

    #[test]
    fn incomplete_cursor_uses_batch_size() {
        let c = SequenceCursor {
            previous_sequence: None,
            last_sequence: Some(5),
        };
        assert_eq!(SequenceAdvancer.next_range(Some(&c), 1_000, &cfg(25)), window(5, 25));
    }

    #[test]
    fn clamped_by_head_and_configured_end() {
        let c = SequenceCursor::new(100, 100);
        assert_eq!(SequenceAdvancer.next_range(Some(&c), 130, &cfg(100)), window(100, 31));

        let bounded = JobConfig::builder("seq", Chain::Sei).from(0).to(110).build().unwrap();
        assert_eq!(SequenceAdvancer.next_range(Some(&c), 130, &bounded), window(100, 11));
    }

    #[test]
    fn configured_from_ahead_wins() {
        let c = SequenceCursor::new(10, 20);
        let ahead = JobConfig::builder("seq", Chain::Aptos).from(500).batch_size(50).build().unwrap();
        assert_eq!(SequenceAdvancer.next_range(Some(&c), 1_000, &ahead), window(500, 50));
    }

    #[test]
    fn new_job_starts_at_head() {
        assert_eq!(SequenceAdvancer.next_range(None, 77, &cfg(100)), window(77, 1));
    }

    #[test]
    fn caught_up_cases() {
        let at_head = SequenceCursor::new(50, 50);
        assert_eq!(
            SequenceAdvancer.next_range(Some(&at_head), 50, &cfg(100)),
            Advance::CaughtUp { head: 50 }
        );
        let ahead = JobConfig::builder("seq", Chain::Aptos).from(90).build().unwrap();
        assert_eq!(SequenceAdvancer.next_range(None, 80, &ahead), Advance::CaughtUp { head: 80 });
    }
}
