//! Height-based chains (EVM, Near, Algorand, Cosmos, Wormchain).
//!
//! Positions are block heights (rounds on Algorand). The window is
//! `[lower, min(lower + batch, to, head)]`, where `lower` is `cfg.from` when
//! it is ahead of the cursor, one past the cursor otherwise, and the head for
//! a brand-new job without `from`.

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};

use chainpoll_core::config::{FetchStrategy, JobConfig};
use chainpoll_core::cursor::HeightCursor;
use chainpoll_core::error::PollError;
use chainpoll_core::source::{Batch, PollSource, RangeAdvancer};
use chainpoll_core::types::{Advance, Commitment, EventFilter, Range};
use chainpoll_rpc::{ResilientClient, RpcError};

use crate::client::rpc_err;

/// Shared numeric window computation for height- and slot-based chains.
///
/// `tolerance`: when the head clamp would cut the naive window by more than
/// this many units, the head read is considered stale and the naive upper
/// bound is kept.
pub(crate) fn numeric_window(
    last: Option<u64>,
    head: u64,
    cfg: &JobConfig,
    tolerance: Option<u64>,
) -> Advance<Range> {
    let lower = match (last, cfg.from()) {
        (Some(last), Some(from)) if from > last => from,
        (Some(last), _) => last.saturating_add(1),
        (None, Some(from)) => from,
        (None, None) => head,
    };
    if lower > head {
        return Advance::CaughtUp { head };
    }

    let mut upper = lower.saturating_add(cfg.batch_size());
    if let Some(to) = cfg.to() {
        upper = upper.min(to);
    }
    if upper > head {
        let stale_head = tolerance.is_some_and(|t| upper - head > t);
        if !stale_head {
            upper = head;
        }
    }

    match Range::new(lower, upper) {
        Some(range) => Advance::Fetch(range),
        None => Advance::CaughtUp { head },
    }
}

/// Range advancer for height cursors.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeightAdvancer {
    head_tolerance: Option<u64>,
}

impl HeightAdvancer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep windows that overshoot the head by more than `tolerance` blocks
    /// (the head read is assumed stale). Used for Near.
    pub fn with_head_tolerance(tolerance: u64) -> Self {
        Self {
            head_tolerance: Some(tolerance),
        }
    }
}

impl RangeAdvancer for HeightAdvancer {
    type Cursor = HeightCursor;
    type Window = Range;

    fn next_range(&self, cursor: Option<&HeightCursor>, head: u64, cfg: &JobConfig) -> Advance<Range> {
        numeric_window(cursor.map(|c| c.last_block), head, cfg, self.head_tolerance)
    }
}

/// Chain reads for a height-based chain.
///
/// A window is read as one or more RPC calls: [`split`](Self::split) cuts it
/// into the sub-ranges a single [`fetch`](Self::fetch) call serves, and the
/// source runs each of them through the job's client.
#[async_trait]
pub trait HeightRepository: Send + Sync {
    type Item: Send + Sync + 'static;

    /// Current head height at `commitment`.
    async fn head(&self, commitment: Commitment) -> Result<u64, RpcError>;

    /// Sub-ranges of `range`, in order, each read by one RPC call.
    fn split(&self, range: Range, _strategy: FetchStrategy) -> Vec<Range> {
        vec![range]
    }

    /// Items in `range` (inclusive) matching `filter`; one RPC call for a
    /// range produced by [`split`](Self::split).
    async fn fetch(
        &self,
        range: Range,
        filter: &EventFilter,
        strategy: FetchStrategy,
    ) -> Result<Vec<Self::Item>, RpcError>;
}

/// One sub-range per block.
pub(crate) fn per_block(range: Range) -> Vec<Range> {
    (range.from()..=range.to()).map(Range::point).collect()
}

/// Sub-range reads kept in flight at once per window.
pub const DEFAULT_FETCH_CONCURRENCY: usize = 8;

/// [`PollSource`] for any [`HeightRepository`].
pub struct HeightSource<R> {
    repo: R,
    client: ResilientClient,
    advancer: HeightAdvancer,
    concurrency: usize,
}

impl<R: HeightRepository> HeightSource<R> {
    pub fn new(repo: R, client: ResilientClient) -> Self {
        Self {
            repo,
            client,
            advancer: HeightAdvancer::new(),
            concurrency: DEFAULT_FETCH_CONCURRENCY,
        }
    }

    pub fn with_advancer(mut self, advancer: HeightAdvancer) -> Self {
        self.advancer = advancer;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }
}

#[async_trait]
impl<R: HeightRepository> PollSource for HeightSource<R> {
    type Item = R::Item;
    type Cursor = HeightCursor;

    async fn fetch_next(
        &self,
        cursor: Option<&HeightCursor>,
        cfg: &JobConfig,
    ) -> Result<Batch<R::Item, HeightCursor>, PollError> {
        let commitment = cfg.commitment();
        let head = self
            .client
            .execute(|| self.repo.head(commitment))
            .await
            .map_err(rpc_err)?;

        let range = match self.advancer.next_range(cursor, head, cfg) {
            Advance::Fetch(range) => range,
            Advance::CaughtUp { head } => return Ok(Batch::caught_up(head)),
        };

        let filter = cfg.filter();
        let strategy = cfg.strategy();
        let parts = self.repo.split(range, strategy);
        let calls = parts.len();
        let chunks: Vec<Vec<R::Item>> = stream::iter(parts)
            .map(|part| self.client.execute(move || self.repo.fetch(part, filter, strategy)))
            .buffered(self.concurrency)
            .try_collect()
            .await
            .map_err(rpc_err)?;
        let items: Vec<R::Item> = chunks.into_iter().flatten().collect();

        tracing::debug!(%range, head, calls, items = items.len(), "fetched height window");
        Ok(Batch {
            items,
            cursor: Some(HeightCursor::new(range.to())),
            window: range.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainpoll_core::config::Chain;

    fn cfg(from: Option<u64>, to: Option<u64>, batch: u64) -> JobConfig {
        let mut b = JobConfig::builder("h", Chain::Ethereum).batch_size(batch);
        if let Some(f) = from {
            b = b.from(f);
        }
        if let Some(t) = to {
            b = b.to(t);
        }
        b.build().unwrap()
    }

    fn fetch(from: u64, to: u64) -> Advance<Range> {
        Advance::Fetch(Range::new(from, to).unwrap())
    }

    #[test]
    fn resumes_one_past_cursor_clamped_to_head() {
        let adv = HeightAdvancer::new();
        let got = adv.next_range(Some(&HeightCursor::new(10)), 21, &cfg(None, None, 100));
        assert_eq!(got, fetch(11, 21));
    }

    #[test]
    fn configured_from_ahead_of_cursor_wins() {
        let adv = HeightAdvancer::new();
        let got = adv.next_range(Some(&HeightCursor::new(5)), 100, &cfg(Some(50), None, 100));
        assert_eq!(got, fetch(50, 100));
    }

    #[test]
    fn configured_from_behind_cursor_is_ignored() {
        let adv = HeightAdvancer::new();
        let got = adv.next_range(Some(&HeightCursor::new(60)), 100, &cfg(Some(50), None, 10));
        assert_eq!(got, fetch(61, 71));
    }

    #[test]
    fn new_job_without_from_starts_at_head() {
        let adv = HeightAdvancer::new();
        assert_eq!(adv.next_range(None, 1_000, &cfg(None, None, 100)), fetch(1_000, 1_000));
    }

    #[test]
    fn clamps_to_configured_end() {
        let adv = HeightAdvancer::new();
        let got = adv.next_range(Some(&HeightCursor::new(10)), 1_000, &cfg(None, Some(40), 100));
        assert_eq!(got, fetch(11, 40));
    }

    #[test]
    fn caught_up_when_cursor_reached_head() {
        let adv = HeightAdvancer::new();
        let got = adv.next_range(Some(&HeightCursor::new(21)), 21, &cfg(None, None, 100));
        assert_eq!(got, Advance::CaughtUp { head: 21 });
    }

    #[test]
    fn never_yields_inverted_window() {
        let adv = HeightAdvancer::new();
        for head in 0..30 {
            for last in 0..30 {
                if let Advance::Fetch(r) =
                    adv.next_range(Some(&HeightCursor::new(last)), head, &cfg(None, Some(20), 5))
                {
                    assert!(r.from() <= r.to());
                    assert!(r.to() <= head && r.to() <= 20);
                }
            }
        }
    }

    #[test]
    fn deterministic() {
        let adv = HeightAdvancer::with_head_tolerance(100);
        let c = cfg(Some(3), None, 50);
        let cursor = HeightCursor::new(7);
        assert_eq!(adv.next_range(Some(&cursor), 40, &c), adv.next_range(Some(&cursor), 40, &c));
    }

    #[test]
    fn small_head_lag_is_clamped() {
        let adv = HeightAdvancer::with_head_tolerance(100);
        // naive upper 1_100, head 1_050: lag 50 ≤ tolerance → clamp.
        let got = adv.next_range(Some(&HeightCursor::new(999)), 1_050, &cfg(None, None, 100));
        assert_eq!(got, fetch(1_000, 1_050));
    }

    #[test]
    fn large_head_lag_keeps_wide_window() {
        let adv = HeightAdvancer::with_head_tolerance(100);
        // naive upper 1_500, head 1_200: lag 300 > tolerance → stale head, keep 1_500.
        let got = adv.next_range(Some(&HeightCursor::new(999)), 1_200, &cfg(None, None, 500));
        assert_eq!(got, fetch(1_000, 1_500));
    }

    // ─── HeightSource ────────────────────────────────────────────────────────

    /// One RPC call per block; records every call.
    struct PerBlock {
        calls: std::sync::Mutex<Vec<Range>>,
    }

    #[async_trait]
    impl HeightRepository for PerBlock {
        type Item = u64;

        async fn head(&self, _c: Commitment) -> Result<u64, RpcError> {
            Ok(14)
        }

        fn split(&self, range: Range, _s: FetchStrategy) -> Vec<Range> {
            per_block(range)
        }

        async fn fetch(&self, range: Range, _f: &EventFilter, _s: FetchStrategy) -> Result<Vec<u64>, RpcError> {
            self.calls.lock().unwrap().push(range);
            Ok(vec![range.from()])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn every_sub_read_spends_a_rate_limit_token() {
        use chainpoll_core::config::RpcSettings;

        let job = JobConfig::builder("near", Chain::Near)
            .from(11)
            .rpc(RpcSettings {
                rate_limit: 2,
                rate_period_ms: 10_000,
                ..RpcSettings::default()
            })
            .build()
            .unwrap();
        let repo = PerBlock {
            calls: std::sync::Mutex::new(vec![]),
        };
        let src = HeightSource::new(repo, crate::client::client_for(&job)).with_concurrency(2);

        let start = tokio::time::Instant::now();
        let batch = src.fetch_next(None, &job).await.unwrap();

        // Head + 4 blocks = 5 calls; a burst of 2, then one token per 5s.
        let elapsed = start.elapsed();
        assert!(elapsed >= std::time::Duration::from_millis(14_900), "{elapsed:?}");
        assert!(elapsed < std::time::Duration::from_secs(16), "{elapsed:?}");
        assert_eq!(src.repository().calls.lock().unwrap().len(), 4);
        assert_eq!(batch.items, vec![11, 12, 13, 14]);
        assert_eq!(batch.cursor, Some(HeightCursor::new(14)));
    }
}
