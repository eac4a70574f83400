//! Solana: slot windows with skipped-slot handling.
//!
//! Many slots never produce a block. After the numeric window is picked, its
//! lower bound walks forward and its upper bound backward, one slot at a
//! time, to the nearest slot with a block. The walk is bounded: running out
//! of attempts fails the cycle instead of scanning the chain.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use chainpoll_core::config::{JobConfig, Tunables};
use chainpoll_core::cursor::SlotCursor;
use chainpoll_core::error::PollError;
use chainpoll_core::source::{Batch, PollSource, RangeAdvancer};
use chainpoll_core::types::{Advance, Commitment, EventFilter, Range};
use chainpoll_rpc::{ResilientClient, RpcError};

use crate::client::rpc_err;
use crate::height::numeric_window;

/// A produced block, as far as paging needs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolanaBlock {
    pub slot: u64,
    pub blockhash: String,
    /// First and last transaction signatures in the block, if any.
    #[serde(default)]
    pub first_signature: Option<String>,
    #[serde(default)]
    pub last_signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolanaTransaction {
    pub signature: String,
    pub slot: u64,
    #[serde(default)]
    pub block_time: Option<i64>,
    /// Program log lines.
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default)]
    pub raw: Value,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SlotAdvancer;

impl RangeAdvancer for SlotAdvancer {
    type Cursor = SlotCursor;
    type Window = Range;

    fn next_range(&self, cursor: Option<&SlotCursor>, head: u64, cfg: &JobConfig) -> Advance<Range> {
        numeric_window(cursor.map(|c| c.last_slot), head, cfg, None)
    }
}

/// Solana RPC reads.
#[async_trait]
pub trait SolanaRepository: Send + Sync {
    /// `getSlot` at `commitment`.
    async fn slot(&self, commitment: Commitment) -> Result<u64, RpcError>;

    /// `getBlock`; `None` for a skipped slot.
    async fn block(&self, slot: u64) -> Result<Option<SolanaBlock>, RpcError>;

    /// Transactions of the watched programs between two blocks (inclusive),
    /// e.g. `getSignaturesForAddress` bounded by the blocks' signatures.
    async fn transactions(
        &self,
        lower: &SolanaBlock,
        upper: &SolanaBlock,
        filter: &EventFilter,
    ) -> Result<Vec<SolanaTransaction>, RpcError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
        }
    }
}

pub struct SolanaSource<R> {
    repo: R,
    client: ResilientClient,
    search_limit: u64,
}

impl<R: SolanaRepository> SolanaSource<R> {
    pub fn new(repo: R, client: ResilientClient, tunables: &Tunables) -> Self {
        Self {
            repo,
            client,
            search_limit: tunables.solana_slot_search_limit.max(1),
        }
    }

    /// Nearest produced block from `start` towards `stop` (inclusive).
    ///
    /// `Ok(None)` if every slot up to `stop` was skipped within the limit.
    async fn find_block(&self, start: u64, stop: u64, direction: Direction) -> Result<Option<SolanaBlock>, PollError> {
        let mut slot = start;
        for _ in 0..self.search_limit {
            let found = self
                .client
                .execute(|| self.repo.block(slot))
                .await
                .map_err(rpc_err)?;
            if let Some(block) = found {
                return Ok(Some(block));
            }
            if slot == stop {
                return Ok(None);
            }
            slot = match direction {
                Direction::Forward => slot + 1,
                Direction::Backward => slot - 1,
            };
        }
        Err(PollError::SlotSearchExhausted {
            slot: start,
            limit: self.search_limit,
            direction: direction.as_str(),
        })
    }
}

#[async_trait]
impl<R: SolanaRepository> PollSource for SolanaSource<R> {
    type Item = SolanaTransaction;
    type Cursor = SlotCursor;

    async fn fetch_next(
        &self,
        cursor: Option<&SlotCursor>,
        cfg: &JobConfig,
    ) -> Result<Batch<SolanaTransaction, SlotCursor>, PollError> {
        let commitment = cfg.commitment();
        let head = self
            .client
            .execute(|| self.repo.slot(commitment))
            .await
            .map_err(rpc_err)?;

        let range = match SlotAdvancer.next_range(cursor, head, cfg) {
            Advance::Fetch(range) => range,
            Advance::CaughtUp { head } => return Ok(Batch::caught_up(head)),
        };

        let Some(lower) = self.find_block(range.from(), range.to(), Direction::Forward).await? else {
            tracing::debug!(%range, "no block produced in window");
            return Ok(Batch {
                items: vec![],
                cursor: Some(SlotCursor::new(range.to())),
                window: range.to_string(),
            });
        };
        let upper = match self.find_block(range.to(), lower.slot, Direction::Backward).await? {
            Some(block) => block,
            None => lower.clone(),
        };

        let filter = cfg.filter();
        let items = self
            .client
            .execute(|| self.repo.transactions(&lower, &upper, filter))
            .await
            .map_err(rpc_err)?;

        tracing::debug!(%range, lower = lower.slot, upper = upper.slot, items = items.len(), "fetched slot window");
        Ok(Batch {
            items,
            cursor: Some(SlotCursor::new(range.to())),
            window: range.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    use chainpoll_core::config::Chain;
    use chainpoll_rpc::RpcConfig;

    struct Slots {
        head: u64,
        produced: BTreeSet<u64>,
        visited: Mutex<Vec<u64>>,
        bounds: Mutex<Option<(u64, u64)>>,
    }

    impl Slots {
        fn new(head: u64, produced: impl IntoIterator<Item = u64>) -> Self {
            Self {
                head,
                produced: produced.into_iter().collect(),
                visited: Mutex::new(vec![]),
                bounds: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl SolanaRepository for Slots {
        async fn slot(&self, _c: Commitment) -> Result<u64, RpcError> {
            Ok(self.head)
        }
        async fn block(&self, slot: u64) -> Result<Option<SolanaBlock>, RpcError> {
            self.visited.lock().unwrap().push(slot);
            Ok(self.produced.contains(&slot).then(|| SolanaBlock {
                slot,
                blockhash: format!("hash{slot}"),
                first_signature: None,
                last_signature: None,
            }))
        }
        async fn transactions(
            &self,
            lower: &SolanaBlock,
            upper: &SolanaBlock,
            _f: &EventFilter,
        ) -> Result<Vec<SolanaTransaction>, RpcError> {
            *self.bounds.lock().unwrap() = Some((lower.slot, upper.slot));
            Ok(vec![])
        }
    }

    fn source(repo: Slots, limit: u64) -> SolanaSource<Slots> {
        let tunables = Tunables {
            solana_slot_search_limit: limit,
            ..Tunables::default()
        };
        SolanaSource::new(repo, ResilientClient::new("solana", RpcConfig::default()), &tunables)
    }

    fn cfg() -> JobConfig {
        JobConfig::builder("sol", Chain::Solana).batch_size(20).build().unwrap()
    }

    #[tokio::test]
    async fn bounds_walk_to_produced_blocks() {
        // Window [101, 121]; 101–102 and 120–121 skipped.
        let src = source(Slots::new(500, [103, 110, 119]), 10);
        let batch = src.fetch_next(Some(&SlotCursor::new(100)), &cfg()).await.unwrap();

        assert_eq!(*src.repo.bounds.lock().unwrap(), Some((103, 119)));
        assert_eq!(batch.cursor, Some(SlotCursor::new(121)));
    }

    #[tokio::test]
    async fn exhausted_search_fails_the_cycle() {
        let src = source(Slots::new(500, [150]), 5);
        let err = src.fetch_next(Some(&SlotCursor::new(100)), &cfg()).await.unwrap_err();
        assert!(matches!(
            err,
            PollError::SlotSearchExhausted { slot: 101, limit: 5, direction: "forward" }
        ));
        assert_eq!(*src.repo.visited.lock().unwrap(), vec![101, 102, 103, 104, 105]);
    }

    #[tokio::test]
    async fn fully_skipped_short_window_advances() {
        // Window [101, 103] with no blocks at all, walk ends at the upper bound.
        let job = JobConfig::builder("sol", Chain::Solana).batch_size(2).build().unwrap();
        let src = source(Slots::new(500, std::iter::empty()), 10);
        let batch = src.fetch_next(Some(&SlotCursor::new(100)), &job).await.unwrap();
        assert!(batch.items.is_empty());
        assert_eq!(batch.cursor, Some(SlotCursor::new(103)));
        assert!(src.repo.bounds.lock().unwrap().is_none());
    }
}
