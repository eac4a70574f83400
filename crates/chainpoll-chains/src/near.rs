//! Near: transactions to watched contracts, by block height.
//!
//! Near's head read (`status`) can lag well behind the blocks actually
//! available from the archival node; the advancer therefore keeps windows
//! that overshoot the head by more than the configured tolerance.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use chainpoll_core::config::{FetchStrategy, Tunables};
use chainpoll_core::types::{Commitment, EventFilter, Range};
use chainpoll_rpc::{ResilientClient, RpcError};

use crate::height::{per_block, HeightAdvancer, HeightRepository, HeightSource};

/// A Near transaction (or receipt outcome) touching a watched account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NearTransaction {
    pub hash: String,
    pub signer_id: String,
    pub receiver_id: String,
    pub block_height: u64,
    /// Raw `EVENT_JSON:` log lines emitted by the receipt.
    #[serde(default)]
    pub logs: Vec<String>,
}

/// Raw Near RPC reads.
#[async_trait]
pub trait NearRpc: Send + Sync {
    /// Latest block height at `commitment` (`final` or `optimistic`).
    async fn head_height(&self, commitment: Commitment) -> Result<u64, RpcError>;

    /// Transactions included in block `height`; `None` for heights that never
    /// produced a block.
    async fn block_transactions(&self, height: u64) -> Result<Option<Vec<NearTransaction>>, RpcError>;
}

pub struct NearRepository<C> {
    rpc: C,
}

impl<C: NearRpc> NearRepository<C> {
    pub fn new(rpc: C) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl<C: NearRpc> HeightRepository for NearRepository<C> {
    type Item = NearTransaction;

    async fn head(&self, commitment: Commitment) -> Result<u64, RpcError> {
        self.rpc.head_height(commitment).await
    }

    fn split(&self, range: Range, _strategy: FetchStrategy) -> Vec<Range> {
        per_block(range)
    }

    async fn fetch(
        &self,
        range: Range,
        filter: &EventFilter,
        _strategy: FetchStrategy,
    ) -> Result<Vec<NearTransaction>, RpcError> {
        let mut txs = Vec::new();
        for height in range.from()..=range.to() {
            if let Some(block) = self.rpc.block_transactions(height).await? {
                txs.extend(block.into_iter().filter(|tx| filter.matches_address(&tx.receiver_id)));
            }
        }
        Ok(txs)
    }
}

/// Height source for Near with the head tolerance from `tunables`.
pub fn near_source<C: NearRpc>(
    rpc: C,
    client: ResilientClient,
    tunables: &Tunables,
) -> HeightSource<NearRepository<C>> {
    HeightSource::new(NearRepository::new(rpc), client)
        .with_advancer(HeightAdvancer::with_head_tolerance(tunables.near_head_tolerance))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Chain;

    #[async_trait]
    impl NearRpc for Chain {
        async fn head_height(&self, _c: Commitment) -> Result<u64, RpcError> {
            Ok(120)
        }
        async fn block_transactions(&self, height: u64) -> Result<Option<Vec<NearTransaction>>, RpcError> {
            if height % 3 == 0 {
                return Ok(None);
            }
            Ok(Some(vec![NearTransaction {
                hash: format!("h{height}"),
                signer_id: "alice.near".into(),
                receiver_id: if height % 2 == 0 { "contract.portalbridge.near" } else { "other.near" }.into(),
                block_height: height,
                logs: vec![],
            }]))
        }
    }

    #[test]
    fn one_read_per_block() {
        let parts = NearRepository::new(Chain).split(Range::new(5, 7).unwrap(), FetchStrategy::Transactions);
        assert_eq!(parts, vec![Range::point(5), Range::point(6), Range::point(7)]);
    }

    #[tokio::test]
    async fn skips_missing_blocks_and_filters_receiver() {
        let repo = NearRepository::new(Chain);
        let txs = repo
            .fetch(
                Range::new(1, 10).unwrap(),
                &EventFilter::address("contract.portalbridge.near"),
                FetchStrategy::Transactions,
            )
            .await
            .unwrap();
        let heights: Vec<_> = txs.iter().map(|t| t.block_height).collect();
        assert_eq!(heights, vec![2, 4, 8, 10]);
    }
}
