//! EVM chains: logs or transactions per block window.
//!
//! The raw JSON-RPC client is supplied by the caller through [`EvmRpc`];
//! [`EvmRepository`] cuts windows into node-friendly reads (log ranges in
//! chunks, block bodies one per call) and filters the results.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use chainpoll_core::config::FetchStrategy;
use chainpoll_core::types::{Commitment, EventFilter, Range};
use chainpoll_rpc::RpcError;

use crate::height::{per_block, HeightRepository};

/// A raw EVM log as returned by `eth_getLogs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvmLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    #[serde(rename = "blockNumber")]
    pub block_number: String,
    #[serde(rename = "blockHash")]
    pub block_hash: String,
    #[serde(rename = "transactionHash")]
    pub tx_hash: String,
    #[serde(rename = "logIndex")]
    pub log_index: String,
    #[serde(default)]
    pub removed: Option<bool>,
}

impl EvmLog {
    pub fn block_number_u64(&self) -> u64 {
        parse_hex_u64(&self.block_number)
    }

    pub fn log_index_u32(&self) -> u32 {
        parse_hex_u64(&self.log_index) as u32
    }

    /// `true` if this log was removed by a reorg.
    pub fn is_removed(&self) -> bool {
        self.removed.unwrap_or(false)
    }
}

/// A transaction from a block body (`eth_getBlockByNumber(n, true)`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvmTransaction {
    pub hash: String,
    pub from: String,
    /// `None` for contract creations.
    pub to: Option<String>,
    #[serde(rename = "blockNumber")]
    pub block_number: String,
    pub input: String,
}

impl EvmTransaction {
    pub fn block_number_u64(&self) -> u64 {
        parse_hex_u64(&self.block_number)
    }
}

/// What an EVM job hands to its handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvmItem {
    Log(EvmLog),
    Transaction(EvmTransaction),
}

impl EvmItem {
    pub fn block_number(&self) -> u64 {
        match self {
            Self::Log(l) => l.block_number_u64(),
            Self::Transaction(t) => t.block_number_u64(),
        }
    }
}

/// Raw EVM JSON-RPC reads.
#[async_trait]
pub trait EvmRpc: Send + Sync {
    /// `eth_blockNumber`, or the `safe`/`finalized` block tag.
    async fn block_number(&self, commitment: Commitment) -> Result<u64, RpcError>;

    async fn get_logs(&self, from: u64, to: u64, filter: &EventFilter) -> Result<Vec<EvmLog>, RpcError>;

    /// Transactions of block `number`; empty if the block has none.
    async fn block_transactions(&self, number: u64) -> Result<Vec<EvmTransaction>, RpcError>;
}

/// Default span of a single `eth_getLogs` call.
pub const DEFAULT_MAX_LOG_RANGE: u64 = 2_000;

/// [`HeightRepository`] over an [`EvmRpc`] client.
pub struct EvmRepository<C> {
    rpc: C,
    max_log_range: u64,
}

impl<C: EvmRpc> EvmRepository<C> {
    pub fn new(rpc: C) -> Self {
        Self {
            rpc,
            max_log_range: DEFAULT_MAX_LOG_RANGE,
        }
    }

    /// Cap on blocks per `eth_getLogs` call, for providers with tighter limits.
    pub fn with_max_log_range(mut self, blocks: u64) -> Self {
        self.max_log_range = blocks.max(1);
        self
    }

    /// `range` cut into `eth_getLogs` spans of at most `max_log_range` blocks.
    pub fn log_chunks(&self, range: Range) -> Vec<Range> {
        let mut chunks = Vec::new();
        let mut start = range.from();
        loop {
            let end = start.saturating_add(self.max_log_range - 1).min(range.to());
            chunks.extend(Range::new(start, end));
            if end >= range.to() {
                break;
            }
            start = end + 1;
        }
        chunks
    }

    /// Logs in `range` matching `filter`, in one call. Logs removed by a
    /// reorg are dropped.
    pub async fn logs(&self, range: Range, filter: &EventFilter) -> Result<Vec<EvmLog>, RpcError> {
        let logs = self.rpc.get_logs(range.from(), range.to(), filter).await?;
        Ok(logs.into_iter().filter(|l| !l.is_removed()).collect())
    }

    /// Transactions in `range` sent to a watched address (any address, if the
    /// filter has none). Contract creations are skipped.
    pub async fn transactions(
        &self,
        range: Range,
        filter: &EventFilter,
    ) -> Result<Vec<EvmTransaction>, RpcError> {
        let mut txs = Vec::new();
        for number in range.from()..=range.to() {
            let block = self.rpc.block_transactions(number).await?;
            txs.extend(
                block
                    .into_iter()
                    .filter(|tx| tx.to.as_deref().is_some_and(|to| filter.matches_address(to))),
            );
        }
        Ok(txs)
    }
}

#[async_trait]
impl<C: EvmRpc> HeightRepository for EvmRepository<C> {
    type Item = EvmItem;

    async fn head(&self, commitment: Commitment) -> Result<u64, RpcError> {
        self.rpc.block_number(commitment).await
    }

    fn split(&self, range: Range, strategy: FetchStrategy) -> Vec<Range> {
        match strategy {
            FetchStrategy::Logs => self.log_chunks(range),
            _ => per_block(range),
        }
    }

    async fn fetch(
        &self,
        range: Range,
        filter: &EventFilter,
        strategy: FetchStrategy,
    ) -> Result<Vec<EvmItem>, RpcError> {
        match strategy {
            FetchStrategy::Logs => Ok(self.logs(range, filter).await?.into_iter().map(EvmItem::Log).collect()),
            FetchStrategy::Transactions => Ok(self
                .transactions(range, filter)
                .await?
                .into_iter()
                .map(EvmItem::Transaction)
                .collect()),
            FetchStrategy::Events => Err(RpcError::other("EVM chains have no `events` strategy")),
        }
    }
}

/// Parse a hex-encoded string (with or without `0x`) to u64; 0 if malformed.
pub fn parse_hex_u64(s: &str) -> u64 {
    let s = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(s, 16).unwrap_or(0)
}
