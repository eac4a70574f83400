//! Sei: contract transactions numbered by the indexer's sequence.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use chainpoll_core::types::{Commitment, EventFilter, SequenceWindow};
use chainpoll_rpc::RpcError;

use crate::cosmos::CosmosEvent;
use crate::sequence::{SequenceRepository, Sequenced};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeiTransaction {
    /// Position of this transaction in the contract's history.
    pub sequence: u64,
    pub hash: String,
    pub height: u64,
    pub contract: String,
    #[serde(default)]
    pub events: Vec<CosmosEvent>,
}

impl Sequenced for SeiTransaction {
    fn sequence(&self) -> u64 {
        self.sequence
    }
}

/// Raw reads against a Sei transaction indexer.
#[async_trait]
pub trait SeiRpc: Send + Sync {
    /// Highest sequence recorded for `contract`.
    async fn latest_sequence(&self, contract: &str) -> Result<u64, RpcError>;

    async fn transactions(&self, contract: &str, from_sequence: u64, limit: u64) -> Result<Vec<SeiTransaction>, RpcError>;
}

pub struct SeiRepository<C> {
    rpc: C,
}

impl<C: SeiRpc> SeiRepository<C> {
    pub fn new(rpc: C) -> Self {
        Self { rpc }
    }
}

fn contract(filter: &EventFilter) -> Result<&str, RpcError> {
    filter
        .addresses
        .first()
        .map(String::as_str)
        .ok_or_else(|| RpcError::other("sei job needs the contract address in `addresses`"))
}

#[async_trait]
impl<C: SeiRpc> SequenceRepository for SeiRepository<C> {
    type Item = SeiTransaction;

    async fn head(&self, _commitment: Commitment, filter: &EventFilter) -> Result<u64, RpcError> {
        self.rpc.latest_sequence(contract(filter)?).await
    }

    async fn fetch(&self, window: SequenceWindow, filter: &EventFilter) -> Result<Vec<SeiTransaction>, RpcError> {
        self.rpc
            .transactions(contract(filter)?, window.from_sequence, window.limit)
            .await
    }
}
