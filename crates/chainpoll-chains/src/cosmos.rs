//! Cosmos SDK chains (Cosmos Hub, Wormchain): `tx_search` over a height window.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use chainpoll_core::config::FetchStrategy;
use chainpoll_core::types::{Commitment, EventFilter, Range};
use chainpoll_rpc::RpcError;

use crate::height::HeightRepository;

/// An ABCI event attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CosmosEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub attributes: Vec<Attribute>,
}

impl CosmosEvent {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.iter().find(|a| a.key == key).map(|a| a.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CosmosTx {
    pub hash: String,
    pub height: u64,
    pub events: Vec<CosmosEvent>,
}

impl CosmosTx {
    /// Contract addresses this transaction executed (`wasm._contract_address`).
    pub fn contracts(&self) -> impl Iterator<Item = &str> {
        self.events
            .iter()
            .filter(|e| e.kind == "wasm")
            .filter_map(|e| e.attribute("_contract_address"))
    }
}

/// Raw Tendermint RPC reads.
#[async_trait]
pub trait CosmosRpc: Send + Sync {
    /// Latest block height (`/status`).
    async fn latest_height(&self) -> Result<u64, RpcError>;

    /// `/tx_search` for `tx.height >= from AND tx.height <= to`, all pages.
    async fn tx_search(&self, from: u64, to: u64) -> Result<Vec<CosmosTx>, RpcError>;
}

pub struct CosmosRepository<C> {
    rpc: C,
}

impl<C: CosmosRpc> CosmosRepository<C> {
    pub fn new(rpc: C) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl<C: CosmosRpc> HeightRepository for CosmosRepository<C> {
    type Item = CosmosTx;

    /// Tendermint blocks are final once committed; `commitment` is ignored.
    async fn head(&self, _commitment: Commitment) -> Result<u64, RpcError> {
        self.rpc.latest_height().await
    }

    async fn fetch(
        &self,
        range: Range,
        filter: &EventFilter,
        _strategy: FetchStrategy,
    ) -> Result<Vec<CosmosTx>, RpcError> {
        let txs = self.rpc.tx_search(range.from(), range.to()).await?;
        Ok(txs
            .into_iter()
            .filter(|tx| filter.addresses.is_empty() || tx.contracts().any(|c| filter.matches_address(c)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wasm_tx(height: u64, contract: &str) -> CosmosTx {
        CosmosTx {
            hash: format!("{height:X}"),
            height,
            events: vec![CosmosEvent {
                kind: "wasm".into(),
                attributes: vec![Attribute {
                    key: "_contract_address".into(),
                    value: contract.into(),
                }],
            }],
        }
    }

    struct Rpc;

    #[async_trait]
    impl CosmosRpc for Rpc {
        async fn latest_height(&self) -> Result<u64, RpcError> {
            Ok(50)
        }
        async fn tx_search(&self, from: u64, to: u64) -> Result<Vec<CosmosTx>, RpcError> {
            Ok((from..=to)
                .map(|h| wasm_tx(h, if h % 2 == 0 { "wormhole1core" } else { "wormhole1other" }))
                .collect())
        }
    }

    #[tokio::test]
    async fn keeps_only_watched_contracts() {
        let repo = CosmosRepository::new(Rpc);
        let txs = repo
            .fetch(Range::new(1, 6).unwrap(), &EventFilter::address("wormhole1core"), FetchStrategy::Transactions)
            .await
            .unwrap();
        assert_eq!(txs.iter().map(|t| t.height).collect::<Vec<_>>(), vec![2, 4, 6]);
    }

    #[tokio::test]
    async fn empty_filter_keeps_everything() {
        let repo = CosmosRepository::new(Rpc);
        let txs = repo
            .fetch(Range::new(1, 3).unwrap(), &EventFilter::default(), FetchStrategy::Transactions)
            .await
            .unwrap();
        assert_eq!(txs.len(), 3);
    }
}
