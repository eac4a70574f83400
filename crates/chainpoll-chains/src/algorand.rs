//! Algorand: application-call transactions by round, via the indexer API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use chainpoll_core::config::FetchStrategy;
use chainpoll_core::types::{Commitment, EventFilter, Range};
use chainpoll_rpc::RpcError;

use crate::height::HeightRepository;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgorandTransaction {
    pub id: String,
    #[serde(rename = "confirmed-round")]
    pub confirmed_round: u64,
    pub sender: String,
    /// Set for application calls.
    #[serde(rename = "application-id", default)]
    pub application_id: Option<u64>,
    /// Base64 log entries of the application call.
    #[serde(default)]
    pub logs: Vec<String>,
}

/// Raw Algorand indexer reads.
#[async_trait]
pub trait AlgorandIndexer: Send + Sync {
    /// `/health` round: the last round the indexer has ingested.
    async fn current_round(&self) -> Result<u64, RpcError>;

    /// `/v2/transactions?min-round&max-round`, following `next-token` to the end.
    async fn transactions(&self, min_round: u64, max_round: u64) -> Result<Vec<AlgorandTransaction>, RpcError>;
}

pub struct AlgorandRepository<C> {
    indexer: C,
}

impl<C: AlgorandIndexer> AlgorandRepository<C> {
    pub fn new(indexer: C) -> Self {
        Self { indexer }
    }
}

#[async_trait]
impl<C: AlgorandIndexer> HeightRepository for AlgorandRepository<C> {
    type Item = AlgorandTransaction;

    async fn head(&self, _commitment: Commitment) -> Result<u64, RpcError> {
        self.indexer.current_round().await
    }

    /// Filter addresses are application ids in decimal.
    async fn fetch(
        &self,
        range: Range,
        filter: &EventFilter,
        _strategy: FetchStrategy,
    ) -> Result<Vec<AlgorandTransaction>, RpcError> {
        let txs = self.indexer.transactions(range.from(), range.to()).await?;
        Ok(txs
            .into_iter()
            .filter(|tx| match tx.application_id {
                Some(app) => filter.matches_address(&app.to_string()),
                None => filter.addresses.is_empty(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_indexer_json() {
        let tx: AlgorandTransaction = serde_json::from_value(serde_json::json!({
            "id": "TXID",
            "confirmed-round": 30_000_000u64,
            "sender": "SENDER",
            "application-id": 842125965u64
        }))
        .unwrap();
        assert_eq!(tx.application_id, Some(842_125_965));
        assert!(tx.logs.is_empty());
    }

    struct Indexer;

    #[async_trait]
    impl AlgorandIndexer for Indexer {
        async fn current_round(&self) -> Result<u64, RpcError> {
            Ok(10)
        }
        async fn transactions(&self, min: u64, max: u64) -> Result<Vec<AlgorandTransaction>, RpcError> {
            Ok((min..=max)
                .map(|r| AlgorandTransaction {
                    id: format!("T{r}"),
                    confirmed_round: r,
                    sender: "S".into(),
                    application_id: (r % 2 == 0).then_some(842_125_965),
                    logs: vec![],
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn keeps_calls_to_watched_application() {
        let repo = AlgorandRepository::new(Indexer);
        let txs = repo
            .fetch(Range::new(1, 4).unwrap(), &EventFilter::address("842125965"), FetchStrategy::Transactions)
            .await
            .unwrap();
        assert_eq!(txs.iter().map(|t| t.confirmed_round).collect::<Vec<_>>(), vec![2, 4]);
    }
}
