//! Sui: transactions paged by digest, positioned by checkpoint.
//!
//! The transaction query pages *after a digest*, so the cursor keeps the last
//! handled transaction's digest together with its checkpoint. When the cursor
//! is missing or behind the configured start, the paging digest is
//! re-derived from the last transaction of the checkpoint just before the
//! start point. A bounded job finishes on a cursor pinned to the last
//! transaction of checkpoint `to`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use chainpoll_core::config::JobConfig;
use chainpoll_core::cursor::CheckpointCursor;
use chainpoll_core::error::PollError;
use chainpoll_core::source::{Batch, PollSource, RangeAdvancer};
use chainpoll_core::types::{Advance, Commitment, EventFilter};
use chainpoll_rpc::{ResilientClient, RpcError};

use crate::client::rpc_err;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiTransaction {
    pub digest: String,
    pub checkpoint: u64,
    #[serde(rename = "timestampMs", default)]
    pub timestamp_ms: Option<u64>,
    #[serde(default)]
    pub events: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiCheckpoint {
    pub sequence_number: u64,
    /// Digests of the checkpoint's transactions, in execution order.
    pub transactions: Vec<String>,
}

/// Where the next page starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuiWindow {
    /// Page after the persisted digest.
    After { checkpoint: u64, digest: String, limit: u64 },
    /// Look up checkpoint `checkpoint`'s last transaction, then page after it.
    Rederive { checkpoint: u64, limit: u64 },
    /// Start from the first transaction ever.
    Genesis { limit: u64 },
}

impl std::fmt::Display for SuiWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::After { checkpoint, digest, limit } => write!(f, "after {digest}@{checkpoint} (+{limit})"),
            Self::Rederive { checkpoint, limit } => write!(f, "after checkpoint {checkpoint} (+{limit})"),
            Self::Genesis { limit } => write!(f, "genesis (+{limit})"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CheckpointAdvancer;

impl RangeAdvancer for CheckpointAdvancer {
    type Cursor = CheckpointCursor;
    type Window = SuiWindow;

    fn next_range(&self, cursor: Option<&CheckpointCursor>, head: u64, cfg: &JobConfig) -> Advance<SuiWindow> {
        let limit = cfg.batch_size();
        match cursor {
            // A cursor on the checkpoint right before `from` is a re-derived start.
            Some(c) if cfg.from().map_or(true, |from| c.checkpoint.saturating_add(1) >= from) => {
                if c.checkpoint > head {
                    return Advance::CaughtUp { head };
                }
                Advance::Fetch(SuiWindow::After {
                    checkpoint: c.checkpoint,
                    digest: c.digest.clone(),
                    limit,
                })
            }
            _ => {
                let start = cfg.from().unwrap_or(head);
                if start > head {
                    return Advance::CaughtUp { head };
                }
                match start.checked_sub(1) {
                    Some(previous) => Advance::Fetch(SuiWindow::Rederive {
                        checkpoint: previous,
                        limit,
                    }),
                    None => Advance::Fetch(SuiWindow::Genesis { limit }),
                }
            }
        }
    }
}

/// Sui RPC reads.
#[async_trait]
pub trait SuiRepository: Send + Sync {
    async fn latest_checkpoint(&self, commitment: Commitment) -> Result<u64, RpcError>;

    async fn checkpoint(&self, sequence_number: u64) -> Result<SuiCheckpoint, RpcError>;

    /// `suix_queryTransactionBlocks` in ascending order, after `cursor` (the
    /// first page when `None`), selected by `filter`.
    async fn query_transactions(
        &self,
        cursor: Option<&str>,
        limit: u64,
        filter: &EventFilter,
    ) -> Result<Vec<SuiTransaction>, RpcError>;
}

pub struct SuiSource<R> {
    repo: R,
    client: ResilientClient,
    advancer: CheckpointAdvancer,
}

impl<R: SuiRepository> SuiSource<R> {
    pub fn new(repo: R, client: ResilientClient) -> Self {
        Self {
            repo,
            client,
            advancer: CheckpointAdvancer,
        }
    }

    /// Paging cursor and its checkpoint for the page that follows `window`'s
    /// starting point.
    async fn paging_start(&self, window: &SuiWindow) -> Result<Option<CheckpointCursor>, PollError> {
        match window {
            SuiWindow::After { checkpoint, digest, .. } => Ok(Some(CheckpointCursor::new(*checkpoint, digest.clone()))),
            SuiWindow::Genesis { .. } => Ok(None),
            SuiWindow::Rederive { checkpoint, .. } => {
                let start = self.checkpoint_end(*checkpoint).await?;
                tracing::info!(checkpoint, digest = %start.digest, "re-derived sui paging cursor");
                Ok(Some(start))
            }
        }
    }

    /// Cursor on the last transaction of checkpoint `sequence_number`.
    async fn checkpoint_end(&self, sequence_number: u64) -> Result<CheckpointCursor, PollError> {
        let cp = self
            .client
            .execute(|| self.repo.checkpoint(sequence_number))
            .await
            .map_err(rpc_err)?;
        let digest = cp.transactions.last().ok_or_else(|| {
            PollError::Rpc(format!("checkpoint {sequence_number} has no transactions"))
        })?;
        Ok(CheckpointCursor::new(cp.sequence_number, digest.clone()))
    }
}

fn window_limit(window: &SuiWindow) -> u64 {
    match window {
        SuiWindow::After { limit, .. } | SuiWindow::Rederive { limit, .. } | SuiWindow::Genesis { limit } => *limit,
    }
}

#[async_trait]
impl<R: SuiRepository> PollSource for SuiSource<R> {
    type Item = SuiTransaction;
    type Cursor = CheckpointCursor;

    async fn fetch_next(
        &self,
        cursor: Option<&CheckpointCursor>,
        cfg: &JobConfig,
    ) -> Result<Batch<SuiTransaction, CheckpointCursor>, PollError> {
        let commitment = cfg.commitment();
        let head = self
            .client
            .execute(|| self.repo.latest_checkpoint(commitment))
            .await
            .map_err(rpc_err)?;

        let window = match self.advancer.next_range(cursor, head, cfg) {
            Advance::Fetch(window) => window,
            Advance::CaughtUp { head } => return Ok(Batch::caught_up(head)),
        };

        let start = self.paging_start(&window).await?;
        let after = start.as_ref().map(|c| c.digest.as_str());
        let limit = window_limit(&window);
        let filter = cfg.filter();
        let mut txs = self
            .client
            .execute(|| self.repo.query_transactions(after, limit, filter))
            .await
            .map_err(rpc_err)?;

        // The range is exhausted once the page crosses `to`, or comes back
        // short while the head is already at or past `to`.
        let mut end = None;
        if let Some(to) = cfg.to() {
            let fetched = txs.len() as u64;
            txs.retain(|tx| tx.checkpoint <= to);
            let crossed = (txs.len() as u64) < fetched;
            let drained = fetched < limit && head >= to;
            if crossed || drained {
                end = Some(to);
            }
        }

        let next = match (end, txs.last()) {
            (Some(to), _) => Some(self.checkpoint_end(to).await?),
            (None, Some(tx)) => Some(CheckpointCursor::new(tx.checkpoint, tx.digest.clone())),
            // A re-derived start is worth keeping even if the page was empty.
            (None, None) if matches!(window, SuiWindow::Rederive { .. }) => start,
            (None, None) => None,
        };

        tracing::debug!(%window, head, items = txs.len(), "fetched sui page");
        Ok(Batch {
            items: txs,
            cursor: next,
            window: window.to_string(),
        })
    }
}
