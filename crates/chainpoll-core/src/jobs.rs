//! Running several jobs side by side.
//!
//! Each job gets its own engine and task; jobs share only the store and the
//! stats sink. One job failing to start never takes the others down.

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::engine::{PollingEngine, StopReason};
use crate::error::PollError;
use crate::source::PollSource;

/// Result of one finished job.
#[derive(Debug)]
pub struct JobExit {
    pub job_id: String,
    pub result: Result<StopReason, PollError>,
}

/// A set of concurrently running [`PollingEngine`]s under one stop token.
pub struct JobSet {
    tasks: JoinSet<JobExit>,
    stop: CancellationToken,
}

impl JobSet {
    pub fn new() -> Self {
        Self {
            tasks: JoinSet::new(),
            stop: CancellationToken::new(),
        }
    }

    /// Start `engine` on its own task. The engine stops with the set.
    pub fn spawn<S>(&mut self, engine: PollingEngine<S>)
    where
        S: PollSource + 'static,
    {
        let mut engine = engine.with_stop_token(self.stop.child_token());
        let job_id = engine.config().id().to_string();
        info!(job = %job_id, "spawning job");
        self.tasks.spawn(async move {
            let result = engine.run().await;
            JobExit { job_id, result }
        });
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Ask every job to stop after its current cycle.
    pub fn stop_all(&self) {
        self.stop.cancel();
    }

    /// Token that stops every job when cancelled (e.g. from a signal handler).
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Wait for every job to finish.
    pub async fn join_all(mut self) -> Vec<JobExit> {
        let mut exits = Vec::with_capacity(self.tasks.len());
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(exit) => {
                    if let Err(e) = &exit.result {
                        error!(job = %exit.job_id, error = %e, "job ended with error");
                    }
                    exits.push(exit);
                }
                Err(e) => {
                    error!(error = %e, "job task panicked or was aborted");
                    exits.push(JobExit {
                        job_id: String::from("<unknown>"),
                        result: Err(PollError::Other(e.to_string())),
                    });
                }
            }
        }
        exits
    }
}

impl Default for JobSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::config::{Chain, JobConfig};
    use crate::cursor::{HeightCursor, SlotCursor};
    use crate::source::Batch;
    use crate::stats::MemoryStatsSink;
    use crate::store::MemoryCursorStore;

    /// Never produces anything.
    struct Idle;

    #[async_trait]
    impl PollSource for Idle {
        type Item = ();
        type Cursor = HeightCursor;

        async fn fetch_next(
            &self,
            _cursor: Option<&HeightCursor>,
            _cfg: &JobConfig,
        ) -> Result<Batch<(), HeightCursor>, PollError> {
            Ok(Batch::caught_up(0))
        }
    }

    fn engine(id: &str, store: Arc<MemoryCursorStore>) -> PollingEngine<Idle> {
        let cfg = JobConfig::builder(id, Chain::Ethereum).build().unwrap();
        PollingEngine::new(cfg, Idle, store, Arc::new(MemoryStatsSink::new()))
    }

    #[tokio::test(start_paused = true)]
    async fn stop_all_ends_every_job() {
        let store = Arc::new(MemoryCursorStore::new());
        let mut set = JobSet::new();
        set.spawn(engine("a", store.clone()));
        set.spawn(engine("b", store.clone()));
        assert_eq!(set.len(), 2);

        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        set.stop_all();

        let mut exits = set.join_all().await;
        exits.sort_by(|x, y| x.job_id.cmp(&y.job_id));
        assert_eq!(exits.len(), 2);
        assert_eq!(exits[0].job_id, "a");
        assert!(matches!(exits[1].result, Ok(StopReason::Requested)));
    }

    #[tokio::test(start_paused = true)]
    async fn broken_job_does_not_affect_others() {
        let store = Arc::new(MemoryCursorStore::new().with_cursor("broken", SlotCursor::new(1)));
        let mut set = JobSet::new();
        set.spawn(engine("broken", store.clone()));
        set.spawn(engine("healthy", store.clone()));

        tokio::time::sleep(std::time::Duration::from_secs(10)).await;
        set.stop_all();

        let exits = set.join_all().await;
        let broken = exits.iter().find(|e| e.job_id == "broken").unwrap();
        let healthy = exits.iter().find(|e| e.job_id == "healthy").unwrap();
        assert!(matches!(broken.result, Err(PollError::CursorMismatch { .. })));
        assert!(matches!(healthy.result, Ok(StopReason::Requested)));
    }
}
