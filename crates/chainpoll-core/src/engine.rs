//! The polling engine. One instance drives one job.
//!
//! # States
//! ```text
//! Starting ──► Polling ──► Waiting ──► Polling ──► ... ──► Stopped
//! ```
//! - `Starting`: load the persisted cursor.
//! - `Polling`: `has_next()`; if the job is done, emit a final record and
//!   stop. Otherwise fetch → dispatch to all handlers in parallel → persist
//!   the cursor.
//! - `Waiting`: sleep `poll_interval`, racing the stop token.
//!
//! A failed cycle is logged and counted, the cursor is left untouched and the
//! same window is requested again after the next wait. Nothing short of a
//! broken start-up makes [`PollingEngine::run`] return an error.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument, Span};

use crate::config::JobConfig;
use crate::cursor::FamilyCursor;
use crate::error::PollError;
use crate::handler::{Handler, HandlerRegistry};
use crate::source::PollSource;
use crate::stats::{self, StatsSink};
use crate::store::CursorStore;

/// Lifecycle state of a [`PollingEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Starting,
    Polling,
    Waiting,
    /// Terminal.
    Stopped,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Polling => write!(f, "polling"),
            Self::Waiting => write!(f, "waiting"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Why a job's loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The cursor reached the configured `to` bound.
    Completed,
    /// [`StopHandle::stop`] was called.
    Requested,
}

impl StopReason {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Requested => "requested",
        }
    }
}

/// Cloneable handle that stops a running engine from anywhere.
#[derive(Debug, Clone)]
pub struct StopHandle {
    token: CancellationToken,
}

impl StopHandle {
    /// Request a stop. An in-flight wait resolves immediately; an in-flight
    /// cycle finishes (and persists) first.
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Summary of one successful cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
    pub items: usize,
    pub window: String,
    pub caught_up: bool,
}

/// Generic incremental poller for a single job.
pub struct PollingEngine<S: PollSource> {
    config: Arc<JobConfig>,
    source: S,
    handlers: HandlerRegistry<S::Item>,
    store: Arc<dyn CursorStore>,
    stats: Arc<dyn StatsSink>,
    cursor: Option<S::Cursor>,
    stop: CancellationToken,
    state: watch::Sender<EngineState>,
    span: Span,
}

impl<S: PollSource> PollingEngine<S> {
    pub fn new(
        config: impl Into<Arc<JobConfig>>,
        source: S,
        store: Arc<dyn CursorStore>,
        stats: Arc<dyn StatsSink>,
    ) -> Self {
        let config = config.into();
        let span = info_span!("job", id = %config.id(), chain = %config.chain());
        let (state, _) = watch::channel(EngineState::Starting);
        Self {
            config,
            source,
            handlers: HandlerRegistry::new(),
            store,
            stats,
            cursor: None,
            stop: CancellationToken::new(),
            state,
            span,
        }
    }

    /// Register a handler (builder style).
    pub fn with_handler(mut self, handler: Arc<dyn Handler<S::Item>>) -> Self {
        self.handlers.register(handler);
        self
    }

    /// Tie this engine's stop signal to a parent token.
    pub fn with_stop_token(mut self, token: CancellationToken) -> Self {
        self.stop = token;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            token: self.stop.clone(),
        }
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    /// Watch state transitions (e.g. to wait for `Stopped` in tests).
    pub fn subscribe_state(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    /// In-memory cursor: the last position that was persisted successfully.
    pub fn cursor(&self) -> Option<&S::Cursor> {
        self.cursor.as_ref()
    }

    /// Run the job until it completes or is stopped.
    ///
    /// Returns `Err` only if the start-up cursor load fails.
    pub async fn run(&mut self) -> Result<StopReason, PollError> {
        let span = self.span.clone();
        self.run_inner().instrument(span).await
    }

    async fn run_inner(&mut self) -> Result<StopReason, PollError> {
        self.set_state(EngineState::Starting);
        if let Err(e) = self.load_cursor().await {
            warn!(error = %e, "failed to load cursor; job not started");
            self.set_state(EngineState::Stopped);
            return Err(e);
        }
        info!(
            cursor = ?self.cursor,
            from = ?self.config.from(),
            to = ?self.config.to(),
            batch_size = self.config.batch_size(),
            "job started"
        );

        let interval = self.config.poll_interval();
        let reason = loop {
            if self.stop.is_cancelled() {
                break StopReason::Requested;
            }

            self.set_state(EngineState::Polling);
            if !self.source.has_next(self.cursor.as_ref(), &self.config) {
                break StopReason::Completed;
            }

            match self.poll_once().await {
                Ok(outcome) => self.record_success(&outcome),
                Err(e) => self.record_failure(&e),
            }

            self.set_state(EngineState::Waiting);
            tokio::select! {
                _ = self.stop.cancelled() => break StopReason::Requested,
                _ = tokio::time::sleep(interval) => {}
            }
        };

        self.stats.count(
            stats::JOB_STOPPED,
            &[
                ("job", self.config.id()),
                ("chain", self.config.chain().as_str()),
                ("reason", reason.as_str()),
            ],
            1,
        );
        info!(reason = reason.as_str(), cursor = ?self.cursor, "job stopped");
        self.set_state(EngineState::Stopped);
        Ok(reason)
    }

    /// One fetch → dispatch → persist cycle. The in-memory cursor only moves
    /// once the store accepted the new value.
    pub async fn poll_once(&mut self) -> Result<CycleOutcome, PollError> {
        let batch = self
            .source
            .fetch_next(self.cursor.as_ref(), &self.config)
            .await?;
        let caught_up = batch.is_caught_up();

        if !batch.items.is_empty() {
            self.handlers.dispatch(&batch.items).await?;
        }

        if let Some(next) = batch.cursor.or_else(|| self.cursor.clone()) {
            self.store
                .save(self.config.id(), &next.clone().into_cursor())
                .await?;
            self.cursor = Some(next);
        }

        Ok(CycleOutcome {
            items: batch.items.len(),
            window: batch.window,
            caught_up,
        })
    }

    async fn load_cursor(&mut self) -> Result<(), PollError> {
        self.cursor = match self.store.get(self.config.id()).await? {
            Some(stored) => Some(S::Cursor::try_from_cursor(self.config.id(), stored)?),
            None => None,
        };
        Ok(())
    }

    fn record_success(&self, outcome: &CycleOutcome) {
        let job = self.config.id();
        let chain = self.config.chain().as_str();
        debug!(
            window = %outcome.window,
            items = outcome.items,
            caught_up = outcome.caught_up,
            "cycle complete"
        );
        self.stats.count(
            stats::JOB_EXECUTION,
            &[("job", job), ("chain", chain), ("status", "success")],
            1,
        );
        self.stats.count(
            stats::JOB_ITEMS,
            &[("job", job), ("chain", chain)],
            outcome.items as u64,
        );
        if let Some(position) = self.cursor.as_ref().and_then(|c| c.position()) {
            self.stats.gauge(
                stats::JOB_CURSOR_POSITION,
                &[("job", job), ("chain", chain)],
                position as f64,
            );
        }
    }

    fn record_failure(&self, error: &PollError) {
        warn!(error = %error, cursor = ?self.cursor, "cycle failed; will retry the same window");
        self.stats.count(
            stats::JOB_EXECUTION,
            &[
                ("job", self.config.id()),
                ("chain", self.config.chain().as_str()),
                ("status", "error"),
                ("error", error.kind()),
            ],
            1,
        );
    }

    fn set_state(&self, state: EngineState) {
        self.state.send_replace(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::config::{Chain, JobConfig};
    use crate::cursor::HeightCursor;
    use crate::error::HandlerError;
    use crate::source::Batch;
    use crate::stats::MemoryStatsSink;
    use crate::store::MemoryCursorStore;

    /// Emits one item per block, `step` blocks per cycle; fails while
    /// `failures` is non-zero.
    struct Counting {
        step: u64,
        failures: AtomicU32,
        requests: Mutex<Vec<u64>>,
    }

    impl Counting {
        fn new(step: u64) -> Self {
            Self {
                step,
                failures: AtomicU32::new(0),
                requests: Mutex::new(vec![]),
            }
        }
    }

    #[async_trait]
    impl PollSource for Counting {
        type Item = u64;
        type Cursor = HeightCursor;

        async fn fetch_next(
            &self,
            cursor: Option<&HeightCursor>,
            cfg: &JobConfig,
        ) -> Result<Batch<u64, HeightCursor>, PollError> {
            let from = cursor.map(|c| c.next_block()).or(cfg.from()).unwrap_or(0);
            self.requests.lock().unwrap().push(from);
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(PollError::Rpc("node unavailable".into()));
            }
            let to = match cfg.to() {
                Some(end) => (from + self.step - 1).min(end),
                None => from + self.step - 1,
            };
            Ok(Batch {
                items: (from..=to).collect(),
                cursor: Some(HeightCursor::new(to)),
                window: format!("[{from}, {to}]"),
            })
        }
    }

    struct Rejecting;

    #[async_trait]
    impl Handler<u64> for Rejecting {
        async fn handle(&self, _items: &[u64]) -> Result<(), HandlerError> {
            Err(HandlerError::new("downstream rejected"))
        }
        fn name(&self) -> &str {
            "rejecting"
        }
    }

    fn job(to: Option<u64>) -> JobConfig {
        let b = JobConfig::builder("test-job", Chain::Ethereum)
            .from(1)
            .poll_interval_ms(1_000);
        match to {
            Some(to) => b.to(to).build().unwrap(),
            None => b.build().unwrap(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn runs_to_configured_end_and_persists() {
        let store = Arc::new(MemoryCursorStore::new());
        let sink = Arc::new(MemoryStatsSink::new());
        let mut engine = PollingEngine::new(job(Some(25)), Counting::new(10), store.clone(), sink.clone());

        let reason = engine.run().await.unwrap();
        assert_eq!(reason, StopReason::Completed);
        assert_eq!(engine.state(), EngineState::Stopped);
        assert_eq!(engine.cursor(), Some(&HeightCursor::new(25)));
        assert_eq!(store.peek("test-job"), Some(HeightCursor::new(25).into()));
        assert_eq!(store.save_count(), 3);

        let labels = [("job", "test-job"), ("chain", "ethereum")];
        assert_eq!(sink.counter(stats::JOB_ITEMS, &labels), 25);
        assert_eq!(sink.gauge_value(stats::JOB_CURSOR_POSITION, &labels), Some(25.0));
        assert_eq!(
            sink.counter(
                stats::JOB_STOPPED,
                &[("job", "test-job"), ("chain", "ethereum"), ("reason", "completed")]
            ),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn resumes_from_persisted_cursor() {
        let store = Arc::new(MemoryCursorStore::new().with_cursor("test-job", HeightCursor::new(20)));
        let source = Counting::new(10);
        let mut engine = PollingEngine::new(job(Some(25)), source, store, Arc::new(MemoryStatsSink::new()));
        engine.run().await.unwrap();
        assert_eq!(*engine.source.requests.lock().unwrap(), vec![21]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_cycle_retries_the_same_window() {
        let store = Arc::new(MemoryCursorStore::new());
        let sink = Arc::new(MemoryStatsSink::new());
        let source = Counting::new(10);
        source.failures.store(2, Ordering::SeqCst);
        let mut engine = PollingEngine::new(job(Some(10)), source, store.clone(), sink.clone());

        engine.run().await.unwrap();
        assert_eq!(*engine.source.requests.lock().unwrap(), vec![1, 1, 1]);
        assert_eq!(store.save_count(), 1);
        assert_eq!(
            sink.counter(
                stats::JOB_EXECUTION,
                &[("job", "test-job"), ("chain", "ethereum"), ("status", "error"), ("error", "rpc")]
            ),
            2
        );
    }

    #[tokio::test(start_paused = true)]
    async fn handler_failure_never_saves() {
        let store = Arc::new(MemoryCursorStore::new());
        let mut engine = PollingEngine::new(job(None), Counting::new(5), store.clone(), Arc::new(MemoryStatsSink::new()))
            .with_handler(Arc::new(Rejecting));

        for _ in 0..3 {
            assert!(engine.poll_once().await.is_err());
        }
        assert_eq!(store.save_count(), 0);
        assert!(engine.cursor().is_none());
        assert_eq!(*engine.source.requests.lock().unwrap(), vec![1, 1, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_interrupts_the_wait() {
        let store = Arc::new(MemoryCursorStore::new());
        let config = JobConfig::builder("slow", Chain::Ethereum)
            .from(1)
            .poll_interval_ms(3_600_000)
            .build()
            .unwrap();
        let mut engine = PollingEngine::new(config, Counting::new(1), store, Arc::new(MemoryStatsSink::new()));
        let stop = engine.stop_handle();
        let mut state = engine.subscribe_state();

        let task = tokio::spawn(async move { engine.run().await });
        state.wait_for(|s| *s == EngineState::Waiting).await.unwrap();
        stop.stop();

        let reason = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("engine did not stop promptly")
            .unwrap()
            .unwrap();
        assert_eq!(reason, StopReason::Requested);
    }

    #[tokio::test]
    async fn mismatched_cursor_fails_start() {
        let store = Arc::new(
            MemoryCursorStore::new().with_cursor("test-job", crate::cursor::SlotCursor::new(3)),
        );
        let mut engine = PollingEngine::new(job(None), Counting::new(1), store, Arc::new(MemoryStatsSink::new()));
        let err = engine.run().await.unwrap_err();
        assert!(matches!(err, PollError::CursorMismatch { .. }));
        assert_eq!(engine.state(), EngineState::Stopped);
    }
}
