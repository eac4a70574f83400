//! chainpoll-core — the chain-agnostic half of the incremental polling engine.
//!
//! # Architecture
//!
//! ```text
//! JobConfig → PollingEngine<S: PollSource>
//!                  ├── PollSource        (head → RangeAdvancer → fetch, per chain family)
//!                  ├── HandlerRegistry   (user handlers, run in parallel)
//!                  ├── CursorStore       (durable cursor per job)
//!                  └── StatsSink         (counters and gauges)
//! JobSet → many engines under one stop token
//! ```

pub mod config;
pub mod cursor;
pub mod engine;
pub mod error;
pub mod handler;
pub mod jobs;
pub mod source;
pub mod stats;
pub mod store;
pub mod types;

pub use config::{Chain, ChainFamily, FetchStrategy, JobConfig, JobsFile, RpcSettings, Tunables};
pub use cursor::{CheckpointCursor, Cursor, FamilyCursor, HeightCursor, SequenceCursor, SlotCursor};
pub use engine::{CycleOutcome, EngineState, PollingEngine, StopHandle, StopReason};
pub use error::{ConfigError, HandlerError, PollError};
pub use handler::{FnHandler, Handler, HandlerRegistry};
pub use jobs::{JobExit, JobSet};
pub use source::{Batch, PollSource, RangeAdvancer};
pub use stats::{MemoryStatsSink, StatsSink, TracingStatsSink};
pub use store::{CursorStore, MemoryCursorStore};
pub use types::{Advance, Commitment, EventFilter, Range, SequenceWindow};
