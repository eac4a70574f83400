//! Cursor persistence.
//!
//! The store holds one [`Cursor`] per job id with last-write-wins semantics.
//! Correctness comes from the engine only saving after a cycle fully
//! succeeded, not from the store itself.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::cursor::Cursor;
use crate::error::PollError;

/// Trait for storing and loading job cursors.
///
/// Implementations: [`MemoryCursorStore`] here, plus the file and SQLite
/// stores in `chainpoll-storage`.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Load the cursor for `job_id`, if one was ever saved.
    async fn get(&self, job_id: &str) -> Result<Option<Cursor>, PollError>;

    /// Save (upsert) the cursor for `job_id`.
    async fn save(&self, job_id: &str, cursor: &Cursor) -> Result<(), PollError>;

    /// Forget the cursor for `job_id` (operator reset).
    async fn delete(&self, job_id: &str) -> Result<(), PollError>;
}

// ─── In-memory store (for testing) ────────────────────────────────────────────

/// In-memory cursor store for tests and ephemeral jobs.
#[derive(Default)]
pub struct MemoryCursorStore {
    data: Mutex<HashMap<String, Cursor>>,
    saves: AtomicU64,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a cursor, as if a previous run had saved it.
    pub fn with_cursor(self, job_id: impl Into<String>, cursor: impl Into<Cursor>) -> Self {
        self.data
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(job_id.into(), cursor.into());
        self
    }

    /// Number of successful `save` calls so far.
    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::Relaxed)
    }

    /// Synchronous read, for assertions.
    pub fn peek(&self, job_id: &str) -> Option<Cursor> {
        self.data.lock().unwrap_or_else(|e| e.into_inner()).get(job_id).cloned()
    }
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
    async fn get(&self, job_id: &str) -> Result<Option<Cursor>, PollError> {
        Ok(self.peek(job_id))
    }

    async fn save(&self, job_id: &str, cursor: &Cursor) -> Result<(), PollError> {
        self.data
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(job_id.to_string(), cursor.clone());
        self.saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn delete(&self, job_id: &str) -> Result<(), PollError> {
        self.data.lock().unwrap_or_else(|e| e.into_inner()).remove(job_id);
        Ok(())
    }
}
