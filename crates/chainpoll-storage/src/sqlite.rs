//! SQLite cursor store.
//!
//! One row per job in a `cursors` table; the cursor itself is kept as JSON
//! next to its kind so it can be inspected with plain SQL.
//!
//! # Usage
//! ```rust,no_run
//! use chainpoll_storage::sqlite::SqliteCursorStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteCursorStore::open("./cursors.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteCursorStore::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use chainpoll_core::cursor::Cursor;
use chainpoll_core::error::PollError;
use chainpoll_core::store::CursorStore;

/// SQLite-backed cursor store.
pub struct SqliteCursorStore {
    pool: SqlitePool,
}

impl SqliteCursorStore {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./cursors.db"`) or a full
    /// SQLite URL (`"sqlite:./cursors.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, PollError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url).await.map_err(storage_err)?;
        let store = Self { pool };
        store.init_schema(true).await?;
        Ok(store)
    }

    /// Open an in-memory database. Data is lost when the store is dropped.
    pub async fn in_memory() -> Result<Self, PollError> {
        // Each pooled connection would get its own in-memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(storage_err)?;
        let store = Self { pool };
        store.init_schema(false).await?;
        Ok(store)
    }

    async fn init_schema(&self, wal: bool) -> Result<(), PollError> {
        if wal {
            sqlx::query("PRAGMA journal_mode=WAL;")
                .execute(&self.pool)
                .await
                .map_err(storage_err)?;
        }

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS cursors (
                job_id      TEXT    NOT NULL PRIMARY KEY,
                kind        TEXT    NOT NULL,
                position    INTEGER,
                cursor_json TEXT    NOT NULL,
                updated_at  INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }

    /// Number of jobs with a stored cursor.
    pub async fn len(&self) -> Result<u64, PollError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM cursors")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(row.get::<i64, _>("cnt") as u64)
    }

    pub async fn is_empty(&self) -> Result<bool, PollError> {
        Ok(self.len().await? == 0)
    }
}

// ─── CursorStore impl ────────────────────────────────────────────────────────

#[async_trait]
impl CursorStore for SqliteCursorStore {
    async fn get(&self, job_id: &str) -> Result<Option<Cursor>, PollError> {
        let row = sqlx::query("SELECT cursor_json FROM cursors WHERE job_id = ?")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;

        match row {
            Some(r) => {
                let json: String = r.get("cursor_json");
                let cursor = serde_json::from_str(&json)
                    .map_err(|e| PollError::Storage(format!("cursor for {job_id}: {e}")))?;
                Ok(Some(cursor))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, job_id: &str, cursor: &Cursor) -> Result<(), PollError> {
        let json = serde_json::to_string(cursor).map_err(|e| PollError::Storage(e.to_string()))?;
        sqlx::query(
            "INSERT OR REPLACE INTO cursors
             (job_id, kind, position, cursor_json, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(job_id)
        .bind(cursor.kind())
        .bind(cursor.position().and_then(|p| i64::try_from(p).ok()))
        .bind(json)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        debug!(job = job_id, kind = cursor.kind(), position = ?cursor.position(), "cursor saved");
        Ok(())
    }

    async fn delete(&self, job_id: &str) -> Result<(), PollError> {
        sqlx::query("DELETE FROM cursors WHERE job_id = ?")
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }
}

fn storage_err(e: sqlx::Error) -> PollError {
    PollError::Storage(e.to_string())
}

// ─── Tests ───────────────────────────────────────────────────────────────────
