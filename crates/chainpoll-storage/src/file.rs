//! JSON-file cursor store: one `<job-id>.json` per job under a directory.
//!
//! Writes go to a temp file that is then renamed over the target, so a crash
//! mid-write leaves either the old or the new cursor, never a torn file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use chainpoll_core::cursor::Cursor;
use chainpoll_core::error::PollError;
use chainpoll_core::store::CursorStore;

/// On-disk record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CursorRecord {
    pub job_id: String,
    pub cursor: Cursor,
    pub updated_at: DateTime<Utc>,
}

/// Directory-backed [`CursorStore`].
#[derive(Debug, Clone)]
pub struct FileCursorStore {
    dir: PathBuf,
}

impl FileCursorStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, PollError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| storage_err(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the cursor file for `job_id`.
    pub fn path_for(&self, job_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(job_id)))
    }

    /// Full record including the write timestamp.
    pub async fn record(&self, job_id: &str) -> Result<Option<CursorRecord>, PollError> {
        let path = self.path_for(job_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(storage_err(&path, e)),
        };
        let record: CursorRecord = serde_json::from_slice(&bytes)
            .map_err(|e| PollError::Storage(format!("{}: {e}", path.display())))?;
        Ok(Some(record))
    }
}

#[async_trait]
impl CursorStore for FileCursorStore {
    async fn get(&self, job_id: &str) -> Result<Option<Cursor>, PollError> {
        Ok(self.record(job_id).await?.map(|r| r.cursor))
    }

    async fn save(&self, job_id: &str, cursor: &Cursor) -> Result<(), PollError> {
        let record = CursorRecord {
            job_id: job_id.to_string(),
            cursor: cursor.clone(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&record)
            .map_err(|e| PollError::Storage(e.to_string()))?;

        let path = self.path_for(job_id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| storage_err(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| storage_err(&path, e))?;

        debug!(job = job_id, kind = cursor.kind(), position = ?cursor.position(), "cursor saved");
        Ok(())
    }

    async fn delete(&self, job_id: &str) -> Result<(), PollError> {
        let path = self.path_for(job_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_err(&path, e)),
        }
    }
}

/// Job ids are free text. Every byte outside `[a-z0-9-]` is percent-encoded,
/// so distinct ids never share a file, even on case-insensitive file systems.
fn file_stem(job_id: &str) -> String {
    let mut stem = String::with_capacity(job_id.len());
    for byte in job_id.bytes() {
        if byte.is_ascii_lowercase() || byte.is_ascii_digit() || byte == b'-' {
            stem.push(char::from(byte));
        } else {
            stem.push_str(&format!("%{byte:02X}"));
        }
    }
    stem
}

fn storage_err(path: &Path, e: std::io::Error) -> PollError {
    PollError::Storage(format!("{}: {e}", path.display()))
}
