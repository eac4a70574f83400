//! chainpoll-storage — durable [`CursorStore`] backends.
//!
//! - [`file::FileCursorStore`]: one JSON file per job (default)
//! - [`sqlite::SqliteCursorStore`]: one row per job (feature `sqlite`)
//!
//! The in-memory store used by tests lives in `chainpoll-core`.
//!
//! [`CursorStore`]: chainpoll_core::store::CursorStore

#[cfg(feature = "file")]
pub mod file;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "file")]
pub use file::FileCursorStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteCursorStore;

pub use chainpoll_core::store::MemoryCursorStore;
