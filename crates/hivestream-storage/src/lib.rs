//! hivestream-storage — persistence adapters for hivestream.
//!
//! Backends:
//! - [`file`] — JSON state file plus an append-only event log
//! - [`sqlite`] — SQLite via `sqlx` (feature `sqlite`)
//!
//! An in-memory adapter for tests lives in `hivestream-core`
//! ([`hivestream_core::MemoryAdapter`]).

#[cfg(feature = "file")]
pub mod file;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "file")]
pub use file::FileAdapter;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteAdapter;
