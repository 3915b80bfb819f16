//! Inode Index Server Library
//!
//! Tracks the progress of the background sync feeding a local inode index and
//! serves paginated search/latest queries over it.

pub mod config;
pub mod index_db;
pub mod server;
pub mod store;

// Re-export commonly used types for convenience
pub use index_db::{IndexDatabase, Inode, SqliteIndex, SqliteIndexDatabase};
pub use server::{run_server, RequestsLoggingLevel};
pub use store::{QueryRequest, ResultPage, StoreError, SyncProgress, SyncedQueryStore};
