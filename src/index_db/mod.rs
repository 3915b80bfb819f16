//! Index database contract.
//!
//! The index database owns the inode records and runs its own ingest process.
//! The store only reads from it: a sync state snapshot, a feed of sync
//! notices, paginated queries and a purge.

mod models;
mod schema;
mod sqlite_index;

pub use models::{Inode, InodeKind};
pub use sqlite_index::{
    SqliteIndex, SqliteIndexDatabase, SqliteIndexWriter, DEFAULT_SYNC_POLL_INTERVAL,
};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Raw sync state as reported by the index database.
///
/// `total` is `None` while the amount of pending work is not known yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncState {
    pub synced: u64,
    pub total: Option<u64>,
}

impl SyncState {
    pub fn new(synced: u64, total: Option<u64>) -> Self {
        Self { synced, total }
    }
}

/// Result of a paginated query: one window of records plus the total number
/// of matches.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutcome<R> {
    pub data: Vec<R>,
    pub total: u64,
}

/// One delivery on the sync feed.
///
/// `Ok(None)` means the database reported success without a state, which
/// breaks its contract.
pub type SyncNotice = Result<Option<SyncState>>;

/// Long-lived stream of sync notices. Dropping the receiver cancels the
/// subscription.
pub type SyncFeed = mpsc::Receiver<SyncNotice>;

#[async_trait]
pub trait IndexDatabase: Send + Sync + 'static {
    /// Record type served by the database. Opaque to the store.
    type Record: Clone + Send + Sync + 'static;

    /// Identifier this handle is scoped to (e.g. a contract address).
    fn scope(&self) -> &str;

    /// Current sync state snapshot.
    async fn get_sync_state(&self) -> Result<SyncState>;

    /// Subscribe to ongoing sync notices.
    ///
    /// Must be called from within a tokio runtime.
    fn start_sync(&self) -> SyncFeed;

    /// Records matching `query`, skipping `offset` and returning at most `limit`.
    async fn search(
        &self,
        query: &str,
        limit: usize,
        offset: usize,
    ) -> Result<QueryOutcome<Self::Record>>;

    /// Most recently updated records, skipping `offset` and returning at most `limit`.
    async fn latest(&self, limit: usize, offset: usize) -> Result<QueryOutcome<Self::Record>>;

    /// Purge every record and the sync state of this scope.
    async fn clear_data(&self) -> Result<()>;
}
