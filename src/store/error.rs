use thiserror::Error;

/// Errors surfaced by [`super::SyncedQueryStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The index database rejected a one-shot call.
    #[error("Index database error: {0:#}")]
    Collaborator(#[from] anyhow::Error),

    /// The index database reported a sync state that breaks `synced <= total`.
    #[error("Inconsistent sync state: synced {synced} exceeds total {total}")]
    InvalidProgress { synced: u64, total: u64 },

    /// The index database broke its interface contract.
    #[error("Index database contract violation: {0}")]
    ContractViolation(String),

    #[error("Page {page_index} is out of range for page size {page_size}")]
    PageOutOfRange { page_index: usize, page_size: usize },

    #[error("Store is already initialized")]
    AlreadyInitialized,

    #[error("Sync subscription task failed: {0}")]
    SubscriptionFailed(String),
}
