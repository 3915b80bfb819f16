//! Sync progress as observed by the store.

use super::StoreError;
use crate::index_db::SyncState;
use serde::Serialize;

/// Amount of work the index database knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Total {
    Known(u64),
    Unknown,
}

impl Total {
    pub fn known(self) -> Option<u64> {
        match self {
            Total::Known(total) => Some(total),
            Total::Unknown => None,
        }
    }
}

impl From<Option<u64>> for Total {
    fn from(total: Option<u64>) -> Self {
        total.map(Total::Known).unwrap_or(Total::Unknown)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    /// No work reported yet.
    Uninitialized,
    Syncing,
    /// No pending known work. Not terminal: a larger total moves back to `Syncing`.
    Complete,
}

/// `{synced, total}` pair. Always satisfies `synced <= total` when the total
/// is known; the fields only change together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncProgress {
    synced: u64,
    total: Total,
}

impl SyncProgress {
    pub fn new(synced: u64, total: Total) -> Result<Self, StoreError> {
        if let Total::Known(total) = total {
            if synced > total {
                return Err(StoreError::InvalidProgress { synced, total });
            }
        }
        Ok(Self { synced, total })
    }

    pub fn synced(&self) -> u64 {
        self.synced
    }

    pub fn total(&self) -> Total {
        self.total
    }

    pub fn is_complete(&self) -> bool {
        self.total == Total::Known(self.synced)
    }

    pub fn phase(&self) -> SyncPhase {
        match self.total {
            Total::Unknown if self.synced == 0 => SyncPhase::Uninitialized,
            Total::Unknown => SyncPhase::Syncing,
            Total::Known(_) if self.is_complete() => SyncPhase::Complete,
            Total::Known(_) => SyncPhase::Syncing,
        }
    }
}

impl Default for SyncProgress {
    fn default() -> Self {
        Self {
            synced: 0,
            total: Total::Unknown,
        }
    }
}

impl TryFrom<SyncState> for SyncProgress {
    type Error = StoreError;

    fn try_from(state: SyncState) -> Result<Self, Self::Error> {
        SyncProgress::new(state.synced, state.total.into())
    }
}
