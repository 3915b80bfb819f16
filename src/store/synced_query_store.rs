//! Store that surfaces index sync progress and paginated query results.
//!
//! Both pieces of state live in `watch` channels: every change replaces the
//! whole value at once and wakes the subscribers, so nobody can observe a
//! half-updated `{synced, total}` pair or page.

use super::page::{PageState, PageWindow, QueryMode, QueryRequest, ResultPage};
use super::progress::SyncProgress;
use super::StoreError;
use crate::index_db::{IndexDatabase, SyncFeed, SyncNotice};
use anyhow::Context;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub struct SyncedQueryStore<D: IndexDatabase> {
    db: Arc<D>,
    page_size: NonZeroUsize,
    progress: Arc<watch::Sender<SyncProgress>>,
    page: watch::Sender<PageState<D::Record>>,
    /// Sequence number handed to the last dispatched query or completed clear.
    last_seq: AtomicU64,
    initialized: AtomicBool,
}

impl<D: IndexDatabase> SyncedQueryStore<D> {
    /// Create a store over a database handle already bound to its scope.
    pub fn new(db: D, page_size: NonZeroUsize) -> Self {
        Self {
            db: Arc::new(db),
            page_size,
            progress: Arc::new(watch::Sender::new(SyncProgress::default())),
            page: watch::Sender::new(PageState::default()),
            last_seq: AtomicU64::new(0),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn scope(&self) -> &str {
        self.db.scope()
    }

    pub fn page_size(&self) -> NonZeroUsize {
        self.page_size
    }

    pub fn database(&self) -> &D {
        &self.db
    }

    pub fn progress(&self) -> SyncProgress {
        *self.progress.borrow()
    }

    pub fn page(&self) -> ResultPage<D::Record> {
        self.page.borrow().page.clone()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<SyncProgress> {
        self.progress.subscribe()
    }

    pub fn subscribe_page(&self) -> watch::Receiver<PageState<D::Record>> {
        self.page.subscribe()
    }

    /// Fetch the current sync state, then subscribe to sync notices for the
    /// rest of the store's life.
    ///
    /// Errors of the initial fetch are returned and leave the store
    /// uninitialized, so the call can be retried.
    pub async fn initialize(&self) -> Result<SyncSubscription, StoreError> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Err(StoreError::AlreadyInitialized);
        }

        let initial = match self.fetch_progress().await {
            Ok(progress) => progress,
            Err(e) => {
                self.initialized.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };
        self.progress.send_replace(initial);
        info!(
            "Scope {} sync progress: {}/{:?}",
            self.scope(),
            initial.synced(),
            initial.total().known()
        );

        let feed = self.db.start_sync();
        let progress = self.progress.clone();
        let scope = self.scope().to_string();
        let handle = tokio::spawn(async move { pump_sync_feed(feed, progress, scope).await });

        Ok(SyncSubscription { handle })
    }

    async fn fetch_progress(&self) -> Result<SyncProgress, StoreError> {
        let state = self.db.get_sync_state().await?;
        SyncProgress::try_from(state)
    }

    /// Merge one sync notice into the progress state.
    ///
    /// Failed notices and inconsistent states are logged and dropped. Only a
    /// success without a state is an error.
    pub fn apply_sync_notice(&self, notice: SyncNotice) -> Result<(), StoreError> {
        merge_sync_notice(&self.progress, notice, self.scope())
    }

    /// Run one query and publish its page.
    ///
    /// The page reaches observers unless a query dispatched later, or a
    /// clear that completed later, has already published its own result.
    /// Collaborator errors are returned and keep the previous page.
    pub async fn query(&self, request: QueryRequest) -> Result<ResultPage<D::Record>, StoreError> {
        let window = PageWindow::for_page(self.page_size, request.page_index)?;
        let seq = self.next_seq();

        let outcome = match &request.mode {
            QueryMode::Search { query } => {
                debug!(
                    "Searching '{}' in scope {} (limit={}, offset={})",
                    query,
                    self.scope(),
                    window.limit,
                    window.offset
                );
                self.db.search(query, window.limit, window.offset).await?
            }
            QueryMode::Latest => {
                debug!(
                    "Fetching latest in scope {} (limit={}, offset={})",
                    self.scope(),
                    window.limit,
                    window.offset
                );
                self.db.latest(window.limit, window.offset).await?
            }
        };

        let page = ResultPage::from_outcome(outcome, self.page_size);
        self.publish_page(seq, page.clone());
        Ok(page)
    }

    /// Purge the scope's data, then reset the page. Sync progress is kept.
    pub async fn clear(&self) -> Result<(), StoreError> {
        self.db.clear_data().await?;
        // Numbered only once the purge is done: every query dispatched before
        // this point may have read purged rows.
        let seq = self.next_seq();
        self.publish_page(seq, ResultPage::empty());
        info!("Cleared index data of scope {}", self.scope());
        Ok(())
    }

    fn next_seq(&self) -> u64 {
        self.last_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Replace the page unless a newer request already published one.
    fn publish_page(&self, seq: u64, page: ResultPage<D::Record>) -> bool {
        self.page.send_if_modified(|current| {
            if seq < current.seq {
                debug!(
                    "Discarding stale page (seq {} < {}) for scope {}",
                    seq,
                    current.seq,
                    self.db.scope()
                );
                return false;
            }
            *current = PageState { page, seq };
            true
        })
    }
}

fn merge_sync_notice(
    progress: &watch::Sender<SyncProgress>,
    notice: SyncNotice,
    scope: &str,
) -> Result<(), StoreError> {
    match notice {
        Err(e) => {
            warn!("Sync progress update failed for scope {}: {:#}", scope, e);
            Ok(())
        }
        Ok(None) => Err(StoreError::ContractViolation(
            "sync notice reported success without a state".to_string(),
        )),
        Ok(Some(state)) => {
            match SyncProgress::try_from(state) {
                Ok(next) => {
                    progress.send_replace(next);
                }
                Err(e) => warn!("Ignoring sync state for scope {}: {}", scope, e),
            }
            Ok(())
        }
    }
}

async fn pump_sync_feed(
    mut feed: SyncFeed,
    progress: Arc<watch::Sender<SyncProgress>>,
    scope: String,
) -> Result<(), StoreError> {
    while let Some(notice) = feed.recv().await {
        if let Err(e) = merge_sync_notice(&progress, notice, &scope) {
            error!("Sync subscription for scope {} stopped: {}", scope, e);
            return Err(e);
        }
    }
    debug!("Sync feed for scope {} closed", scope);
    Ok(())
}

/// Handle of the background task applying sync notices.
///
/// Dropping it leaves the subscription running.
pub struct SyncSubscription {
    handle: JoinHandle<Result<(), StoreError>>,
}

impl SyncSubscription {
    /// Stop applying sync notices. Progress keeps its last value.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the subscription to end. A cancelled subscription ends with `Ok`.
    pub async fn finished(self) -> Result<(), StoreError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(StoreError::SubscriptionFailed(e.to_string())),
        }
    }

    /// Drive `work` while watching the subscription.
    ///
    /// A failed subscription (a contract violation from the index database)
    /// aborts `work` and is returned. A subscription that ends cleanly only
    /// stops the progress updates and lets `work` run to completion.
    pub async fn supervise<F, T>(self, work: F) -> anyhow::Result<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        tokio::pin!(work);
        tokio::select! {
            result = &mut work => return result,
            ended = self.finished() => {
                ended.context("Sync subscription failed")?;
                info!("Sync subscription ended, progress is no longer updated");
            }
        }
        work.await
    }
}
