mod error;
mod page;
mod progress;
mod synced_query_store;

pub use error::StoreError;
pub use page::{page_count, PageState, PageWindow, QueryMode, QueryRequest, ResultPage};
pub use progress::{SyncPhase, SyncProgress, Total};
pub use synced_query_store::{SyncSubscription, SyncedQueryStore};
