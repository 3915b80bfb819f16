//! End-to-end tests of the store over a file-backed index.
//!
//! The writer opens its own connection to the same file, the way the ingest
//! process does in production.

use inode_index_server::index_db::{Inode, InodeKind, SqliteIndex, SyncState};
use inode_index_server::store::{QueryRequest, SyncPhase, SyncedQueryStore, Total};
use std::num::NonZeroUsize;
use std::time::Duration;
use tempfile::TempDir;

const SCOPE: &str = "0xc0ffee";

fn inode(id: &str, name: &str, updated_at: i64) -> Inode {
    Inode {
        id: id.to_string(),
        name: name.to_string(),
        kind: InodeKind::File,
        size: 1024,
        parent_id: Some("root".to_string()),
        updated_at,
    }
}

fn open_pair(temp_dir: &TempDir) -> (SqliteIndex, SqliteIndex) {
    let path = temp_dir.path().join("index.db");
    let reader = SqliteIndex::open(&path)
        .unwrap()
        .with_poll_interval(Duration::from_millis(20));
    let ingest = SqliteIndex::open(&path).unwrap();
    (reader, ingest)
}

#[tokio::test]
async fn test_progress_follows_external_writer() {
    let temp_dir = TempDir::new().unwrap();
    let (reader, ingest) = open_pair(&temp_dir);
    let writer = ingest.writer(SCOPE).unwrap();

    let store = SyncedQueryStore::new(reader.scoped(SCOPE).unwrap(), NonZeroUsize::new(10).unwrap());
    let subscription = store.initialize().await.unwrap();
    assert_eq!(store.progress().phase(), SyncPhase::Uninitialized);

    let mut progress = store.subscribe_progress();

    writer.set_sync_state(SyncState::new(5, Some(20))).unwrap();
    tokio::time::timeout(
        Duration::from_secs(5),
        progress.wait_for(|p| p.synced() == 5),
    )
    .await
    .expect("progress update not observed")
    .unwrap();
    assert_eq!(store.progress().total(), Total::Known(20));
    assert!(!store.progress().is_complete());

    writer.set_sync_state(SyncState::new(20, Some(20))).unwrap();
    tokio::time::timeout(
        Duration::from_secs(5),
        progress.wait_for(|p| p.is_complete()),
    )
    .await
    .expect("completion not observed")
    .unwrap();
    assert_eq!(store.progress().phase(), SyncPhase::Complete);

    subscription.cancel();
    assert!(subscription.finished().await.is_ok());
}

#[tokio::test]
async fn test_queries_see_rows_written_after_open() {
    let temp_dir = TempDir::new().unwrap();
    let (reader, ingest) = open_pair(&temp_dir);
    let writer = ingest.writer(SCOPE).unwrap();

    let store = SyncedQueryStore::new(reader.scoped(SCOPE).unwrap(), NonZeroUsize::new(2).unwrap());

    let page = store.query(QueryRequest::latest(0)).await.unwrap();
    assert!(page.is_empty());

    let inodes: Vec<Inode> = (0..5)
        .map(|i| inode(&format!("ino_{}", i), &format!("invoice-{}.pdf", i), 100 + i))
        .collect();
    writer.upsert_inodes(&inodes).unwrap();

    let page = store.query(QueryRequest::latest(0)).await.unwrap();
    assert_eq!(page.total_count, 5);
    assert_eq!(page.page_count, 3);
    let ids: Vec<&str> = page.items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["ino_4", "ino_3"]);

    let page = store.query(QueryRequest::latest(2)).await.unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].id, "ino_0");

    let page = store.query(QueryRequest::search("invoice-3", 0)).await.unwrap();
    assert_eq!(page.total_count, 1);
    assert_eq!(page.items[0].name, "invoice-3.pdf");
    assert_eq!(store.page(), page);
}

#[tokio::test]
async fn test_clear_only_affects_own_scope() {
    let temp_dir = TempDir::new().unwrap();
    let (reader, ingest) = open_pair(&temp_dir);

    ingest
        .writer(SCOPE)
        .unwrap()
        .upsert_inodes(&[inode("a", "alpha.txt", 1), inode("b", "beta.txt", 2)])
        .unwrap();
    ingest
        .writer("0xother")
        .unwrap()
        .upsert_inodes(&[inode("a", "alpha.txt", 1)])
        .unwrap();

    let page_size = NonZeroUsize::new(10).unwrap();
    let store = SyncedQueryStore::new(reader.scoped(SCOPE).unwrap(), page_size);
    let other = SyncedQueryStore::new(reader.scoped("0xother").unwrap(), page_size);

    store.query(QueryRequest::latest(0)).await.unwrap();
    store.clear().await.unwrap();
    assert!(store.page().is_empty());

    let page = store.query(QueryRequest::search("alpha", 0)).await.unwrap();
    assert_eq!(page.total_count, 0);

    let page = other.query(QueryRequest::search("alpha", 0)).await.unwrap();
    assert_eq!(page.total_count, 1);

    // Clearing again is harmless
    store.clear().await.unwrap();
    assert!(store.page().is_empty());
}
