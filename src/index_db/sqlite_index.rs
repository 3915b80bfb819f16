//! SQLite-backed index database.
//!
//! One SQLite file holds the inodes of every scope. [`SqliteIndex`] owns the
//! connection and hands out scoped handles: [`SqliteIndexDatabase`] for the
//! read side the store talks to, [`SqliteIndexWriter`] for the ingest process.

use super::schema;
use super::{IndexDatabase, Inode, InodeKind, QueryOutcome, SyncFeed, SyncNotice, SyncState};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use rusqlite::{params, types::Type, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// How often the sync poller re-reads the sync state by default.
pub const DEFAULT_SYNC_POLL_INTERVAL: Duration = Duration::from_secs(1);

const SYNC_FEED_CAPACITY: usize = 64;

/// Shortest query the trigram tokenizer can match. Shorter queries fall back
/// to a substring scan.
const TRIGRAM_MIN_CHARS: usize = 3;

const INODE_COLUMNS: &str = "inodes.id, inodes.name, inodes.kind, inodes.size, \
                             inodes.parent_id, inodes.updated_at";

type GuardedConnection = Arc<Mutex<Connection>>;

fn lock_connection(conn: &GuardedConnection) -> Result<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|e| anyhow!("index connection lock poisoned: {e}"))
}

fn to_sql_int(value: usize, what: &str) -> Result<i64> {
    i64::try_from(value).with_context(|| format!("{} {} does not fit in a SQLite integer", what, value))
}

fn inode_from_row(row: &Row) -> rusqlite::Result<Inode> {
    let kind_str: String = row.get(2)?;
    let kind = InodeKind::parse(&kind_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            Type::Text,
            format!("unknown inode kind '{}'", kind_str).into(),
        )
    })?;
    let size: i64 = row.get(3)?;

    Ok(Inode {
        id: row.get(0)?,
        name: row.get(1)?,
        kind,
        size: size.max(0) as u64,
        parent_id: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn read_sync_state(conn: &Connection, scope: &str) -> Result<SyncState> {
    let row = conn
        .query_row(
            "SELECT synced, total FROM sync_state WHERE scope = ?1",
            params![scope],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Option<i64>>(1)?)),
        )
        .optional()?;

    Ok(match row {
        Some((synced, total)) => SyncState {
            synced: synced.max(0) as u64,
            total: total.map(|t| t.max(0) as u64),
        },
        None => SyncState::default(),
    })
}

/// Escape `%`, `_` and `\` so `query` is matched literally by `LIKE ... ESCAPE '\'`.
fn like_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Owning handle of the index file.
#[derive(Clone)]
pub struct SqliteIndex {
    conn: GuardedConnection,
    poll_interval: Duration,
}

impl SqliteIndex {
    /// Open (or create) the index database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open index database at {:?}", path))?;

        // Enable WAL mode so the ingest process can write while we read
        conn.pragma_update(None, "journal_mode", "WAL")?;

        info!("Opened index database at {:?}", path);
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            poll_interval: DEFAULT_SYNC_POLL_INTERVAL,
        })
    }

    /// Interval used by the sync pollers of the handles created afterwards.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Read-side handle bound to `scope`.
    pub fn scoped(&self, scope: &str) -> Result<SqliteIndexDatabase> {
        Ok(SqliteIndexDatabase {
            conn: self.conn.clone(),
            scope: validate_scope(scope)?,
            poll_interval: self.poll_interval,
        })
    }

    /// Write-side handle bound to `scope`.
    pub fn writer(&self, scope: &str) -> Result<SqliteIndexWriter> {
        Ok(SqliteIndexWriter {
            conn: self.conn.clone(),
            scope: validate_scope(scope)?,
        })
    }
}

fn validate_scope(scope: &str) -> Result<String> {
    let scope = scope.trim();
    if scope.is_empty() {
        bail!("Index scope must not be empty");
    }
    Ok(scope.to_string())
}

/// Index database handle scoped to one identifier.
#[derive(Clone)]
pub struct SqliteIndexDatabase {
    conn: GuardedConnection,
    scope: String,
    poll_interval: Duration,
}

impl SqliteIndexDatabase {
    fn search_blocking(&self, query: &str, limit: i64, offset: i64) -> Result<QueryOutcome<Inode>> {
        let conn = lock_connection(&self.conn)?;
        let query = query.trim();

        if query.chars().count() < TRIGRAM_MIN_CHARS {
            return self.search_substring(&conn, query, limit, offset);
        }

        // Quote the whole query so FTS5 treats it as a single phrase
        let phrase = format!("\"{}\"", query.replace('"', "\"\""));

        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM inodes_fts WHERE inodes_fts MATCH ?1 AND inodes_fts.scope = ?2",
            params![phrase, self.scope],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {INODE_COLUMNS}
             FROM inodes_fts
             JOIN inodes ON inodes.scope = inodes_fts.scope AND inodes.id = inodes_fts.inode_id
             WHERE inodes_fts MATCH ?1 AND inodes_fts.scope = ?2
             ORDER BY bm25(inodes_fts), inodes.name, inodes.id
             LIMIT ?3 OFFSET ?4"
        ))?;
        let data = stmt
            .query_map(params![phrase, self.scope, limit, offset], inode_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        debug!(
            "FTS search '{}' in scope {} returned {} of {} matches",
            query,
            self.scope,
            data.len(),
            total
        );
        Ok(QueryOutcome {
            data,
            total: total.max(0) as u64,
        })
    }

    fn search_substring(
        &self,
        conn: &Connection,
        query: &str,
        limit: i64,
        offset: i64,
    ) -> Result<QueryOutcome<Inode>> {
        let pattern = like_pattern(query);

        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM inodes WHERE scope = ?1 AND name LIKE ?2 ESCAPE '\\'",
            params![self.scope, pattern],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {INODE_COLUMNS}
             FROM inodes
             WHERE scope = ?1 AND name LIKE ?2 ESCAPE '\\'
             ORDER BY inodes.name, inodes.id
             LIMIT ?3 OFFSET ?4"
        ))?;
        let data = stmt
            .query_map(params![self.scope, pattern, limit, offset], inode_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(QueryOutcome {
            data,
            total: total.max(0) as u64,
        })
    }

    fn latest_blocking(&self, limit: i64, offset: i64) -> Result<QueryOutcome<Inode>> {
        let conn = lock_connection(&self.conn)?;

        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM inodes WHERE scope = ?1",
            params![self.scope],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {INODE_COLUMNS}
             FROM inodes
             WHERE scope = ?1
             ORDER BY inodes.updated_at DESC, inodes.id
             LIMIT ?2 OFFSET ?3"
        ))?;
        let data = stmt
            .query_map(params![self.scope, limit, offset], inode_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(QueryOutcome {
            data,
            total: total.max(0) as u64,
        })
    }

    fn clear_blocking(&self) -> Result<()> {
        let mut conn = lock_connection(&self.conn)?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM inodes_fts WHERE scope = ?1", params![self.scope])?;
        let removed = tx.execute("DELETE FROM inodes WHERE scope = ?1", params![self.scope])?;
        tx.execute("DELETE FROM sync_state WHERE scope = ?1", params![self.scope])?;
        tx.commit()?;

        info!("Cleared {} inodes from scope {}", removed, self.scope);
        Ok(())
    }
}

#[async_trait]
impl IndexDatabase for SqliteIndexDatabase {
    type Record = Inode;

    fn scope(&self) -> &str {
        &self.scope
    }

    async fn get_sync_state(&self) -> Result<SyncState> {
        let db = self.clone();
        run_blocking(move || {
            let conn = lock_connection(&db.conn)?;
            read_sync_state(&conn, &db.scope)
        })
        .await
    }

    fn start_sync(&self) -> SyncFeed {
        let (tx, rx) = mpsc::channel(SYNC_FEED_CAPACITY);
        let conn = self.conn.clone();
        let scope = self.scope.clone();
        let poll_interval = self.poll_interval;

        tokio::spawn(async move {
            poll_sync_state(conn, scope, poll_interval, tx).await;
        });

        rx
    }

    async fn search(&self, query: &str, limit: usize, offset: usize) -> Result<QueryOutcome<Inode>> {
        let limit = to_sql_int(limit, "limit")?;
        let offset = to_sql_int(offset, "offset")?;
        let db = self.clone();
        let query = query.to_string();
        run_blocking(move || db.search_blocking(&query, limit, offset)).await
    }

    async fn latest(&self, limit: usize, offset: usize) -> Result<QueryOutcome<Inode>> {
        let limit = to_sql_int(limit, "limit")?;
        let offset = to_sql_int(offset, "offset")?;
        let db = self.clone();
        run_blocking(move || db.latest_blocking(limit, offset)).await
    }

    async fn clear_data(&self) -> Result<()> {
        let db = self.clone();
        run_blocking(move || db.clear_blocking()).await
    }
}

/// Run a statement batch on the blocking pool, off the async workers.
async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .context("Index database task failed")?
}

/// Re-read the scope's sync state every `poll_interval` and push it on the
/// feed whenever it changed. Read failures are pushed as errors. Stops once
/// the receiving side is dropped.
async fn poll_sync_state(
    conn: GuardedConnection,
    scope: String,
    poll_interval: Duration,
    tx: mpsc::Sender<SyncNotice>,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_emitted: Option<SyncState> = None;

    debug!("Sync poller started for scope {}", scope);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tx.closed() => break,
        }

        let read = run_blocking({
            let conn = conn.clone();
            let scope = scope.clone();
            move || read_sync_state(&*lock_connection(&conn)?, &scope)
        })
        .await;
        let notice = match read {
            Ok(state) if last_emitted == Some(state) => continue,
            Ok(state) => {
                last_emitted = Some(state);
                Ok(Some(state))
            }
            Err(e) => {
                last_emitted = None;
                Err(e.context(format!("Failed to read sync state of scope {}", scope)))
            }
        };

        if tx.send(notice).await.is_err() {
            break;
        }
    }
    debug!("Sync poller stopped for scope {}", scope);
}

/// Write-side handle used by the ingest process.
pub struct SqliteIndexWriter {
    conn: GuardedConnection,
    scope: String,
}

impl SqliteIndexWriter {
    /// Insert or replace inodes of this scope. Returns the number written.
    pub fn upsert_inodes(&self, inodes: &[Inode]) -> Result<usize> {
        let mut conn = lock_connection(&self.conn)?;
        let tx = conn.transaction()?;
        {
            let mut upsert = tx.prepare(
                "INSERT INTO inodes (scope, id, name, kind, size, parent_id, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(scope, id) DO UPDATE SET
                    name = excluded.name,
                    kind = excluded.kind,
                    size = excluded.size,
                    parent_id = excluded.parent_id,
                    updated_at = excluded.updated_at",
            )?;
            let mut unindex =
                tx.prepare("DELETE FROM inodes_fts WHERE scope = ?1 AND inode_id = ?2")?;
            let mut index =
                tx.prepare("INSERT INTO inodes_fts (scope, inode_id, name) VALUES (?1, ?2, ?3)")?;

            for inode in inodes {
                let size = i64::try_from(inode.size)
                    .with_context(|| format!("Inode {} size out of range", inode.id))?;
                upsert.execute(params![
                    self.scope,
                    inode.id,
                    inode.name,
                    inode.kind.as_str(),
                    size,
                    inode.parent_id,
                    inode.updated_at
                ])?;
                unindex.execute(params![self.scope, inode.id])?;
                index.execute(params![self.scope, inode.id, inode.name])?;
            }
        }
        tx.commit()?;

        debug!("Upserted {} inodes into scope {}", inodes.len(), self.scope);
        Ok(inodes.len())
    }

    /// Record how far the ingest got.
    pub fn set_sync_state(&self, state: SyncState) -> Result<()> {
        if let Some(total) = state.total {
            if state.synced > total {
                bail!(
                    "Synced count {} exceeds total {} for scope {}",
                    state.synced,
                    total,
                    self.scope
                );
            }
        }
        let synced = i64::try_from(state.synced).context("synced count out of range")?;
        let total = state
            .total
            .map(i64::try_from)
            .transpose()
            .context("total count out of range")?;

        let conn = lock_connection(&self.conn)?;
        conn.execute(
            "INSERT INTO sync_state (scope, synced, total, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(scope) DO UPDATE SET
                synced = excluded.synced,
                total = excluded.total,
                updated_at = excluded.updated_at",
            params![self.scope, synced, total, chrono::Utc::now().timestamp()],
        )?;
        Ok(())
    }
}
