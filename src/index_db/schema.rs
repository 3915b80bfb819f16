//! Schema definition for the inode index tables.

use anyhow::{bail, Context, Result};
use rusqlite::Connection;
use tracing::info;

/// One step of the index schema. `up` is applied once when the database's
/// `user_version` is below `version`.
pub struct IndexSchema {
    pub version: usize,
    pub up: &'static str,
}

pub const INDEX_VERSIONED_SCHEMAS: &[IndexSchema] = &[IndexSchema {
    version: 1,
    up: r#"
            CREATE TABLE IF NOT EXISTS inodes (
                scope TEXT NOT NULL,
                id TEXT NOT NULL,
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                size INTEGER NOT NULL DEFAULT 0,
                parent_id TEXT,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (scope, id)
            );

            CREATE INDEX IF NOT EXISTS idx_inodes_scope_updated
                ON inodes(scope, updated_at DESC);

            CREATE VIRTUAL TABLE IF NOT EXISTS inodes_fts USING fts5(
                scope UNINDEXED,
                inode_id UNINDEXED,
                name,
                tokenize='trigram'
            );

            CREATE TABLE IF NOT EXISTS sync_state (
                scope TEXT PRIMARY KEY,
                synced INTEGER NOT NULL,
                total INTEGER,
                updated_at INTEGER NOT NULL
            );
        "#,
}];

/// Bring the database up to the latest schema version.
pub fn migrate(conn: &Connection) -> Result<()> {
    let current: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    let current = current.max(0) as usize;
    let latest = INDEX_VERSIONED_SCHEMAS
        .last()
        .map(|schema| schema.version)
        .unwrap_or(0);

    if current > latest {
        bail!(
            "Index database schema version {} is newer than supported version {}",
            current,
            latest
        );
    }

    for schema in INDEX_VERSIONED_SCHEMAS
        .iter()
        .filter(|schema| schema.version > current)
    {
        info!("Applying index schema version {}", schema.version);
        conn.execute_batch(schema.up)
            .with_context(|| format!("Failed to apply index schema version {}", schema.version))?;
        conn.pragma_update(None, "user_version", schema.version as i64)?;
    }

    Ok(())
}
