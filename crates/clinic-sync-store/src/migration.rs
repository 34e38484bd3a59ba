//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Documents and tombstones, one row per (collection, key)
        CREATE TABLE documents (
            collection TEXT NOT NULL,
            doc_key TEXT NOT NULL,            -- DocKey as JSON text
            body TEXT,                        -- JSON object, NULL = tombstone
            version_ts INTEGER NOT NULL,      -- last-writer-wins stamp
            version_device BLOB NOT NULL,     -- 16 bytes
            PRIMARY KEY (collection, doc_key)
        );

        -- The change log, append-only
        CREATE TABLE change_log (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,  -- insertion order
            ts INTEGER NOT NULL,              -- local log clock (Unix ms)
            collection TEXT NOT NULL,
            operation INTEGER NOT NULL,       -- 0=put, 1=delete
            doc_key TEXT,                     -- DocKey as JSON text
            body TEXT,                        -- post-mutation document
            version_ts INTEGER NOT NULL,
            version_device BLOB NOT NULL
        );

        -- Auto-increment counters
        CREATE TABLE sequences (
            collection TEXT PRIMARY KEY,
            last_id INTEGER NOT NULL
        );

        -- This device's identity
        CREATE TABLE device (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            device_id BLOB NOT NULL
        );

        CREATE INDEX idx_change_log_ts ON change_log(ts, seq);
        "#,
    )?;

    Ok(())
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
