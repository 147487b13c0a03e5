//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};
use crate::traits::now_millis;

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

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {} is newer than supported version {}",
            current, CURRENT_VERSION
        )));
    }

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
        tracing::debug!(version = CURRENT_VERSION, "schema migrated");
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
        -- Events: append-only, one row per (log, sn)
        CREATE TABLE events (
            said TEXT PRIMARY KEY,            -- qb64 SAID of the event body
            log_kind TEXT NOT NULL,           -- 'kel' or 'tel'
            log_id TEXT NOT NULL,             -- identifier prefix or registry id
            sn INTEGER NOT NULL,
            raw BLOB NOT NULL,                -- canonical JSON body
            stored_at INTEGER NOT NULL,       -- local timestamp of ingestion

            UNIQUE(log_kind, log_id, sn)
        );

        -- Fork evidence: refused events at occupied positions
        CREATE TABLE forks (
            log_kind TEXT NOT NULL,
            log_id TEXT NOT NULL,
            sn INTEGER NOT NULL,
            said TEXT NOT NULL,
            raw BLOB NOT NULL,
            detected_at INTEGER NOT NULL,
            PRIMARY KEY (log_kind, log_id, sn, said)
        );

        -- Credential registries
        CREATE TABLE registries (
            registry_id TEXT PRIMARY KEY,
            issuer TEXT NOT NULL,
            parent TEXT
        );

        -- Credential bodies
        CREATE TABLE credentials (
            said TEXT PRIMARY KEY,
            issuer TEXT NOT NULL,
            registry_id TEXT,
            raw BLOB NOT NULL
        );

        CREATE INDEX idx_events_log ON events(log_kind, log_id, sn);
        CREATE INDEX idx_registries_issuer ON registries(issuer);
        "#,
    )?;

    Ok(())
}
