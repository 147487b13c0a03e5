//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend for the KERI Kernel. It uses
//! rusqlite with bundled SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use keri_kernel_core::{Prefix, Registry, RegistryId, Said};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{
    decide_append, now_millis, Fork, InsertResult, LogId, LogKind, Store, StoredCredential,
    StoredEvent,
};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection off the async runtime.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Task(format!("mutex poisoned: {}", e)))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(format!("spawn_blocking failed: {}", e)))?
    }
}

fn sn_param(sn: u64) -> Result<i64> {
    i64::try_from(sn).map_err(|_| StoreError::InvalidData(format!("sn {} out of range", sn)))
}

fn said_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Said> {
    let text: String = row.get(idx)?;
    Said::parse(&text).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn opt_said_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<Said>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| {
        Said::parse(&t)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn kind_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<LogKind> {
    let text: String = row.get(idx)?;
    LogKind::parse(&text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unknown log kind {}", text).into(),
        )
    })
}

fn sn_column(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let sn: i64 = row.get(idx)?;
    u64::try_from(sn).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}

// Columns: log_kind, log_id, sn, said, raw
const EVENT_COLUMNS: &str = "log_kind, log_id, sn, said, raw";

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredEvent> {
    let raw: Vec<u8> = row.get(4)?;
    Ok(StoredEvent {
        log: LogId {
            kind: kind_column(row, 0)?,
            id: said_column(row, 1)?,
        },
        sn: sn_column(row, 2)?,
        said: said_column(row, 3)?,
        raw: Bytes::from(raw),
    })
}

fn row_to_registry(row: &rusqlite::Row<'_>) -> rusqlite::Result<Registry> {
    Ok(Registry {
        registry_id: said_column(row, 0)?,
        issuer: said_column(row, 1)?,
        parent: opt_said_column(row, 2)?,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn append_event(
        &self,
        event: &StoredEvent,
        expected_prior: Option<&Said>,
    ) -> Result<InsertResult> {
        let event = event.clone();
        let expected_prior = expected_prior.cloned();

        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let kind = event.log.kind.as_str();
            let log_id = event.log.id.as_str();

            let at_position: Option<Said> = tx
                .query_row(
                    "SELECT said FROM events WHERE log_kind = ?1 AND log_id = ?2 AND sn = ?3",
                    params![kind, log_id, sn_param(event.sn)?],
                    |row| said_column(row, 0),
                )
                .optional()?;

            let head: Option<(u64, Said)> = tx
                .query_row(
                    "SELECT sn, said FROM events WHERE log_kind = ?1 AND log_id = ?2
                     ORDER BY sn DESC LIMIT 1",
                    params![kind, log_id],
                    |row| Ok((sn_column(row, 0)?, said_column(row, 1)?)),
                )
                .optional()?;

            if let Some(result) = decide_append(
                &event,
                expected_prior.as_ref(),
                at_position.as_ref(),
                head.as_ref().map(|(sn, said)| (*sn, said)),
            ) {
                return Ok(result);
            }

            tx.execute(
                "INSERT INTO events (said, log_kind, log_id, sn, raw, stored_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    event.said.as_str(),
                    kind,
                    log_id,
                    sn_param(event.sn)?,
                    event.raw.as_ref(),
                    now_millis(),
                ],
            )?;
            tx.commit()?;

            Ok(InsertResult::Inserted)
        })
        .await
    }

    async fn get_event(&self, said: &Said) -> Result<Option<StoredEvent>> {
        let said = said.clone();
        self.run(move |conn| {
            conn.query_row(
                &format!("SELECT {} FROM events WHERE said = ?1", EVENT_COLUMNS),
                params![said.as_str()],
                row_to_event,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn get_event_at(&self, log: &LogId, sn: u64) -> Result<Option<StoredEvent>> {
        let log = log.clone();
        self.run(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM events WHERE log_kind = ?1 AND log_id = ?2 AND sn = ?3",
                    EVENT_COLUMNS
                ),
                params![log.kind.as_str(), log.id.as_str(), sn_param(sn)?],
                row_to_event,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn get_log(&self, log: &LogId) -> Result<Vec<StoredEvent>> {
        let log = log.clone();
        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM events WHERE log_kind = ?1 AND log_id = ?2 ORDER BY sn",
                EVENT_COLUMNS
            ))?;

            let events = stmt
                .query_map(params![log.kind.as_str(), log.id.as_str()], row_to_event)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(events)
        })
        .await
    }

    async fn get_log_head(&self, log: &LogId) -> Result<Option<StoredEvent>> {
        let log = log.clone();
        self.run(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM events WHERE log_kind = ?1 AND log_id = ?2
                     ORDER BY sn DESC LIMIT 1",
                    EVENT_COLUMNS
                ),
                params![log.kind.as_str(), log.id.as_str()],
                row_to_event,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn list_logs(&self, kind: Option<LogKind>) -> Result<Vec<LogId>> {
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT log_kind, log_id FROM events
                 WHERE ?1 IS NULL OR log_kind = ?1
                 ORDER BY log_kind, log_id",
            )?;

            let logs = stmt
                .query_map(params![kind.map(|k| k.as_str())], |row| {
                    Ok(LogId {
                        kind: kind_column(row, 0)?,
                        id: said_column(row, 1)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(logs)
        })
        .await
    }

    async fn record_fork(&self, event: &StoredEvent) -> Result<()> {
        let event = event.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO forks (log_kind, log_id, sn, said, raw, detected_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    event.log.kind.as_str(),
                    event.log.id.as_str(),
                    sn_param(event.sn)?,
                    event.said.as_str(),
                    event.raw.as_ref(),
                    now_millis(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_forks(&self, log: &LogId) -> Result<Vec<Fork>> {
        let log = log.clone();
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT sn, said, raw, detected_at FROM forks
                 WHERE log_kind = ?1 AND log_id = ?2 ORDER BY sn, detected_at",
            )?;

            let forks = stmt
                .query_map(params![log.kind.as_str(), log.id.as_str()], |row| {
                    let raw: Vec<u8> = row.get(2)?;
                    Ok(Fork {
                        log: log.clone(),
                        sn: sn_column(row, 0)?,
                        said: said_column(row, 1)?,
                        raw: Bytes::from(raw),
                        detected_at: row.get(3)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(forks)
        })
        .await
    }

    async fn put_registry(&self, registry: &Registry) -> Result<()> {
        let registry = registry.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO registries (registry_id, issuer, parent) VALUES (?1, ?2, ?3)",
                params![
                    registry.registry_id.as_str(),
                    registry.issuer.as_str(),
                    registry.parent.as_ref().map(Said::as_str),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_registry(&self, id: &RegistryId) -> Result<Option<Registry>> {
        let id = id.clone();
        self.run(move |conn| {
            conn.query_row(
                "SELECT registry_id, issuer, parent FROM registries WHERE registry_id = ?1",
                params![id.as_str()],
                row_to_registry,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn list_registries(&self, issuer: Option<&Prefix>) -> Result<Vec<Registry>> {
        let issuer = issuer.cloned();
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT registry_id, issuer, parent FROM registries
                 WHERE ?1 IS NULL OR issuer = ?1
                 ORDER BY registry_id",
            )?;

            let registries = stmt
                .query_map(params![issuer.as_ref().map(Said::as_str)], row_to_registry)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(registries)
        })
        .await
    }

    async fn put_credential(&self, credential: &StoredCredential) -> Result<()> {
        let credential = credential.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO credentials (said, issuer, registry_id, raw)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    credential.said.as_str(),
                    credential.issuer.as_str(),
                    credential.registry.as_ref().map(Said::as_str),
                    credential.raw.as_ref(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_credential(&self, said: &Said) -> Result<Option<StoredCredential>> {
        let said = said.clone();
        self.run(move |conn| {
            conn.query_row(
                "SELECT said, issuer, registry_id, raw FROM credentials WHERE said = ?1",
                params![said.as_str()],
                |row| {
                    let raw: Vec<u8> = row.get(3)?;
                    Ok(StoredCredential {
                        said: said_column(row, 0)?,
                        issuer: said_column(row, 1)?,
                        registry: opt_said_column(row, 2)?,
                        raw: Bytes::from(raw),
                    })
                },
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }
}
