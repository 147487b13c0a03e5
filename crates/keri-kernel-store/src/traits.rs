//! Store trait: the abstract interface for append-only log persistence.
//!
//! The kernel is storage-agnostic. Implementations include SQLite (primary)
//! and in-memory (for tests). Both hold canonical event bytes keyed by log
//! and sequence number; validation happens above this layer.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use keri_kernel_core::{
    Credential, KeyEvent, KeyEventLog, Prefix, Registry, RegistryId, Said, TelEvent,
    TransactionEventLog,
};

use crate::error::{Result, StoreError};

/// Which kind of log an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Kel,
    Tel,
}

impl LogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogKind::Kel => "kel",
            LogKind::Tel => "tel",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "kel" => Some(LogKind::Kel),
            "tel" => Some(LogKind::Tel),
            _ => None,
        }
    }
}

/// A log: an identifier's KEL or a registry's TEL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LogId {
    pub kind: LogKind,
    pub id: Said,
}

impl LogId {
    pub fn kel(prefix: &Prefix) -> Self {
        Self {
            kind: LogKind::Kel,
            id: prefix.clone(),
        }
    }

    pub fn tel(registry: &RegistryId) -> Self {
        Self {
            kind: LogKind::Tel,
            id: registry.clone(),
        }
    }
}

impl fmt::Display for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}

/// An event as persisted: its position and canonical body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEvent {
    pub log: LogId,
    pub sn: u64,
    pub said: Said,
    /// Canonical JSON body.
    pub raw: Bytes,
}

impl StoredEvent {
    pub fn from_key_event(event: &KeyEvent) -> Result<Self> {
        Ok(Self {
            log: LogId::kel(event.prefix()),
            sn: event.sn(),
            said: event.said().clone(),
            raw: Bytes::from(event.canonical_bytes()?),
        })
    }

    pub fn from_tel_event(event: &TelEvent) -> Result<Self> {
        Ok(Self {
            log: LogId::tel(event.registry_id()),
            sn: event.sn(),
            said: event.said().clone(),
            raw: Bytes::from(event.canonical_bytes()?),
        })
    }

    pub fn to_key_event(&self) -> Result<KeyEvent> {
        Ok(KeyEvent::from_json(&self.raw)?)
    }

    pub fn to_tel_event(&self) -> Result<TelEvent> {
        let value = serde_json::from_slice(&self.raw)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(TelEvent::from_value(value)?)
    }
}

/// Result of appending an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertResult {
    /// Event was appended.
    Inserted,
    /// The same event is already at this position (idempotent - not an error).
    AlreadyExists,
    /// A different event occupies this position.
    Conflict {
        /// SAID of the event already stored at this position.
        existing: Said,
    },
    /// The log head is not where the caller expected it.
    StaleHead {
        /// Sequence number the log would accept next.
        next_sn: u64,
        /// SAID of the current head, if any.
        head: Option<Said>,
    },
}

/// Evidence of a fork: an event that was refused because another event
/// already holds its position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fork {
    pub log: LogId,
    pub sn: u64,
    /// SAID of the refused event.
    pub said: Said,
    /// Canonical bytes of the refused event.
    pub raw: Bytes,
    /// When the fork was detected (Unix ms).
    pub detected_at: i64,
}

/// A stored credential body, keyed by its SAID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCredential {
    pub said: Said,
    pub issuer: Prefix,
    pub registry: Option<RegistryId>,
    pub raw: Bytes,
}

impl StoredCredential {
    pub fn from_credential(credential: &Credential) -> Result<Self> {
        Ok(Self {
            said: credential.said.clone(),
            issuer: credential.issuer.clone(),
            registry: credential.registry.clone(),
            raw: Bytes::from(credential.canonical_bytes()?),
        })
    }

    pub fn to_credential(&self) -> Result<Credential> {
        let value = serde_json::from_slice(&self.raw)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(Credential::from_value(value)?)
    }
}

/// The Store trait: async interface for log persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, we use `spawn_blocking` internally to avoid blocking the runtime.
///
/// # Design Notes
///
/// - **Append-only**: events are never updated or deleted.
/// - **Idempotent appends**: appending the same event twice returns `AlreadyExists`.
/// - **Conflict detection**: a different event at an occupied position returns
///   `Conflict` with the stored SAID.
/// - **Head precondition**: `append_event` only succeeds at the next sequence
///   number and, for `sn > 0`, only when `expected_prior` names the head.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Event Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Append an event to its log.
    ///
    /// # Returns
    /// - `Inserted` if the event was new and extended the head.
    /// - `AlreadyExists` if the exact same event is already stored.
    /// - `Conflict` if a different event holds `(log, sn)`.
    /// - `StaleHead` if `sn` is not the next position or the head SAID is not
    ///   `expected_prior`.
    async fn append_event(
        &self,
        event: &StoredEvent,
        expected_prior: Option<&Said>,
    ) -> Result<InsertResult>;

    /// Get an event by its SAID.
    async fn get_event(&self, said: &Said) -> Result<Option<StoredEvent>>;

    /// Get the event at a position in a log.
    async fn get_event_at(&self, log: &LogId, sn: u64) -> Result<Option<StoredEvent>>;

    /// Get every event of a log, ordered by sn.
    async fn get_log(&self, log: &LogId) -> Result<Vec<StoredEvent>>;

    /// Get the last event of a log.
    async fn get_log_head(&self, log: &LogId) -> Result<Option<StoredEvent>>;

    /// List all logs, optionally filtered by kind.
    async fn list_logs(&self, kind: Option<LogKind>) -> Result<Vec<LogId>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Fork Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Record evidence of a fork. Recording the same evidence twice is a no-op.
    async fn record_fork(&self, event: &StoredEvent) -> Result<()>;

    /// Get all fork evidence for a log.
    async fn get_forks(&self, log: &LogId) -> Result<Vec<Fork>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Registry Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Record a registry. Idempotent.
    async fn put_registry(&self, registry: &Registry) -> Result<()>;

    /// Get a registry by id.
    async fn get_registry(&self, id: &RegistryId) -> Result<Option<Registry>>;

    /// List registries, optionally filtered by issuer.
    async fn list_registries(&self, issuer: Option<&Prefix>) -> Result<Vec<Registry>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Credential Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Store a credential body. Idempotent.
    async fn put_credential(&self, credential: &StoredCredential) -> Result<()>;

    /// Get a credential body by SAID.
    async fn get_credential(&self, said: &Said) -> Result<Option<StoredCredential>>;
}

/// Extension trait for common store patterns.
pub trait StoreExt: Store {
    /// Load and replay an identifier's KEL.
    fn load_kel(
        &self,
        prefix: &Prefix,
    ) -> impl std::future::Future<Output = Result<KeyEventLog>> + Send;

    /// Load and replay a registry's TEL.
    fn load_tel(
        &self,
        registry: &RegistryId,
    ) -> impl std::future::Future<Output = Result<TransactionEventLog>> + Send;
}

impl<S: Store + ?Sized> StoreExt for S {
    async fn load_kel(&self, prefix: &Prefix) -> Result<KeyEventLog> {
        let log = LogId::kel(prefix);
        let events = self
            .get_log(&log)
            .await?
            .iter()
            .map(StoredEvent::to_key_event)
            .collect::<Result<Vec<_>>>()?;
        KeyEventLog::replay(events).map_err(|source| StoreError::Replay {
            log: log.to_string(),
            source,
        })
    }

    async fn load_tel(&self, registry: &RegistryId) -> Result<TransactionEventLog> {
        let log = LogId::tel(registry);
        let events = self
            .get_log(&log)
            .await?
            .iter()
            .map(StoredEvent::to_tel_event)
            .collect::<Result<Vec<_>>>()?;
        TransactionEventLog::replay(events).map_err(|source| StoreError::Replay {
            log: log.to_string(),
            source,
        })
    }
}

/// Decide an append against the current head and the event at `sn`.
///
/// Shared by every backend so they agree on the outcome.
pub(crate) fn decide_append(
    event: &StoredEvent,
    expected_prior: Option<&Said>,
    at_position: Option<&Said>,
    head: Option<(u64, &Said)>,
) -> Option<InsertResult> {
    if let Some(existing) = at_position {
        return Some(if *existing == event.said {
            InsertResult::AlreadyExists
        } else {
            InsertResult::Conflict {
                existing: existing.clone(),
            }
        });
    }

    let next_sn = head.map(|(sn, _)| sn + 1).unwrap_or(0);
    let head_said = head.map(|(_, said)| said);
    if event.sn != next_sn || expected_prior != head_said {
        return Some(InsertResult::StaleHead {
            next_sn,
            head: head_said.cloned(),
        });
    }
    None
}

/// Get current time in milliseconds.
pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
