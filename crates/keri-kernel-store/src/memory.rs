//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use keri_kernel_core::{Prefix, Registry, RegistryId, Said};

use crate::error::{Result, StoreError};
use crate::traits::{
    decide_append, now_millis, Fork, InsertResult, LogId, LogKind, Store, StoredCredential,
    StoredEvent,
};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Events indexed by SAID.
    events: HashMap<Said, StoredEvent>,

    /// Per-log SAIDs; the index is the sequence number.
    logs: BTreeMap<LogId, Vec<Said>>,

    /// Fork evidence.
    forks: HashMap<LogId, Vec<Fork>>,

    registries: BTreeMap<RegistryId, Registry>,

    credentials: HashMap<Said, StoredCredential>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Task(format!("lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Task(format!("lock poisoned: {}", e)))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStoreInner {
    fn event_at(&self, log: &LogId, sn: u64) -> Option<&StoredEvent> {
        let said = self.logs.get(log)?.get(usize::try_from(sn).ok()?)?;
        self.events.get(said)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn append_event(
        &self,
        event: &StoredEvent,
        expected_prior: Option<&Said>,
    ) -> Result<InsertResult> {
        let mut inner = self.write()?;

        let saids = inner.logs.get(&event.log);
        let at_position = saids
            .and_then(|s| usize::try_from(event.sn).ok().and_then(|i| s.get(i)))
            .cloned();
        let head = saids.and_then(|s| s.last().map(|said| (s.len() as u64 - 1, said.clone())));

        if let Some(result) = decide_append(
            event,
            expected_prior,
            at_position.as_ref(),
            head.as_ref().map(|(sn, said)| (*sn, said)),
        ) {
            return Ok(result);
        }

        inner
            .logs
            .entry(event.log.clone())
            .or_default()
            .push(event.said.clone());
        inner.events.insert(event.said.clone(), event.clone());

        Ok(InsertResult::Inserted)
    }

    async fn get_event(&self, said: &Said) -> Result<Option<StoredEvent>> {
        let inner = self.read()?;
        Ok(inner.events.get(said).cloned())
    }

    async fn get_event_at(&self, log: &LogId, sn: u64) -> Result<Option<StoredEvent>> {
        let inner = self.read()?;
        Ok(inner.event_at(log, sn).cloned())
    }

    async fn get_log(&self, log: &LogId) -> Result<Vec<StoredEvent>> {
        let inner = self.read()?;
        let Some(saids) = inner.logs.get(log) else {
            return Ok(Vec::new());
        };
        saids
            .iter()
            .map(|said| {
                inner
                    .events
                    .get(said)
                    .cloned()
                    .ok_or_else(|| StoreError::InvalidData(format!("missing event {}", said)))
            })
            .collect()
    }

    async fn get_log_head(&self, log: &LogId) -> Result<Option<StoredEvent>> {
        let inner = self.read()?;
        Ok(inner
            .logs
            .get(log)
            .and_then(|saids| saids.last())
            .and_then(|said| inner.events.get(said))
            .cloned())
    }

    async fn list_logs(&self, kind: Option<LogKind>) -> Result<Vec<LogId>> {
        let inner = self.read()?;
        Ok(inner
            .logs
            .keys()
            .filter(|log| kind.map_or(true, |k| log.kind == k))
            .cloned()
            .collect())
    }

    async fn record_fork(&self, event: &StoredEvent) -> Result<()> {
        let mut inner = self.write()?;
        let forks = inner.forks.entry(event.log.clone()).or_default();

        if !forks
            .iter()
            .any(|f| f.sn == event.sn && f.said == event.said)
        {
            forks.push(Fork {
                log: event.log.clone(),
                sn: event.sn,
                said: event.said.clone(),
                raw: event.raw.clone(),
                detected_at: now_millis(),
            });
            forks.sort_by_key(|f| f.sn);
        }

        Ok(())
    }

    async fn get_forks(&self, log: &LogId) -> Result<Vec<Fork>> {
        let inner = self.read()?;
        Ok(inner.forks.get(log).cloned().unwrap_or_default())
    }

    async fn put_registry(&self, registry: &Registry) -> Result<()> {
        let mut inner = self.write()?;
        inner
            .registries
            .entry(registry.registry_id.clone())
            .or_insert_with(|| registry.clone());
        Ok(())
    }

    async fn get_registry(&self, id: &RegistryId) -> Result<Option<Registry>> {
        let inner = self.read()?;
        Ok(inner.registries.get(id).cloned())
    }

    async fn list_registries(&self, issuer: Option<&Prefix>) -> Result<Vec<Registry>> {
        let inner = self.read()?;
        Ok(inner
            .registries
            .values()
            .filter(|r| issuer.map_or(true, |i| &r.issuer == i))
            .cloned()
            .collect())
    }

    async fn put_credential(&self, credential: &StoredCredential) -> Result<()> {
        let mut inner = self.write()?;
        inner
            .credentials
            .entry(credential.said.clone())
            .or_insert_with(|| credential.clone());
        Ok(())
    }

    async fn get_credential(&self, said: &Said) -> Result<Option<StoredCredential>> {
        let inner = self.read()?;
        Ok(inner.credentials.get(said).cloned())
    }
}
