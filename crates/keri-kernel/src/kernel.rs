//! The Kernel: identifiers, credential registries and event streams over a
//! log store.
//!
//! Every mutation of a KEL or TEL holds that log's lock across read-head,
//! validate and append, so each log has a single writer. Reads take no lock
//! and work on the snapshot they loaded.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError};

use bytes::Bytes;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use keri_kernel_core::tel_event::random_nonce;
use keri_kernel_core::{
    find_anchor, parse_stream, seal_for, serialize_stream, validate_credential,
    verify_signatures, ApplyOutcome, Credential, CredentialStatus, Ed25519PublicKey,
    IndexedSignature, KeyConfig, KeyEvent, KeyEventLog, KeyState, LogEvent, Prefix, Registry,
    RegistryId, RegistryState, Said, Seal, TelEvent, TransactionEventLog, ValidationError,
};
use keri_kernel_store::{
    Fork, InsertResult, LogId, LogKind, Store, StoreExt, StoredCredential, StoredEvent,
};

use crate::config::KernelConfig;
use crate::error::{KernelError, Result};

/// Outcome of importing an event stream.
///
/// Import applies events in stream order and stops at the first failure;
/// everything before it stays applied.
#[derive(Debug, Default)]
pub struct ImportReport {
    /// Events appended.
    pub accepted: usize,
    /// Events already present.
    pub duplicates: usize,
    /// 1-based stream position of the event that failed.
    pub failed_at: Option<usize>,
    pub error: Option<KernelError>,
    /// The stream ended inside an incomplete body.
    pub truncated: bool,
}

impl ImportReport {
    /// True if every complete body in the stream was applied.
    pub fn is_success(&self) -> bool {
        self.failed_at.is_none()
    }
}

/// The main Kernel struct.
///
/// Provides a unified API for:
/// - Creating identifiers and managing their key events
/// - Creating registries and issuing or revoking credentials
/// - Verifying anchors between logs
/// - Exporting and importing event streams
pub struct Kernel<S: Store> {
    /// The storage backend.
    store: Arc<S>,
    /// Configuration.
    config: KernelConfig,
    /// One writer lock per log, created on first use and dropped once no
    /// task holds or waits for it.
    locks: LockMap,
}

type LockMap = std::sync::Mutex<HashMap<LogId, Arc<Mutex<()>>>>;

/// Holds a log's writer lock; removes the map entry on release when no other
/// task shares it.
struct LogGuard<'k> {
    guard: Option<OwnedMutexGuard<()>>,
    log: LogId,
    locks: &'k LockMap,
}

impl Drop for LogGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&self.log)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.log);
        }
    }
}

/// Replayed logs shared by the events of one import, so each log is read
/// from the store once instead of once per event.
///
/// An entry is dropped whenever an event touching it fails, so a failed
/// append never leaves a cached log ahead of the store.
#[derive(Default)]
struct LogCache {
    kels: HashMap<Prefix, KeyEventLog>,
    tels: HashMap<RegistryId, TransactionEventLog>,
}

impl<S: Store> Kernel<S> {
    /// Create a new kernel instance.
    pub fn new(store: S, config: KernelConfig) -> Self {
        Self {
            store: Arc::new(store),
            config,
            locks: LockMap::default(),
        }
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    async fn lock(&self, log: &LogId) -> LogGuard<'_> {
        let lock = self
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(log.clone())
            .or_default()
            .clone();
        LogGuard {
            guard: Some(lock.lock_owned().await),
            log: log.clone(),
            locks: &self.locks,
        }
    }

    async fn cached_kel<'c>(
        &self,
        cache: &'c mut LogCache,
        prefix: &Prefix,
    ) -> Result<&'c mut KeyEventLog> {
        Ok(match cache.kels.entry(prefix.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(self.store.load_kel(prefix).await?),
        })
    }

    async fn cached_tel<'c>(
        &self,
        cache: &'c mut LogCache,
        registry: &RegistryId,
    ) -> Result<&'c mut TransactionEventLog> {
        Ok(match cache.tels.entry(registry.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(self.store.load_tel(registry).await?),
        })
    }

    /// Append a validated event, requiring the store head to still be `prior`.
    async fn append(&self, stored: StoredEvent, prior: Option<&Said>) -> Result<()> {
        match self.store.append_event(&stored, prior).await? {
            InsertResult::Inserted => {
                debug!(log = %stored.log, sn = stored.sn, said = %stored.said, "event appended");
                Ok(())
            }
            InsertResult::AlreadyExists => Ok(()),
            InsertResult::Conflict { existing } => {
                warn!(log = %stored.log, sn = stored.sn, existing = %existing, "append conflict");
                Err(KernelError::Conflict {
                    log: stored.log,
                    sn: stored.sn,
                    head: Some(existing),
                })
            }
            InsertResult::StaleHead { head, .. } => Err(KernelError::Conflict {
                log: stored.log,
                sn: stored.sn,
                head,
            }),
        }
    }

    /// Log a refused event and keep fork evidence.
    async fn note_rejection(&self, stored: &StoredEvent, error: &ValidationError) -> Result<()> {
        if error.is_fork() {
            warn!(log = %stored.log, sn = stored.sn, said = %stored.said, "fork detected");
            self.store.record_fork(stored).await?;
        } else if error.is_chain_break() {
            warn!(log = %stored.log, sn = stored.sn, said = %stored.said, error = %error, "chain discontinuity");
        }
        Ok(())
    }

    async fn load_kel(&self, prefix: &Prefix) -> Result<KeyEventLog> {
        let kel = self.store.load_kel(prefix).await?;
        if kel.is_empty() {
            return Err(KernelError::UnknownIdentifier(prefix.clone()));
        }
        Ok(kel)
    }

    async fn load_tel(&self, registry: &RegistryId) -> Result<TransactionEventLog> {
        let tel = self.store.load_tel(registry).await?;
        if tel.is_empty() {
            return Err(KernelError::RegistryNotFound(registry.clone()));
        }
        Ok(tel)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Identifier Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Create an identifier; its prefix is the SAID of the inception event.
    pub async fn create_identifier(&self, config: KeyConfig) -> Result<KeyEvent> {
        let event = KeyEventLog::new().incept(config)?;
        let prefix = event.prefix().clone();

        let _guard = self.lock(&LogId::kel(&prefix)).await;
        if !self.store.load_kel(&prefix).await?.is_empty() {
            return Err(ValidationError::AlreadyIncepted(prefix).into());
        }

        self.append(StoredEvent::from_key_event(&event)?, None).await?;
        info!(prefix = %prefix, "identifier created");
        Ok(event)
    }

    async fn mutate_kel<F>(&self, prefix: &Prefix, build: F) -> Result<KeyEvent>
    where
        F: FnOnce(&mut KeyEventLog) -> std::result::Result<KeyEvent, ValidationError>,
    {
        let _guard = self.lock(&LogId::kel(prefix)).await;
        let mut kel = self.load_kel(prefix).await?;
        let event = build(&mut kel)?;
        self.append(StoredEvent::from_key_event(&event)?, event.prior())
            .await?;
        Ok(event)
    }

    /// Rotate to `config`, revealing the keys committed by the last
    /// establishment event.
    pub async fn rotate(
        &self,
        prefix: &Prefix,
        config: KeyConfig,
        revealed: &[Ed25519PublicKey],
    ) -> Result<KeyEvent> {
        let event = self
            .mutate_kel(prefix, |kel| kel.rotate(config, revealed))
            .await?;
        info!(prefix = %prefix, sn = event.sn(), "keys rotated");
        Ok(event)
    }

    /// Append an interaction event carrying `seals`.
    pub async fn interact(&self, prefix: &Prefix, seals: Vec<Seal>) -> Result<KeyEvent> {
        self.mutate_kel(prefix, |kel| kel.interact(seals)).await
    }

    /// Apply an externally produced key event.
    ///
    /// When signatures are supplied (and checking is enabled) establishment
    /// events must be signed by their own keys and interactions by the
    /// current keys.
    pub async fn apply_key_event(
        &self,
        event: KeyEvent,
        signatures: Option<&[IndexedSignature]>,
    ) -> Result<ApplyOutcome> {
        self.apply_key_event_cached(&mut LogCache::default(), event, signatures)
            .await
    }

    async fn apply_key_event_cached(
        &self,
        cache: &mut LogCache,
        event: KeyEvent,
        signatures: Option<&[IndexedSignature]>,
    ) -> Result<ApplyOutcome> {
        let prefix = event.prefix().clone();
        let _guard = self.lock(&LogId::kel(&prefix)).await;
        let result = self
            .apply_key_event_to(cache, &prefix, event, signatures)
            .await;
        if result.is_err() {
            cache.kels.remove(&prefix);
        }
        result
    }

    async fn apply_key_event_to(
        &self,
        cache: &mut LogCache,
        prefix: &Prefix,
        event: KeyEvent,
        signatures: Option<&[IndexedSignature]>,
    ) -> Result<ApplyOutcome> {
        let kel = self.cached_kel(cache, prefix).await?;

        let outcome = match kel.check(&event) {
            Ok(outcome) => outcome,
            Err(e) => {
                if let Ok(stored) = StoredEvent::from_key_event(&event) {
                    self.note_rejection(&stored, &e).await?;
                }
                return Err(e.into());
            }
        };
        if outcome == ApplyOutcome::Duplicate {
            return Ok(outcome);
        }

        if let Some(signatures) = signatures.filter(|_| self.config.verify_signatures) {
            let (keys, threshold) = match (event.config(), kel.state()) {
                (Some(config), _) => (&config.keys, config.key_threshold),
                (None, Some(state)) => (&state.current_keys, state.key_threshold),
                (None, None) => return Err(KernelError::UnknownIdentifier(prefix.clone())),
            };
            verify_signatures(&event, signatures, keys, threshold)?;
        }

        let stored = StoredEvent::from_key_event(&event)?;
        let prior = event.prior().cloned();
        kel.apply(event)?;
        self.append(stored, prior.as_ref()).await?;
        Ok(ApplyOutcome::Appended)
    }

    /// Current key state of an identifier.
    pub async fn key_state(&self, prefix: &Prefix) -> Result<KeyState> {
        let kel = self.load_kel(prefix).await?;
        kel.state()
            .cloned()
            .ok_or_else(|| KernelError::UnknownIdentifier(prefix.clone()))
    }

    /// Every event of an identifier's KEL, in order.
    pub async fn kel(&self, prefix: &Prefix) -> Result<Vec<KeyEvent>> {
        Ok(self.load_kel(prefix).await?.events().to_vec())
    }

    /// All known identifiers.
    pub async fn identifiers(&self) -> Result<Vec<Prefix>> {
        Ok(self
            .store
            .list_logs(Some(LogKind::Kel))
            .await?
            .into_iter()
            .map(|log| log.id)
            .collect())
    }

    /// Fork evidence recorded for a log.
    pub async fn forks(&self, log: &LogId) -> Result<Vec<Fork>> {
        Ok(self.store.get_forks(log).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Registry Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a credential registry for `issuer` with a random nonce.
    ///
    /// A root registry is anchored in the issuer's KEL; a child registry is
    /// anchored in its parent's TEL by an issuance naming the child.
    pub async fn create_registry(
        &self,
        issuer: &Prefix,
        parent: Option<&RegistryId>,
    ) -> Result<TelEvent> {
        self.create_registry_with_nonce(issuer, parent, random_nonce())
            .await
    }

    /// Create a registry with a caller-chosen nonce.
    pub async fn create_registry_with_nonce(
        &self,
        issuer: &Prefix,
        parent: Option<&RegistryId>,
        nonce: String,
    ) -> Result<TelEvent> {
        self.load_kel(issuer).await?;

        let vcp = TransactionEventLog::new().incept(issuer.clone(), parent.cloned(), nonce)?;
        let registry = Registry {
            registry_id: vcp.registry_id().clone(),
            issuer: issuer.clone(),
            parent: parent.cloned(),
        };

        let _guard = self.lock(&LogId::tel(&registry.registry_id)).await;
        if !self.store.load_tel(&registry.registry_id).await?.is_empty() {
            return Err(ValidationError::AlreadyIncepted(registry.registry_id).into());
        }

        let seal = seal_for(&vcp)?;
        let anchor = match parent {
            Some(parent) => {
                let parent_registry = self.registry(parent).await?;
                if parent_registry.issuer != *issuer {
                    return Err(ValidationError::IssuerMismatch {
                        registry: registry.registry_id,
                        expected: parent_registry.issuer,
                        got: issuer.clone(),
                    }
                    .into());
                }
                let iss = self
                    .issue_with_seals(parent, registry.registry_id.clone(), Some(vec![seal]))
                    .await?;
                Some((LogId::tel(parent), iss.said().clone()))
            }
            None if self.config.anchor_tel_events => {
                let ixn = self.interact(issuer, vec![seal]).await?;
                Some((LogId::kel(issuer), ixn.said().clone()))
            }
            None => None,
        };

        let appended = self.append(StoredEvent::from_tel_event(&vcp)?, None).await;
        if let Err(e) = appended {
            warn_dangling_anchor(anchor.as_ref(), &registry.registry_id, &e);
            return Err(e);
        }
        self.store.put_registry(&registry).await?;
        info!(registry = %registry.registry_id, issuer = %issuer, "registry created");
        Ok(vcp)
    }

    async fn mutate_tel<F>(&self, registry: &RegistryId, build: F) -> Result<TelEvent>
    where
        F: FnOnce(&mut TransactionEventLog) -> std::result::Result<TelEvent, ValidationError>,
    {
        let _guard = self.lock(&LogId::tel(registry)).await;
        let mut tel = self.load_tel(registry).await?;
        let event = build(&mut tel)?;

        let anchor = if self.config.anchor_tel_events {
            let issuer = tel
                .registry()
                .map(|r| r.issuer.clone())
                .ok_or_else(|| KernelError::RegistryNotFound(registry.clone()))?;
            let ixn = self.interact(&issuer, vec![seal_for(&event)?]).await?;
            Some((LogId::kel(&issuer), ixn.said().clone()))
        } else {
            None
        };

        let appended = self
            .append(StoredEvent::from_tel_event(&event)?, event.prior())
            .await;
        if let Err(e) = appended {
            warn_dangling_anchor(anchor.as_ref(), registry, &e);
            return Err(e);
        }
        Ok(event)
    }

    async fn issue_with_seals(
        &self,
        registry: &RegistryId,
        credential: Said,
        seals: Option<Vec<Seal>>,
    ) -> Result<TelEvent> {
        self.mutate_tel(registry, |tel| tel.issue_with_seals(credential, seals))
            .await
    }

    /// Record issuance of a credential SAID in a registry.
    pub async fn issue(&self, registry: &RegistryId, credential: &Said) -> Result<TelEvent> {
        let event = self
            .issue_with_seals(registry, credential.clone(), None)
            .await?;
        info!(registry = %registry, credential = %credential, sn = event.sn(), "credential issued");
        Ok(event)
    }

    /// Record revocation of a previously issued credential.
    pub async fn revoke(&self, registry: &RegistryId, credential: &Said) -> Result<TelEvent> {
        let event = self
            .mutate_tel(registry, |tel| tel.revoke(credential.clone()))
            .await?;
        info!(registry = %registry, credential = %credential, sn = event.sn(), "credential revoked");
        Ok(event)
    }

    /// Status of a credential SAID in a registry, from a TEL scan.
    pub async fn status(
        &self,
        registry: &RegistryId,
        credential: &Said,
    ) -> Result<CredentialStatus> {
        Ok(self.load_tel(registry).await?.status(credential))
    }

    /// Apply an externally produced TEL event.
    ///
    /// The issuer's KEL must already be known. A child registry's inception
    /// additionally needs its parent TEL, which must be controlled by the
    /// same issuer and hold the issuance anchoring the child. Signatures are
    /// checked against the issuer's current keys.
    pub async fn apply_tel_event(
        &self,
        event: TelEvent,
        signatures: Option<&[IndexedSignature]>,
    ) -> Result<ApplyOutcome> {
        self.apply_tel_event_cached(&mut LogCache::default(), event, signatures)
            .await
    }

    async fn apply_tel_event_cached(
        &self,
        cache: &mut LogCache,
        event: TelEvent,
        signatures: Option<&[IndexedSignature]>,
    ) -> Result<ApplyOutcome> {
        let registry_id = event.registry_id().clone();
        let _guard = self.lock(&LogId::tel(&registry_id)).await;
        let result = self
            .apply_tel_event_to(cache, &registry_id, event, signatures)
            .await;
        if result.is_err() {
            cache.tels.remove(&registry_id);
        }
        result
    }

    async fn apply_tel_event_to(
        &self,
        cache: &mut LogCache,
        registry_id: &RegistryId,
        event: TelEvent,
        signatures: Option<&[IndexedSignature]>,
    ) -> Result<ApplyOutcome> {
        let tel = self.cached_tel(cache, registry_id).await?;

        let outcome = match tel.check(&event) {
            Ok(outcome) => outcome,
            Err(e) => {
                if let Ok(stored) = StoredEvent::from_tel_event(&event) {
                    self.note_rejection(&stored, &e).await?;
                }
                return Err(e.into());
            }
        };
        if outcome == ApplyOutcome::Duplicate {
            return Ok(outcome);
        }

        let registry = match &event {
            TelEvent::Inception(vcp) => Registry {
                registry_id: registry_id.clone(),
                issuer: vcp.issuer.clone(),
                parent: vcp.parent.clone(),
            },
            _ => tel
                .registry()
                .cloned()
                .ok_or_else(|| KernelError::RegistryNotFound(registry_id.clone()))?,
        };

        if let (TelEvent::Inception(_), Some(parent)) = (&event, &registry.parent) {
            let parent_tel = self.cached_tel(cache, parent).await?;
            let parent_issuer = parent_tel
                .registry()
                .map(|r| r.issuer.clone())
                .ok_or_else(|| KernelError::RegistryNotFound(parent.clone()))?;
            if parent_issuer != registry.issuer {
                return Err(ValidationError::IssuerMismatch {
                    registry: registry_id.clone(),
                    expected: parent_issuer,
                    got: registry.issuer.clone(),
                }
                .into());
            }
            if find_anchor(parent_tel.events(), &event).is_none() {
                warn!(registry = %registry_id, parent = %parent, "child registry not anchored in parent");
                return Err(ValidationError::UnanchoredRegistry {
                    registry: registry_id.clone(),
                    parent: parent.clone(),
                }
                .into());
            }
        }

        let kel = self.cached_kel(cache, &registry.issuer).await?;
        let state = kel
            .state()
            .ok_or_else(|| KernelError::UnknownIdentifier(registry.issuer.clone()))?;
        if let Some(signatures) = signatures.filter(|_| self.config.verify_signatures) {
            verify_signatures(&event, signatures, &state.current_keys, state.key_threshold)?;
        }

        let stored = StoredEvent::from_tel_event(&event)?;
        let prior = event.prior().cloned();
        let is_inception = matches!(event, TelEvent::Inception(_));
        self.cached_tel(cache, registry_id).await?.apply(event)?;
        self.append(stored, prior.as_ref()).await?;
        if is_inception {
            self.store.put_registry(&registry).await?;
        }
        Ok(ApplyOutcome::Appended)
    }

    /// A registry's identity record.
    pub async fn registry(&self, id: &RegistryId) -> Result<Registry> {
        self.store
            .get_registry(id)
            .await?
            .ok_or_else(|| KernelError::RegistryNotFound(id.clone()))
    }

    /// Registries, optionally only those of one issuer.
    pub async fn registries(&self, issuer: Option<&Prefix>) -> Result<Vec<Registry>> {
        Ok(self.store.list_registries(issuer).await?)
    }

    pub async fn registry_state(&self, id: &RegistryId) -> Result<RegistryState> {
        let tel = self.load_tel(id).await?;
        tel.state()
            .cloned()
            .ok_or_else(|| KernelError::RegistryNotFound(id.clone()))
    }

    /// Every event of a registry's TEL, in order.
    pub async fn tel(&self, id: &RegistryId) -> Result<Vec<TelEvent>> {
        Ok(self.load_tel(id).await?.events().to_vec())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Anchoring
    // ─────────────────────────────────────────────────────────────────────────

    /// True if some host event anchors `event`: the parent TEL for a child
    /// registry inception, the issuer KEL otherwise.
    pub async fn verify_tel_anchor(&self, event: &TelEvent) -> Result<bool> {
        if let TelEvent::Inception(vcp) = event {
            if let Some(parent) = &vcp.parent {
                let hosts = self.load_tel(parent).await?;
                return Ok(find_anchor(hosts.events(), event).is_some());
            }
        }

        let issuer = match event {
            TelEvent::Inception(vcp) => vcp.issuer.clone(),
            _ => self.registry(event.registry_id()).await?.issuer,
        };
        let hosts = self.load_kel(&issuer).await?;
        Ok(find_anchor(hosts.events(), event).is_some())
    }

    /// True if the registry's inception is anchored.
    pub async fn verify_registry_anchor(&self, id: &RegistryId) -> Result<bool> {
        let tel = self.load_tel(id).await?;
        let vcp = tel
            .event_at(0)
            .ok_or_else(|| KernelError::RegistryNotFound(id.clone()))?;
        self.verify_tel_anchor(vcp).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Credential Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Verify, store and issue a credential in the registry it names.
    pub async fn issue_credential(&self, credential: &Credential) -> Result<TelEvent> {
        validate_credential(credential)?;
        let registry_id = credential.registry.as_ref().ok_or_else(|| {
            KernelError::InvalidOperation(format!(
                "credential {} names no registry",
                credential.said
            ))
        })?;
        let registry = self.registry(registry_id).await?;
        if registry.issuer != credential.issuer {
            return Err(KernelError::InvalidOperation(format!(
                "credential issuer {} does not control registry {}",
                credential.issuer, registry_id
            )));
        }

        self.store
            .put_credential(&StoredCredential::from_credential(credential)?)
            .await?;
        self.issue(registry_id, &credential.said).await
    }

    /// Revoke a stored credential in its registry.
    pub async fn revoke_credential(&self, said: &Said) -> Result<TelEvent> {
        let credential = self.credential(said).await?;
        let registry = credential
            .registry
            .ok_or_else(|| KernelError::InvalidOperation(format!("credential {} names no registry", said)))?;
        self.revoke(&registry, said).await
    }

    /// A stored credential.
    pub async fn credential(&self, said: &Said) -> Result<Credential> {
        let stored = self
            .store
            .get_credential(said)
            .await?
            .ok_or_else(|| KernelError::CredentialNotFound(said.clone()))?;
        Ok(stored.to_credential()?)
    }

    /// Status of a stored credential in its own registry.
    pub async fn credential_status(&self, said: &Said) -> Result<CredentialStatus> {
        match self.credential(said).await?.registry {
            Some(registry) => self.status(&registry, said).await,
            None => Ok(CredentialStatus::Unknown),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Stream Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// An identifier's KEL as a stream.
    pub async fn export_kel(&self, prefix: &Prefix) -> Result<Bytes> {
        let kel = self.load_kel(prefix).await?;
        let bodies: Vec<_> = kel.events().iter().map(KeyEvent::to_value).collect();
        Ok(serialize_stream(&bodies)?)
    }

    /// A registry's TEL as a stream.
    pub async fn export_tel(&self, id: &RegistryId) -> Result<Bytes> {
        let tel = self.load_tel(id).await?;
        let bodies: Vec<_> = tel.events().iter().map(TelEvent::to_value).collect();
        Ok(serialize_stream(&bodies)?)
    }

    /// Everything needed to verify a registry elsewhere: the issuer's KEL,
    /// then each ancestor TEL from the root down, then the registry's TEL.
    pub async fn export_registry(&self, id: &RegistryId) -> Result<Bytes> {
        let mut chain = vec![self.registry(id).await?];
        while let Some(parent) = chain.last().and_then(|r| r.parent.clone()) {
            if chain.iter().any(|r| r.registry_id == parent) {
                return Err(KernelError::InvalidOperation(format!(
                    "registry {} has a cyclic parent chain",
                    id
                )));
            }
            chain.push(self.registry(&parent).await?);
        }
        chain.reverse();

        let issuer = &chain[0].issuer;
        let mut bodies: Vec<_> = self
            .load_kel(issuer)
            .await?
            .events()
            .iter()
            .map(KeyEvent::to_value)
            .collect();
        for registry in &chain {
            let tel = self.load_tel(&registry.registry_id).await?;
            bodies.extend(tel.events().iter().map(TelEvent::to_value));
        }
        Ok(serialize_stream(&bodies)?)
    }

    /// Import a stream (or JSON array) of KEL and TEL events.
    ///
    /// Streams larger than the configured limit are rejected before anything
    /// is applied. Each log is read from the store once per import; a
    /// concurrent writer to the same log makes the next append fail with
    /// [`KernelError::Conflict`].
    pub async fn import(&self, input: &[u8]) -> Result<ImportReport> {
        let parsed = parse_stream(input);
        let total = parsed.bodies.len();
        if total > self.config.max_import_events {
            return Err(KernelError::MalformedInput(format!(
                "import of {} events exceeds the limit of {}",
                total, self.config.max_import_events
            )));
        }

        let mut report = ImportReport {
            truncated: parsed.trailing_incomplete,
            ..ImportReport::default()
        };

        let mut cache = LogCache::default();
        for (i, body) in parsed.bodies.into_iter().enumerate() {
            let position = i + 1;
            let result = match LogEvent::from_value(body) {
                Ok(LogEvent::Key(event)) => {
                    self.apply_key_event_cached(&mut cache, event, None).await
                }
                Ok(LogEvent::Transaction(event)) => {
                    self.apply_tel_event_cached(&mut cache, event, None).await
                }
                Err(e) => Err(e.into()),
            };
            match result {
                Ok(ApplyOutcome::Appended) => report.accepted += 1,
                Ok(ApplyOutcome::Duplicate) => report.duplicates += 1,
                Err(error) => {
                    warn!(position, error = %error, "import stopped");
                    report.failed_at = Some(position);
                    report.error = Some(error);
                    break;
                }
            }
        }

        if report.failed_at.is_none() {
            if let Some(malformed) = parsed.malformed {
                warn!(offset = malformed.offset, "import stopped at malformed body");
                report.failed_at = Some(total + 1);
                report.error = Some(KernelError::MalformedInput(format!(
                    "body at byte {}: {}",
                    malformed.offset, malformed.reason
                )));
            }
        }

        info!(
            accepted = report.accepted,
            duplicates = report.duplicates,
            failed_at = ?report.failed_at,
            truncated = report.truncated,
            "import finished"
        );
        Ok(report)
    }
}

/// The anchor of a TEL event is written first; if the TEL append then fails
/// the anchor stays in its host log without a matching event.
fn warn_dangling_anchor(
    anchor: Option<&(LogId, Said)>,
    registry: &RegistryId,
    error: &KernelError,
) {
    if let Some((host, said)) = anchor {
        warn!(
            registry = %registry,
            host = %host,
            anchor = %said,
            error = %error,
            "TEL append failed after its anchor was written; anchor left in place"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use keri_kernel_core::{next_key_digest, Blake3Hash, Keypair};
    use keri_kernel_store::{MemoryStore, StoredCredential};

    fn key(n: u8) -> Ed25519PublicKey {
        Keypair::from_seed(&[n; 32]).public_key()
    }

    fn said(tag: &str) -> Said {
        Said::from_digest(&Blake3Hash::hash(tag.as_bytes()))
    }

    fn kernel() -> Kernel<MemoryStore> {
        Kernel::new(MemoryStore::new(), KernelConfig::default())
    }

    fn lock_entries<S: Store>(kernel: &Kernel<S>) -> usize {
        kernel.locks.lock().unwrap().len()
    }

    /// Memory store that counts full-log reads and can refuse TEL appends.
    #[derive(Default)]
    struct InstrumentedStore {
        inner: MemoryStore,
        reads: std::sync::Mutex<HashMap<LogId, usize>>,
        refuse_tel: AtomicBool,
    }

    impl InstrumentedStore {
        fn reads(&self, log: &LogId) -> usize {
            self.reads.lock().unwrap().get(log).copied().unwrap_or(0)
        }

        fn refuse_tel_appends(&self) {
            self.refuse_tel.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Store for InstrumentedStore {
        async fn append_event(
            &self,
            event: &StoredEvent,
            expected_prior: Option<&Said>,
        ) -> keri_kernel_store::Result<InsertResult> {
            if event.log.kind == LogKind::Tel && self.refuse_tel.load(Ordering::SeqCst) {
                return Ok(InsertResult::StaleHead {
                    next_sn: event.sn,
                    head: None,
                });
            }
            self.inner.append_event(event, expected_prior).await
        }

        async fn get_event(&self, said: &Said) -> keri_kernel_store::Result<Option<StoredEvent>> {
            self.inner.get_event(said).await
        }

        async fn get_event_at(
            &self,
            log: &LogId,
            sn: u64,
        ) -> keri_kernel_store::Result<Option<StoredEvent>> {
            self.inner.get_event_at(log, sn).await
        }

        async fn get_log(&self, log: &LogId) -> keri_kernel_store::Result<Vec<StoredEvent>> {
            *self.reads.lock().unwrap().entry(log.clone()).or_default() += 1;
            self.inner.get_log(log).await
        }

        async fn get_log_head(&self, log: &LogId) -> keri_kernel_store::Result<Option<StoredEvent>> {
            self.inner.get_log_head(log).await
        }

        async fn list_logs(&self, kind: Option<LogKind>) -> keri_kernel_store::Result<Vec<LogId>> {
            self.inner.list_logs(kind).await
        }

        async fn record_fork(&self, event: &StoredEvent) -> keri_kernel_store::Result<()> {
            self.inner.record_fork(event).await
        }

        async fn get_forks(&self, log: &LogId) -> keri_kernel_store::Result<Vec<Fork>> {
            self.inner.get_forks(log).await
        }

        async fn put_registry(&self, registry: &Registry) -> keri_kernel_store::Result<()> {
            self.inner.put_registry(registry).await
        }

        async fn get_registry(&self, id: &RegistryId) -> keri_kernel_store::Result<Option<Registry>> {
            self.inner.get_registry(id).await
        }

        async fn list_registries(
            &self,
            issuer: Option<&Prefix>,
        ) -> keri_kernel_store::Result<Vec<Registry>> {
            self.inner.list_registries(issuer).await
        }

        async fn put_credential(&self, credential: &StoredCredential) -> keri_kernel_store::Result<()> {
            self.inner.put_credential(credential).await
        }

        async fn get_credential(
            &self,
            said: &Said,
        ) -> keri_kernel_store::Result<Option<StoredCredential>> {
            self.inner.get_credential(said).await
        }
    }

    async fn identifier<S: Store>(kernel: &Kernel<S>) -> Prefix {
        kernel
            .create_identifier(KeyConfig::new(vec![key(0)], vec![next_key_digest(&key(1))]))
            .await
            .unwrap()
            .prefix()
            .clone()
    }

    #[tokio::test]
    async fn test_create_identifier_twice_rejected() {
        let kernel = kernel();
        let config = KeyConfig::new(vec![key(0)], vec![next_key_digest(&key(1))]);
        kernel.create_identifier(config.clone()).await.unwrap();
        let err = kernel.create_identifier(config).await.unwrap_err();
        assert!(matches!(
            err.validation(),
            Some(ValidationError::AlreadyIncepted(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_identifier() {
        let kernel = kernel();
        let prefix = said("nobody");
        assert!(matches!(
            kernel.key_state(&prefix).await,
            Err(KernelError::UnknownIdentifier(_))
        ));
        assert!(matches!(
            kernel.interact(&prefix, vec![]).await,
            Err(KernelError::UnknownIdentifier(_))
        ));
    }

    #[tokio::test]
    async fn test_registry_anchored_in_kel() {
        let kernel = kernel();
        let aid = identifier(&kernel).await;
        let vcp = kernel.create_registry(&aid, None).await.unwrap();

        let kel = kernel.kel(&aid).await.unwrap();
        assert_eq!(kel.len(), 2);
        assert_eq!(kel[1].seals()[0].anchored_id, *vcp.registry_id());
        assert!(kernel.verify_registry_anchor(vcp.registry_id()).await.unwrap());
    }

    #[tokio::test]
    async fn test_anchoring_disabled() {
        let config = KernelConfig {
            anchor_tel_events: false,
            ..KernelConfig::default()
        };
        let kernel = Kernel::new(MemoryStore::new(), config);
        let aid = identifier(&kernel).await;
        let vcp = kernel.create_registry(&aid, None).await.unwrap();
        kernel
            .issue(vcp.registry_id(), &said("c"))
            .await
            .unwrap();

        assert_eq!(kernel.kel(&aid).await.unwrap().len(), 1);
        assert!(!kernel.verify_registry_anchor(vcp.registry_id()).await.unwrap());
    }

    #[tokio::test]
    async fn test_import_limit() {
        let config = KernelConfig {
            max_import_events: 1,
            ..KernelConfig::default()
        };
        let source = kernel();
        let aid = identifier(&source).await;
        source.interact(&aid, vec![]).await.unwrap();
        let stream = source.export_kel(&aid).await.unwrap();

        let target = Kernel::new(MemoryStore::new(), config);
        assert!(matches!(
            target.import(&stream).await,
            Err(KernelError::MalformedInput(_))
        ));
        assert!(target.identifiers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_import_reads_each_log_once() {
        let source = kernel();
        let aid = identifier(&source).await;
        let vcp = source.create_registry(&aid, None).await.unwrap();
        for tag in ["a", "b", "c"] {
            source.issue(vcp.registry_id(), &said(tag)).await.unwrap();
        }
        source.interact(&aid, vec![]).await.unwrap();
        let stream = source.export_registry(vcp.registry_id()).await.unwrap();

        let target = Kernel::new(InstrumentedStore::default(), KernelConfig::default());
        let report = target.import(&stream).await.unwrap();
        assert!(report.is_success());
        // icp, vcp anchor, three issuance anchors, ixn; then vcp and three iss.
        assert_eq!(report.accepted, 10);
        assert_eq!(target.store().reads(&LogId::kel(&aid)), 1);
        assert_eq!(target.store().reads(&LogId::tel(vcp.registry_id())), 1);

        assert_eq!(
            target.registry_state(vcp.registry_id()).await.unwrap(),
            source.registry_state(vcp.registry_id()).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_failed_tel_append_leaves_anchor() {
        let kernel = Kernel::new(InstrumentedStore::default(), KernelConfig::default());
        let aid = identifier(&kernel).await;
        let vcp = kernel.create_registry(&aid, None).await.unwrap();

        kernel.store().refuse_tel_appends();
        let err = kernel
            .issue(vcp.registry_id(), &said("lost"))
            .await
            .unwrap_err();
        assert!(matches!(err, KernelError::Conflict { .. }));

        // The interaction sealing the issuance stays; the TEL does not move.
        let kel = kernel.kel(&aid).await.unwrap();
        assert_eq!(kel.len(), 3);
        let seal = &kel[2].seals()[0];
        assert_eq!(seal.anchored_id, *vcp.registry_id());
        assert_eq!(seal.anchored_sn, 1);
        assert_eq!(kernel.tel(vcp.registry_id()).await.unwrap().len(), 1);
        assert_eq!(lock_entries(&kernel), 0);
    }

    #[tokio::test]
    async fn test_lock_entries_pruned() {
        let kernel = kernel();
        let aid = identifier(&kernel).await;
        let vcp = kernel.create_registry(&aid, None).await.unwrap();
        kernel.issue(vcp.registry_id(), &said("c")).await.unwrap();
        assert!(kernel.interact(&said("nobody"), vec![]).await.is_err());
        assert_eq!(lock_entries(&kernel), 0);

        let (a, b, c) = tokio::join!(
            kernel.interact(&aid, vec![]),
            kernel.interact(&aid, vec![]),
            kernel.interact(&aid, vec![]),
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(kernel.kel(&aid).await.unwrap().len(), 6);
        assert_eq!(lock_entries(&kernel), 0);
    }
}
