//! Transaction Event Log: the issuance history of one credential registry.
//!
//! Chaining follows the same discipline as the KEL (sn + 1, `p` = head SAID,
//! duplicate vs fork at an occupied sn). Credential status is never stored:
//! it is recomputed by scanning the log for the latest event that names the
//! credential.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ValidationError;
use crate::kel::ApplyOutcome;
use crate::seal::Seal;
use crate::tel_event::{IssuanceEvent, RegistryInceptionEvent, RevocationEvent, TelEvent};
use crate::types::{Prefix, RegistryId, Said};
use crate::validation::validate_tel_event;

/// A credential registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registry {
    pub registry_id: RegistryId,
    pub issuer: Prefix,
    pub parent: Option<RegistryId>,
}

/// Registry plus the head of its log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryState {
    pub registry: Registry,
    pub sn: u64,
    pub last_digest: Said,
}

/// Status of a credential in a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialStatus {
    Issued,
    Revoked,
    Unknown,
}

/// An in-memory Transaction Event Log.
#[derive(Debug, Clone, Default)]
pub struct TransactionEventLog {
    events: Vec<TelEvent>,
    state: Option<RegistryState>,
}

impl TransactionEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a log by applying events in order.
    pub fn replay<I>(events: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = TelEvent>,
    {
        let mut log = Self::new();
        for event in events {
            log.apply(event)?;
        }
        Ok(log)
    }

    pub fn state(&self) -> Option<&RegistryState> {
        self.state.as_ref()
    }

    pub fn registry(&self) -> Option<&Registry> {
        self.state.as_ref().map(|s| &s.registry)
    }

    pub fn events(&self) -> &[TelEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn event_at(&self, sn: u64) -> Option<&TelEvent> {
        usize::try_from(sn).ok().and_then(|i| self.events.get(i))
    }

    /// Create the registry inception.
    pub fn incept(
        &mut self,
        issuer: Prefix,
        parent: Option<RegistryId>,
        nonce: String,
    ) -> Result<TelEvent, ValidationError> {
        if let Some(state) = &self.state {
            return Err(ValidationError::AlreadyIncepted(
                state.registry.registry_id.clone(),
            ));
        }
        let event = TelEvent::Inception(RegistryInceptionEvent::build(issuer, parent, nonce)?);
        self.apply(event.clone())?;
        Ok(event)
    }

    /// Issue a credential at the next sn.
    pub fn issue(&mut self, credential: Said) -> Result<TelEvent, ValidationError> {
        self.issue_with_seals(credential, None)
    }

    /// Issue with a seal list (used to anchor a child registry).
    pub fn issue_with_seals(
        &mut self,
        credential: Said,
        seals: Option<Vec<Seal>>,
    ) -> Result<TelEvent, ValidationError> {
        let state = self.state.as_ref().ok_or(ValidationError::NotIncepted)?;
        let event = TelEvent::Issuance(IssuanceEvent::build(
            credential,
            state.registry.registry_id.clone(),
            state.sn + 1,
            state.last_digest.clone(),
            seals,
        )?);
        self.apply(event.clone())?;
        Ok(event)
    }

    /// Revoke a previously issued credential.
    pub fn revoke(&mut self, credential: Said) -> Result<TelEvent, ValidationError> {
        let state = self.state.as_ref().ok_or(ValidationError::NotIncepted)?;
        let event = TelEvent::Revocation(RevocationEvent::build(
            credential,
            state.registry.registry_id.clone(),
            state.sn + 1,
            state.last_digest.clone(),
            None,
        )?);
        self.apply(event.clone())?;
        Ok(event)
    }

    /// Status of a credential from the latest event naming it.
    pub fn status(&self, credential: &Said) -> CredentialStatus {
        status_in(&self.events, credential)
    }

    /// Validate an event against the current head without applying it.
    pub fn check(&self, event: &TelEvent) -> Result<ApplyOutcome, ValidationError> {
        validate_tel_event(event)?;

        let state = match &self.state {
            None => {
                return match event {
                    TelEvent::Inception(_) => Ok(ApplyOutcome::Appended),
                    _ => Err(ValidationError::ChainDiscontinuity {
                        log: event.registry_id().clone(),
                        expected_sn: 0,
                        got_sn: event.sn(),
                        expected_prior: None,
                        got_prior: event.prior().cloned(),
                    }),
                };
            }
            Some(state) => state,
        };

        let registry_id = &state.registry.registry_id;
        if event.registry_id() != registry_id {
            return Err(ValidationError::WrongLog {
                expected: registry_id.clone(),
                got: event.registry_id().clone(),
            });
        }

        let sn = event.sn();
        if sn <= state.sn {
            let existing = self
                .event_at(sn)
                .ok_or_else(|| ValidationError::StructuralError(format!("no event at sn {sn}")))?;
            if existing.said() == event.said() {
                return Ok(ApplyOutcome::Duplicate);
            }
            return Err(ValidationError::ForkDetected {
                log: registry_id.clone(),
                sn,
                existing: existing.said().clone(),
                incoming: event.said().clone(),
            });
        }

        if sn != state.sn + 1 || event.prior() != Some(&state.last_digest) {
            return Err(ValidationError::ChainDiscontinuity {
                log: registry_id.clone(),
                expected_sn: state.sn + 1,
                got_sn: sn,
                expected_prior: Some(state.last_digest.clone()),
                got_prior: event.prior().cloned(),
            });
        }

        match event {
            TelEvent::Issuance(iss) => match self.status(&iss.credential) {
                CredentialStatus::Unknown => {}
                CredentialStatus::Issued => {
                    return Err(ValidationError::AlreadyIssued {
                        registry: registry_id.clone(),
                        credential: iss.credential.clone(),
                    })
                }
                CredentialStatus::Revoked => {
                    return Err(ValidationError::AlreadyRevoked {
                        registry: registry_id.clone(),
                        credential: iss.credential.clone(),
                    })
                }
            },
            TelEvent::Revocation(rev) => match self.status(&rev.credential) {
                CredentialStatus::Issued => {}
                CredentialStatus::Unknown => {
                    return Err(ValidationError::UnknownCredential {
                        registry: registry_id.clone(),
                        credential: rev.credential.clone(),
                    })
                }
                CredentialStatus::Revoked => {
                    return Err(ValidationError::AlreadyRevoked {
                        registry: registry_id.clone(),
                        credential: rev.credential.clone(),
                    })
                }
            },
            TelEvent::Inception(_) => {}
        }

        Ok(ApplyOutcome::Appended)
    }

    /// Validate and commit an event.
    pub fn apply(&mut self, event: TelEvent) -> Result<ApplyOutcome, ValidationError> {
        let outcome = self.check(&event)?;
        if outcome == ApplyOutcome::Duplicate {
            debug!(said = %event.said(), sn = event.sn(), "duplicate transaction event ignored");
            return Ok(outcome);
        }

        if let TelEvent::Inception(vcp) = &event {
            self.state = Some(RegistryState {
                registry: Registry {
                    registry_id: vcp.registry_id.clone(),
                    issuer: vcp.issuer.clone(),
                    parent: vcp.parent.clone(),
                },
                sn: 0,
                last_digest: vcp.said.clone(),
            });
        } else {
            let state = self.state.as_mut().ok_or(ValidationError::NotIncepted)?;
            state.sn = event.sn();
            state.last_digest = event.said().clone();
        }

        self.events.push(event);
        Ok(ApplyOutcome::Appended)
    }
}

/// Status of a credential in a slice of transaction events (reverse scan).
pub fn status_in(events: &[TelEvent], credential: &Said) -> CredentialStatus {
    events
        .iter()
        .rev()
        .find_map(|event| match event {
            TelEvent::Issuance(e) if &e.credential == credential => Some(CredentialStatus::Issued),
            TelEvent::Revocation(e) if &e.credential == credential => {
                Some(CredentialStatus::Revoked)
            }
            _ => None,
        })
        .unwrap_or(CredentialStatus::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Blake3Hash;
    use crate::tel_event::random_nonce;

    fn said(tag: &[u8]) -> Said {
        Said::from_digest(&Blake3Hash::hash(tag))
    }

    fn registry() -> (TransactionEventLog, TelEvent) {
        let mut tel = TransactionEventLog::new();
        let vcp = tel.incept(said(b"issuer"), None, random_nonce()).unwrap();
        (tel, vcp)
    }

    #[test]
    fn test_issue_then_revoke() {
        let (mut tel, vcp) = registry();
        let credential = said(b"C");
        assert_eq!(tel.status(&credential), CredentialStatus::Unknown);

        let iss = tel.issue(credential.clone()).unwrap();
        assert_eq!(iss.sn(), 1);
        assert_eq!(iss.prior(), Some(vcp.said()));
        assert_eq!(tel.status(&credential), CredentialStatus::Issued);

        let rev = tel.revoke(credential.clone()).unwrap();
        assert_eq!(rev.sn(), 2);
        assert_eq!(rev.prior(), Some(iss.said()));
        assert_eq!(tel.status(&credential), CredentialStatus::Revoked);
    }

    #[test]
    fn test_revoke_unissued() {
        let (mut tel, _) = registry();
        let err = tel.revoke(said(b"never")).unwrap_err();
        assert!(matches!(err, ValidationError::UnknownCredential { .. }));
        assert_eq!(tel.len(), 1);
    }

    #[test]
    fn test_double_issue_and_double_revoke() {
        let (mut tel, _) = registry();
        let credential = said(b"C");
        tel.issue(credential.clone()).unwrap();
        assert!(matches!(
            tel.issue(credential.clone()).unwrap_err(),
            ValidationError::AlreadyIssued { .. }
        ));
        tel.revoke(credential.clone()).unwrap();
        assert!(matches!(
            tel.revoke(credential.clone()).unwrap_err(),
            ValidationError::AlreadyRevoked { .. }
        ));
        assert!(matches!(
            tel.issue(credential).unwrap_err(),
            ValidationError::AlreadyRevoked { .. }
        ));
    }

    #[test]
    fn test_status_is_per_credential() {
        let (mut tel, _) = registry();
        tel.issue(said(b"A")).unwrap();
        tel.issue(said(b"B")).unwrap();
        tel.revoke(said(b"A")).unwrap();
        assert_eq!(tel.status(&said(b"A")), CredentialStatus::Revoked);
        assert_eq!(tel.status(&said(b"B")), CredentialStatus::Issued);
    }

    #[test]
    fn test_replay_and_duplicates() {
        let (mut tel, vcp) = registry();
        let iss = tel.issue(said(b"A")).unwrap();
        tel.revoke(said(b"A")).unwrap();

        let mut replayed = TransactionEventLog::replay(tel.events().to_vec()).unwrap();
        assert_eq!(replayed.state(), tel.state());
        assert_eq!(replayed.apply(vcp).unwrap(), ApplyOutcome::Duplicate);
        assert_eq!(replayed.apply(iss).unwrap(), ApplyOutcome::Duplicate);
    }

    #[test]
    fn test_fork_and_gap() {
        let (mut tel, vcp) = registry();
        let mut rival = TransactionEventLog::replay([vcp]).unwrap();
        tel.issue(said(b"A")).unwrap();
        let other = rival.issue(said(b"B")).unwrap();
        assert!(tel.apply(other).unwrap_err().is_fork());

        let later = rival.issue(said(b"C")).unwrap();
        // sn 2 but chained to rival's sn 1
        assert!(matches!(
            tel.apply(later).unwrap_err(),
            ValidationError::ChainDiscontinuity { .. }
        ));
    }

    #[test]
    fn test_events_of_other_registry_rejected() {
        let (mut tel, _) = registry();
        let (mut other, _) = registry();
        let iss = other.issue(said(b"A")).unwrap();
        assert!(matches!(
            tel.apply(iss).unwrap_err(),
            ValidationError::WrongLog { .. }
        ));
    }
}
