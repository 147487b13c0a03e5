//! Key Event Log: the hash-chained history of one identifier.
//!
//! The log is a state machine with two states: uninitialized (no events) and
//! active (a [`KeyState`] plus the head sn and digest). Every event, local or
//! received, goes through [`KeyEventLog::apply`]:
//!
//! 1. The event is structurally valid and its SAID verifies
//! 2. Its sn extends the head by exactly one and `p` is the head's SAID
//! 3. A rotation reveals keys whose digests were committed by the prior
//!    establishment event
//!
//! An event at an already-occupied sn is a duplicate if its SAID matches the
//! stored one, and a fork otherwise. Forks are surfaced, never resolved.

use tracing::debug;

use crate::crypto::Ed25519PublicKey;
use crate::error::ValidationError;
use crate::event::{InceptionEvent, InteractionEvent, KeyConfig, KeyEvent, RotationEvent};
use crate::keys::next_key_digests;
use crate::seal::Seal;
use crate::types::{Prefix, Said};
use crate::validation::validate_key_event;

/// Key state of an active identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyState {
    pub prefix: Prefix,
    /// Sequence number of the head event.
    pub sn: u64,
    /// SAID of the head event.
    pub last_digest: Said,
    /// Sequence number of the last inception or rotation.
    pub last_establishment_sn: u64,
    pub current_keys: Vec<Ed25519PublicKey>,
    pub key_threshold: u64,
    pub next_key_digests: Vec<Said>,
    pub next_threshold: u64,
}

impl KeyState {
    /// An identifier with no next-key commitment can never rotate.
    pub fn is_transferable(&self) -> bool {
        !self.next_key_digests.is_empty()
    }

    fn establish(&mut self, config: &KeyConfig) {
        self.current_keys = config.keys.clone();
        self.key_threshold = config.key_threshold;
        self.next_key_digests = config.next_key_digests.clone();
        self.next_threshold = config.next_threshold;
        self.last_establishment_sn = self.sn;
    }
}

/// Result of applying an event to a log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The event extended the head.
    Appended,
    /// The event was already in the log (same sn, same SAID).
    Duplicate,
}

/// An in-memory Key Event Log.
#[derive(Debug, Clone, Default)]
pub struct KeyEventLog {
    events: Vec<KeyEvent>,
    state: Option<KeyState>,
}

impl KeyEventLog {
    /// An uninitialized log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a log by applying events in order.
    pub fn replay<I>(events: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = KeyEvent>,
    {
        let mut log = Self::new();
        for event in events {
            log.apply(event)?;
        }
        Ok(log)
    }

    /// Current key state, `None` while uninitialized.
    pub fn state(&self) -> Option<&KeyState> {
        self.state.as_ref()
    }

    pub fn prefix(&self) -> Option<&Prefix> {
        self.state.as_ref().map(|s| &s.prefix)
    }

    pub fn events(&self) -> &[KeyEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn head(&self) -> Option<&KeyEvent> {
        self.events.last()
    }

    pub fn event_at(&self, sn: u64) -> Option<&KeyEvent> {
        usize::try_from(sn).ok().and_then(|i| self.events.get(i))
    }

    /// Create the inception event; only valid while uninitialized.
    pub fn incept(&mut self, config: KeyConfig) -> Result<KeyEvent, ValidationError> {
        if let Some(state) = &self.state {
            return Err(ValidationError::AlreadyIncepted(state.prefix.clone()));
        }
        let event = KeyEvent::Inception(InceptionEvent::build(config, Vec::new())?);
        self.apply(event.clone())?;
        Ok(event)
    }

    /// Create a rotation revealing the pre-committed next keys.
    ///
    /// `revealed` must hash, in order, to the committed next-key digests and
    /// every revealed key must be part of the new current keys.
    pub fn rotate(
        &mut self,
        config: KeyConfig,
        revealed: &[Ed25519PublicKey],
    ) -> Result<KeyEvent, ValidationError> {
        let state = self.state.as_ref().ok_or(ValidationError::NotIncepted)?;
        if !state.is_transferable() {
            return Err(ValidationError::NonTransferable(state.prefix.clone()));
        }

        let revealed_digests = next_key_digests(revealed);
        if revealed_digests != state.next_key_digests
            || revealed.iter().any(|k| !config.keys.contains(k))
        {
            return Err(ValidationError::KeyCommitmentViolation {
                committed: state.next_key_digests.clone(),
                revealed: revealed_digests,
            });
        }

        let event = KeyEvent::Rotation(RotationEvent::build(
            state.prefix.clone(),
            state.sn + 1,
            state.last_digest.clone(),
            config,
            Vec::new(),
        )?);
        self.apply(event.clone())?;
        Ok(event)
    }

    /// Create an interaction carrying `seals`.
    pub fn interact(&mut self, seals: Vec<Seal>) -> Result<KeyEvent, ValidationError> {
        let state = self.state.as_ref().ok_or(ValidationError::NotIncepted)?;
        let event = KeyEvent::Interaction(InteractionEvent::build(
            state.prefix.clone(),
            state.sn + 1,
            state.last_digest.clone(),
            seals,
        )?);
        self.apply(event.clone())?;
        Ok(event)
    }

    /// Validate an event against the current head without applying it.
    pub fn check(&self, event: &KeyEvent) -> Result<ApplyOutcome, ValidationError> {
        validate_key_event(event)?;

        let state = match &self.state {
            None => {
                return match event {
                    KeyEvent::Inception(_) => Ok(ApplyOutcome::Appended),
                    _ => Err(ValidationError::ChainDiscontinuity {
                        log: event.prefix().clone(),
                        expected_sn: 0,
                        got_sn: event.sn(),
                        expected_prior: None,
                        got_prior: event.prior().cloned(),
                    }),
                };
            }
            Some(state) => state,
        };

        if event.prefix() != &state.prefix {
            return Err(ValidationError::WrongLog {
                expected: state.prefix.clone(),
                got: event.prefix().clone(),
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
                log: state.prefix.clone(),
                sn,
                existing: existing.said().clone(),
                incoming: event.said().clone(),
            });
        }

        if sn != state.sn + 1 || event.prior() != Some(&state.last_digest) {
            return Err(ValidationError::ChainDiscontinuity {
                log: state.prefix.clone(),
                expected_sn: state.sn + 1,
                got_sn: sn,
                expected_prior: Some(state.last_digest.clone()),
                got_prior: event.prior().cloned(),
            });
        }

        if let KeyEvent::Rotation(rot) = event {
            if !state.is_transferable() {
                return Err(ValidationError::NonTransferable(state.prefix.clone()));
            }
            let revealed = next_key_digests(&rot.config.keys);
            if !state.next_key_digests.iter().all(|d| revealed.contains(d)) {
                return Err(ValidationError::KeyCommitmentViolation {
                    committed: state.next_key_digests.clone(),
                    revealed,
                });
            }
        }

        Ok(ApplyOutcome::Appended)
    }

    /// Validate and commit an event.
    pub fn apply(&mut self, event: KeyEvent) -> Result<ApplyOutcome, ValidationError> {
        let outcome = self.check(&event)?;
        if outcome == ApplyOutcome::Duplicate {
            debug!(said = %event.said(), sn = event.sn(), "duplicate key event ignored");
            return Ok(outcome);
        }

        if let KeyEvent::Inception(icp) = &event {
            self.state = Some(KeyState {
                prefix: icp.prefix.clone(),
                sn: 0,
                last_digest: icp.said.clone(),
                last_establishment_sn: 0,
                current_keys: icp.config.keys.clone(),
                key_threshold: icp.config.key_threshold,
                next_key_digests: icp.config.next_key_digests.clone(),
                next_threshold: icp.config.next_threshold,
            });
        } else {
            let state = self.state.as_mut().ok_or(ValidationError::NotIncepted)?;
            state.sn = event.sn();
            state.last_digest = event.said().clone();
            if let KeyEvent::Rotation(rot) = &event {
                state.establish(&rot.config);
            }
        }

        self.events.push(event);
        Ok(ApplyOutcome::Appended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use crate::keys::next_key_digest;

    fn key(n: u8) -> Ed25519PublicKey {
        Keypair::from_seed(&[n; 32]).public_key()
    }

    fn incepted() -> (KeyEventLog, KeyEvent) {
        let mut kel = KeyEventLog::new();
        let icp = kel
            .incept(KeyConfig::new(vec![key(0)], vec![next_key_digest(&key(1))]))
            .unwrap();
        (kel, icp)
    }

    #[test]
    fn test_incept_activates_log() {
        let (kel, icp) = incepted();
        let state = kel.state().unwrap();
        assert_eq!(state.prefix, *icp.said());
        assert_eq!(state.sn, 0);
        assert_eq!(state.current_keys, vec![key(0)]);
        assert!(state.is_transferable());
    }

    #[test]
    fn test_incept_twice_rejected() {
        let (mut kel, _) = incepted();
        let err = kel
            .incept(KeyConfig::new(vec![key(5)], vec![]))
            .unwrap_err();
        assert!(matches!(err, ValidationError::AlreadyIncepted(_)));
    }

    #[test]
    fn test_rotate_reveals_committed_keys() {
        let (mut kel, icp) = incepted();
        let rot = kel
            .rotate(
                KeyConfig::new(vec![key(1)], vec![next_key_digest(&key(2))]),
                &[key(1)],
            )
            .unwrap();

        let state = kel.state().unwrap();
        assert_eq!(state.current_keys, vec![key(1)]);
        assert_eq!(state.sn, 1);
        assert_eq!(state.last_establishment_sn, 1);
        assert_eq!(rot.prior(), Some(icp.said()));
    }

    #[test]
    fn test_rotate_wrong_reveal_leaves_state() {
        let (mut kel, _) = incepted();
        let before = kel.state().cloned();
        let err = kel
            .rotate(
                KeyConfig::new(vec![key(9)], vec![next_key_digest(&key(2))]),
                &[key(9)],
            )
            .unwrap_err();
        assert!(matches!(err, ValidationError::KeyCommitmentViolation { .. }));
        assert_eq!(kel.state().cloned(), before);
        assert_eq!(kel.len(), 1);
    }

    #[test]
    fn test_revealed_key_must_be_current() {
        let (mut kel, _) = incepted();
        let err = kel
            .rotate(
                KeyConfig::new(vec![key(7)], vec![next_key_digest(&key(2))]),
                &[key(1)],
            )
            .unwrap_err();
        assert!(matches!(err, ValidationError::KeyCommitmentViolation { .. }));
    }

    #[test]
    fn test_non_transferable_cannot_rotate() {
        let mut kel = KeyEventLog::new();
        kel.incept(KeyConfig::new(vec![key(0)], vec![])).unwrap();
        let err = kel
            .rotate(KeyConfig::new(vec![key(1)], vec![]), &[])
            .unwrap_err();
        assert!(matches!(err, ValidationError::NonTransferable(_)));
    }

    #[test]
    fn test_interact_keeps_keys() {
        let (mut kel, _) = incepted();
        let seal = Seal::new(Said::zero(), 0, Said::zero());
        let ixn = kel.interact(vec![seal.clone()]).unwrap();
        assert_eq!(ixn.seals(), &[seal]);
        assert_eq!(kel.state().unwrap().current_keys, vec![key(0)]);
        assert_eq!(kel.state().unwrap().last_establishment_sn, 0);
    }

    #[test]
    fn test_duplicate_is_noop() {
        let (mut kel, icp) = incepted();
        let ixn = kel.interact(vec![]).unwrap();
        assert_eq!(kel.apply(icp).unwrap(), ApplyOutcome::Duplicate);
        assert_eq!(kel.apply(ixn).unwrap(), ApplyOutcome::Duplicate);
        assert_eq!(kel.len(), 2);
    }

    #[test]
    fn test_fork_detected() {
        let (mut kel, icp) = incepted();
        let mut other = KeyEventLog::replay([icp]).unwrap();

        kel.interact(vec![]).unwrap();
        let rival = other
            .interact(vec![Seal::new(Said::zero(), 0, Said::zero())])
            .unwrap();

        let err = kel.apply(rival).unwrap_err();
        assert!(err.is_fork());
    }

    #[test]
    fn test_gap_is_chain_discontinuity() {
        let (kel, icp) = incepted();
        let mut ahead = KeyEventLog::replay([icp]).unwrap();
        ahead.interact(vec![]).unwrap();
        let far = ahead.interact(vec![]).unwrap();

        match kel.check(&far) {
            Err(ValidationError::ChainDiscontinuity {
                expected_sn, got_sn, ..
            }) => {
                assert_eq!(expected_sn, 1);
                assert_eq!(got_sn, 2);
            }
            other => panic!("expected discontinuity, got {other:?}"),
        }
    }

    #[test]
    fn test_non_inception_on_empty_log() {
        let (_, icp) = incepted();
        let mut source = KeyEventLog::replay([icp]).unwrap();
        let ixn = source.interact(vec![]).unwrap();
        let err = KeyEventLog::new().apply(ixn).unwrap_err();
        assert!(err.is_chain_break());
    }

    #[test]
    fn test_replay_matches_incremental() {
        let (mut kel, _) = incepted();
        kel.interact(vec![]).unwrap();
        kel.rotate(
            KeyConfig::new(vec![key(1)], vec![next_key_digest(&key(2))]),
            &[key(1)],
        )
        .unwrap();
        kel.interact(vec![]).unwrap();

        let replayed = KeyEventLog::replay(kel.events().to_vec()).unwrap();
        assert_eq!(replayed.state(), kel.state());
        assert_eq!(replayed.events(), kel.events());
    }
}
