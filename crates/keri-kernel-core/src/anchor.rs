//! Cross-log anchoring.
//!
//! A seal in a host event (a KEL interaction or a parent TEL issuance) names
//! another log's event by id, sn and SAID. Verification never trusts the
//! anchored event's claimed `d`: the SAID is recomputed from its body.

use crate::error::CoreError;
use crate::event::KeyEvent;
use crate::said;
use crate::seal::Seal;
use crate::tel_event::TelEvent;
use crate::types::Said;

/// An event that carries seals.
pub trait SealHost {
    fn seals(&self) -> &[Seal];
}

/// An event that can be referenced by a seal.
pub trait AnchoredEvent {
    /// Identifier of the log the event belongs to.
    fn anchor_id(&self) -> &Said;

    fn anchor_sn(&self) -> u64;

    /// SAID recomputed from the body.
    fn recompute_said(&self) -> Result<Said, CoreError>;
}

impl SealHost for KeyEvent {
    fn seals(&self) -> &[Seal] {
        KeyEvent::seals(self)
    }
}

impl SealHost for TelEvent {
    fn seals(&self) -> &[Seal] {
        TelEvent::seals(self)
    }
}

impl AnchoredEvent for KeyEvent {
    fn anchor_id(&self) -> &Said {
        self.prefix()
    }

    fn anchor_sn(&self) -> u64 {
        self.sn()
    }

    fn recompute_said(&self) -> Result<Said, CoreError> {
        said::compute(&self.to_value(), self.said_labels())
    }
}

impl AnchoredEvent for TelEvent {
    fn anchor_id(&self) -> &Said {
        self.registry_id()
    }

    fn anchor_sn(&self) -> u64 {
        self.sn()
    }

    fn recompute_said(&self) -> Result<Said, CoreError> {
        said::compute(&self.to_value(), self.said_labels())
    }
}

/// Build the seal that anchors `event`.
pub fn seal_for<E: AnchoredEvent>(event: &E) -> Result<Seal, CoreError> {
    Ok(Seal::new(
        event.anchor_id().clone(),
        event.anchor_sn(),
        event.recompute_said()?,
    ))
}

/// True if `seal` is carried by `host` and references `anchored` exactly.
pub fn verify_anchor<H, E>(host: &H, seal: &Seal, anchored: &E) -> bool
where
    H: SealHost + ?Sized,
    E: AnchoredEvent + ?Sized,
{
    let Ok(recomputed) = anchored.recompute_said() else {
        return false;
    };

    seal.anchored_id == *anchored.anchor_id()
        && seal.anchored_sn == anchored.anchor_sn()
        && seal.anchored_digest == recomputed
        && host.seals().contains(seal)
}

/// First host event anchoring `anchored`, with the matching seal.
pub fn find_anchor<'a, H, E>(hosts: &'a [H], anchored: &E) -> Option<(&'a H, &'a Seal)>
where
    H: SealHost,
    E: AnchoredEvent + ?Sized,
{
    hosts.iter().find_map(|host| {
        host.seals()
            .iter()
            .find(|seal| verify_anchor(host, seal, anchored))
            .map(|seal| (host, seal))
    })
}
