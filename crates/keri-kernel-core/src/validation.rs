//! Stateless validation of events and credentials.
//!
//! Validation is split into structural checks (this module) and log checks
//! (sn / prior continuity, see [`crate::kel`] and [`crate::tel`]). A value
//! that passes here is self-consistent: its SAID verifies, its version string
//! names the right protocol and size, and its thresholds are satisfiable.

use serde_json::Value;

use crate::acdc::Credential;
use crate::canonical::{canonical_json, Protocol, VersionString};
use crate::error::ValidationError;
use crate::event::KeyEvent;
use crate::said;
use crate::tel_event::TelEvent;
use crate::types::Said;

/// Validate a key event in isolation. Returns its verified SAID.
pub fn validate_key_event(event: &KeyEvent) -> Result<Said, ValidationError> {
    let body = event.to_value();
    let said = said::check(&body, event.said_labels())?;
    check_version(&body, event.version(), Protocol::Keri)?;

    if let Some(config) = event.config() {
        if config.keys.is_empty() {
            return Err(ValidationError::StructuralError(
                "establishment event has no signing keys".into(),
            ));
        }
        check_threshold(config.key_threshold, config.keys.len(), false)?;
        check_threshold(config.next_threshold, config.next_key_digests.len(), true)?;
    }

    Ok(said)
}

/// Validate a transaction event in isolation. Returns its verified SAID.
pub fn validate_tel_event(event: &TelEvent) -> Result<Said, ValidationError> {
    let body = event.to_value();
    let said = said::check(&body, event.said_labels())?;
    check_version(&body, event.version(), Protocol::Keri)?;

    if let TelEvent::Inception(vcp) = event {
        if vcp.parent.as_ref() == Some(&vcp.registry_id) {
            return Err(ValidationError::StructuralError(
                "registry cannot be its own parent".into(),
            ));
        }
    }

    Ok(said)
}

/// Validate a credential: outer SAID, block SAIDs and version string.
pub fn validate_credential(credential: &Credential) -> Result<Said, ValidationError> {
    credential.verify()
}

/// The declared protocol and size must match the body.
pub fn check_version(
    body: &Value,
    version: &VersionString,
    protocol: Protocol,
) -> Result<(), ValidationError> {
    if version.protocol != protocol {
        return Err(ValidationError::MalformedInput(format!(
            "expected {protocol:?} version string, got {version}"
        )));
    }
    let actual = canonical_json(body)?.len();
    if version.size != actual {
        return Err(ValidationError::VersionSizeMismatch {
            declared: version.size,
            actual,
        });
    }
    Ok(())
}

/// `1 <= threshold <= count`; an empty list requires threshold 0 when allowed.
fn check_threshold(threshold: u64, count: usize, allow_empty: bool) -> Result<(), ValidationError> {
    let ok = if count == 0 {
        allow_empty && threshold == 0
    } else {
        threshold >= 1 && threshold <= count as u64
    };
    if ok {
        Ok(())
    } else {
        Err(ValidationError::InvalidThreshold { threshold, count })
    }
}
