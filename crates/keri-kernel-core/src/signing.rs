//! Indexed controller signatures over canonical event bytes.
//!
//! Signatures are not part of the event body (and so not part of its SAID).
//! Each signature names the index of the signing key in the current key list;
//! a set of signatures satisfies a threshold when at least `threshold`
//! distinct indexes verify.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::acdc::Credential;
use crate::crypto::{Ed25519PublicKey, Ed25519Signature, Keypair};
use crate::error::{CoreError, ValidationError};
use crate::event::KeyEvent;
use crate::tel_event::TelEvent;

/// A signature by the key at `index` of the signer's current key list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedSignature {
    pub index: u32,
    pub signature: Ed25519Signature,
}

/// Anything whose canonical bytes can be signed.
pub trait Signable {
    fn signing_bytes(&self) -> Result<Vec<u8>, CoreError>;
}

impl Signable for KeyEvent {
    fn signing_bytes(&self) -> Result<Vec<u8>, CoreError> {
        self.canonical_bytes()
    }
}

impl Signable for TelEvent {
    fn signing_bytes(&self) -> Result<Vec<u8>, CoreError> {
        self.canonical_bytes()
    }
}

impl Signable for Credential {
    fn signing_bytes(&self) -> Result<Vec<u8>, CoreError> {
        self.canonical_bytes()
    }
}

/// Sign with every signer, indexed by position.
pub fn sign<T: Signable + ?Sized>(
    item: &T,
    signers: &[Keypair],
) -> Result<Vec<IndexedSignature>, CoreError> {
    let message = item.signing_bytes()?;
    signers
        .iter()
        .enumerate()
        .map(|(i, kp)| -> Result<IndexedSignature, CoreError> {
            let index =
                u32::try_from(i).map_err(|_| CoreError::invalid("index", "too many signers"))?;
            Ok(IndexedSignature {
                index,
                signature: kp.sign(&message),
            })
        })
        .collect()
}

/// Verify signatures against `keys`; at least `threshold` distinct indexes
/// must verify. Any signature that fails is an error. Returns the number of
/// distinct valid indexes.
pub fn verify_signatures<T: Signable + ?Sized>(
    item: &T,
    signatures: &[IndexedSignature],
    keys: &[Ed25519PublicKey],
    threshold: u64,
) -> Result<usize, ValidationError> {
    let message = item.signing_bytes()?;
    let mut valid = BTreeSet::new();

    for sig in signatures {
        let key = usize::try_from(sig.index)
            .ok()
            .and_then(|i| keys.get(i))
            .ok_or(ValidationError::SignatureFailed { index: sig.index })?;
        key.verify(&message, &sig.signature)
            .map_err(|_| ValidationError::SignatureFailed { index: sig.index })?;
        valid.insert(sig.index);
    }

    if (valid.len() as u64) < threshold {
        return Err(ValidationError::InsufficientSignatures {
            required: threshold,
            valid: valid.len(),
        });
    }
    Ok(valid.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{InceptionEvent, KeyConfig};

    fn signers(n: u8) -> Vec<Keypair> {
        (0..n).map(|i| Keypair::from_seed(&[i + 10; 32])).collect()
    }

    fn event(signers: &[Keypair], threshold: u64) -> KeyEvent {
        let keys = signers.iter().map(Keypair::public_key).collect();
        KeyEvent::Inception(
            InceptionEvent::build(KeyConfig::new(keys, vec![]).key_threshold(threshold), vec![])
                .unwrap(),
        )
    }

    #[test]
    fn test_sign_and_verify() {
        let kps = signers(2);
        let icp = event(&kps, 2);
        let sigs = sign(&icp, &kps).unwrap();
        let keys = icp.config().unwrap().keys.clone();
        assert_eq!(verify_signatures(&icp, &sigs, &keys, 2).unwrap(), 2);
    }

    #[test]
    fn test_threshold_not_met() {
        let kps = signers(3);
        let icp = event(&kps, 2);
        let sigs = sign(&icp, &kps[..1]).unwrap();
        let keys = icp.config().unwrap().keys.clone();
        assert!(matches!(
            verify_signatures(&icp, &sigs, &keys, 2),
            Err(ValidationError::InsufficientSignatures { required: 2, valid: 1 })
        ));
    }

    #[test]
    fn test_repeated_index_counts_once() {
        let kps = signers(2);
        let icp = event(&kps, 2);
        let sig = sign(&icp, &kps[..1]).unwrap()[0];
        let keys = icp.config().unwrap().keys.clone();
        assert!(verify_signatures(&icp, &[sig, sig], &keys, 2).is_err());
    }

    #[test]
    fn test_wrong_key_or_index_fails() {
        let kps = signers(2);
        let icp = event(&kps, 1);
        let keys = icp.config().unwrap().keys.clone();

        let mut sig = sign(&icp, &kps[..1]).unwrap()[0];
        sig.index = 1;
        assert_eq!(
            verify_signatures(&icp, &[sig], &keys, 1),
            Err(ValidationError::SignatureFailed { index: 1 })
        );

        sig.index = 7;
        assert_eq!(
            verify_signatures(&icp, &[sig], &keys, 1),
            Err(ValidationError::SignatureFailed { index: 7 })
        );
    }
}
