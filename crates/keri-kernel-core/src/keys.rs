//! Deterministic key management and pre-rotation digests.
//!
//! Seeds are derived from a recovery phrase with HKDF-SHA256 so any key in the
//! chain can be regenerated on demand without persisting private material:
//!
//! ```text
//! seed = HKDF-SHA256(salt = "keri-kernel/seed/v1", ikm = normalize(phrase), info = path)
//! ```
//!
//! The path names a rotation and a key index (`{stem}/{rotation}/{index}`), so
//! the keys of rotation `n + 1` are known to the controller while only their
//! digests appear in rotation `n`.

use hkdf::Hkdf;
use sha2::Sha256;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::crypto::{Blake3Hash, Ed25519PublicKey, Keypair};
use crate::error::CoreError;
use crate::types::Said;

/// Salt for seed derivation (domain separation).
pub const SEED_SALT: &[u8] = b"keri-kernel/seed/v1";

/// Default path stem for signing keys.
pub const DEFAULT_STEM: &str = "signing";

/// A 32-byte private seed. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Seed([u8; 32]);

impl Seed {
    /// Get the raw seed bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Seed(<redacted>)")
    }
}

/// Collapse runs of whitespace and lowercase the phrase.
pub fn normalize_phrase(phrase: &str) -> String {
    phrase
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Derive a seed from a recovery phrase and a derivation path.
pub fn derive_seed(phrase: &str, path: &str) -> Result<Seed, CoreError> {
    let normalized = Zeroizing::new(normalize_phrase(phrase));
    if normalized.is_empty() {
        return Err(CoreError::EmptyPhrase);
    }

    let hkdf = Hkdf::<Sha256>::new(Some(SEED_SALT), normalized.as_bytes());
    let mut seed = Seed([0u8; 32]);
    hkdf.expand(path.as_bytes(), &mut seed.0)
        .map_err(|_| CoreError::KeyDerivation)?;
    Ok(seed)
}

/// Build the Ed25519 keypair for a seed.
pub fn keypair_from(seed: &Seed) -> Keypair {
    Keypair::from_seed(seed.as_bytes())
}

/// The pre-rotation digest of a public key: Blake3-256 over the raw key bytes.
pub fn next_key_digest(key: &Ed25519PublicKey) -> Said {
    Said::from_digest(&Blake3Hash::hash(key.as_bytes()))
}

/// Digests for a list of keys, in order.
pub fn next_key_digests(keys: &[Ed25519PublicKey]) -> Vec<Said> {
    keys.iter().map(next_key_digest).collect()
}

/// A derivation path: `{stem}/{rotation}/{index}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPath {
    pub stem: String,
    pub rotation: u32,
    pub index: u32,
}

impl KeyPath {
    pub fn new(stem: impl Into<String>, rotation: u32, index: u32) -> Self {
        Self {
            stem: stem.into(),
            rotation,
            index,
        }
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.stem, self.rotation, self.index)
    }
}

/// Keys in force for one rotation, plus the commitment to the next rotation.
#[derive(Debug, Clone)]
pub struct KeySet {
    /// Signing keypairs for the current rotation.
    pub signers: Vec<Keypair>,
    /// Public keys of the current rotation.
    pub current: Vec<Ed25519PublicKey>,
    /// Public keys of the next rotation (kept secret until revealed).
    pub next: Vec<Ed25519PublicKey>,
    /// Digests of `next`, published in the establishment event.
    pub next_digests: Vec<Said>,
}

/// Regenerates every key of an identifier from its recovery phrase.
pub struct KeyChain {
    phrase: Zeroizing<String>,
    stem: String,
    key_count: u32,
}

impl KeyChain {
    /// A chain with one signing key per rotation.
    pub fn new(phrase: &str) -> Result<Self, CoreError> {
        Self::with_options(phrase, DEFAULT_STEM, 1)
    }

    /// A chain with a custom stem and number of keys per rotation.
    pub fn with_options(phrase: &str, stem: &str, key_count: u32) -> Result<Self, CoreError> {
        let phrase = Zeroizing::new(normalize_phrase(phrase));
        if phrase.is_empty() {
            return Err(CoreError::EmptyPhrase);
        }
        if key_count == 0 {
            return Err(CoreError::invalid("key_count", "must be at least 1"));
        }
        Ok(Self {
            phrase,
            stem: stem.to_string(),
            key_count,
        })
    }

    /// Number of keys per rotation.
    pub fn key_count(&self) -> u32 {
        self.key_count
    }

    /// Keypairs for a rotation index.
    pub fn keypairs(&self, rotation: u32) -> Result<Vec<Keypair>, CoreError> {
        (0..self.key_count)
            .map(|index| {
                let path = KeyPath::new(self.stem.clone(), rotation, index);
                let seed = derive_seed(&self.phrase, &path.to_string())?;
                Ok(keypair_from(&seed))
            })
            .collect()
    }

    /// The key set in force after `rotation` establishment events.
    ///
    /// Rotation 0 is the inception; its next keys are those of rotation 1.
    pub fn key_set(&self, rotation: u32) -> Result<KeySet, CoreError> {
        let next_rotation = rotation
            .checked_add(1)
            .ok_or_else(|| CoreError::invalid("rotation", "overflow"))?;

        let signers = self.keypairs(rotation)?;
        let current = signers.iter().map(Keypair::public_key).collect();
        let next: Vec<Ed25519PublicKey> = self
            .keypairs(next_rotation)?
            .iter()
            .map(Keypair::public_key)
            .collect();
        let next_digests = next_key_digests(&next);

        Ok(KeySet {
            signers,
            current,
            next,
            next_digests,
        })
    }
}

impl fmt::Debug for KeyChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyChain")
            .field("stem", &self.stem)
            .field("key_count", &self.key_count)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PHRASE: &str = "abandon ability able about above absent absorb abstract";

    #[test]
    fn test_seed_deterministic() {
        let a = derive_seed(PHRASE, "signing/0/0").unwrap();
        let b = derive_seed(PHRASE, "signing/0/0").unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_seed_depends_on_path_and_phrase() {
        let a = derive_seed(PHRASE, "signing/0/0").unwrap();
        let b = derive_seed(PHRASE, "signing/1/0").unwrap();
        let c = derive_seed("another phrase entirely", "signing/0/0").unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
        assert_ne!(a.as_bytes(), c.as_bytes());
    }

    #[test]
    fn test_phrase_normalization() {
        let messy = "  Abandon   ABILITY able\tabout above absent absorb abstract \n";
        let a = derive_seed(messy, "p").unwrap();
        let b = derive_seed(PHRASE, "p").unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_empty_phrase_rejected() {
        assert_eq!(derive_seed("   ", "p").unwrap_err(), CoreError::EmptyPhrase);
        assert!(KeyChain::new("").is_err());
    }

    #[test]
    fn test_seed_debug_redacted() {
        let seed = derive_seed(PHRASE, "p").unwrap();
        assert_eq!(format!("{:?}", seed), "Seed(<redacted>)");
    }

    #[test]
    fn test_next_key_digest_over_raw_bytes() {
        let kp = keypair_from(&derive_seed(PHRASE, "p").unwrap());
        let pk = kp.public_key();
        let expected = Said::from_digest(&Blake3Hash::hash(pk.as_bytes()));
        assert_eq!(next_key_digest(&pk), expected);
    }

    #[test]
    fn test_key_path_display() {
        assert_eq!(KeyPath::new("signing", 2, 1).to_string(), "signing/2/1");
    }

    #[test]
    fn test_key_chain_commits_to_next_rotation() {
        let chain = KeyChain::with_options(PHRASE, DEFAULT_STEM, 2).unwrap();
        let zero = chain.key_set(0).unwrap();
        let one = chain.key_set(1).unwrap();

        assert_eq!(zero.current.len(), 2);
        assert_eq!(zero.next, one.current);
        assert_eq!(zero.next_digests, next_key_digests(&one.current));
        assert_ne!(zero.current, one.current);
    }
}
