//! Cryptographic primitives for the KERI Kernel.
//!
//! Wraps Ed25519 signing and Blake3 hashing with strong types and their qb64
//! text forms.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cesr::{self, Code};
use crate::error::CoreError;

/// A 32-byte Blake3 hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Blake3Hash(pub [u8; 32]);

impl Blake3Hash {
    /// Compute the Blake3 hash of the given data.
    pub fn hash(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The zero hash (sentinel value).
    pub const ZERO: Self = Self([0u8; 32]);
}

impl fmt::Debug for Blake3Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Blake3({})", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for Blake3Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for Blake3Hash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// A 32-byte Ed25519 public key.
///
/// Serialized as its qb64 text (`D` code) wherever it appears in an event.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ed25519PublicKey(pub [u8; 32]);

impl Ed25519PublicKey {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Encode as qb64.
    pub fn to_qb64(&self) -> String {
        cesr::encode(Code::Ed25519, &self.0).unwrap_or_default()
    }

    /// Parse from qb64.
    pub fn from_qb64(s: &str) -> Result<Self, CoreError> {
        let raw = cesr::decode_as(s, Code::Ed25519)?;
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&raw);
        Ok(Self(arr))
    }

    /// Verify a signature over a message.
    pub fn verify(&self, message: &[u8], signature: &Ed25519Signature) -> Result<(), CoreError> {
        let verifying_key =
            VerifyingKey::from_bytes(&self.0).map_err(|_| CoreError::InvalidPublicKey)?;

        let sig = Signature::from_bytes(&signature.0);

        verifying_key
            .verify(message, &sig)
            .map_err(|_| CoreError::InvalidSignature)
    }
}

impl fmt::Debug for Ed25519PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed25519Pub({})", &self.to_qb64()[..12])
    }
}

impl fmt::Display for Ed25519PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_qb64())
    }
}

impl Serialize for Ed25519PublicKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_qb64())
    }
}

impl<'de> Deserialize<'de> for Ed25519PublicKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_qb64(&s).map_err(serde::de::Error::custom)
    }
}

impl From<[u8; 32]> for Ed25519PublicKey {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// A 64-byte Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Ed25519Signature(pub [u8; 64]);

impl Ed25519Signature {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// Encode as qb64 (`0B` code).
    pub fn to_qb64(&self) -> String {
        cesr::encode(Code::Ed25519Sig, &self.0).unwrap_or_default()
    }

    /// Parse from qb64.
    pub fn from_qb64(s: &str) -> Result<Self, CoreError> {
        let raw = cesr::decode_as(s, Code::Ed25519Sig)?;
        let mut arr = [0u8; 64];
        arr.copy_from_slice(&raw);
        Ok(Self(arr))
    }

    /// The zero signature (invalid, used as placeholder).
    pub const ZERO: Self = Self([0u8; 64]);
}

impl fmt::Debug for Ed25519Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed25519Sig({}...)", &hex::encode(&self.0[..8]))
    }
}

impl Serialize for Ed25519Signature {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_qb64())
    }
}

impl<'de> Deserialize<'de> for Ed25519Signature {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_qb64(&s).map_err(serde::de::Error::custom)
    }
}

impl From<[u8; 64]> for Ed25519Signature {
    fn from(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }
}

/// An Ed25519 signing keypair.
///
/// This wraps ed25519-dalek's SigningKey, which zeroizes its secret on drop.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let signing_key = SigningKey::generate(&mut rng);
        Self { signing_key }
    }

    /// Create from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        Self { signing_key }
    }

    /// Get the public key.
    pub fn public_key(&self) -> Ed25519PublicKey {
        Ed25519PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Ed25519Signature {
        let sig = self.signing_key.sign(message);
        Ed25519Signature(sig.to_bytes())
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keypair({:?})", self.public_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_sign_verify() {
        let keypair = Keypair::generate();
        let message = b"hello world";
        let signature = keypair.sign(message);

        keypair
            .public_key()
            .verify(message, &signature)
            .expect("valid signature should verify");

        let tampered = b"hello worlD";
        assert!(keypair.public_key().verify(tampered, &signature).is_err());
    }

    #[test]
    fn test_keypair_deterministic_from_seed() {
        let seed = [0x42u8; 32];
        let kp1 = Keypair::from_seed(&seed);
        let kp2 = Keypair::from_seed(&seed);
        assert_eq!(kp1.public_key(), kp2.public_key());
    }

    #[test]
    fn test_public_key_qb64_roundtrip() {
        let pk = Keypair::generate().public_key();
        let qb64 = pk.to_qb64();
        assert_eq!(qb64.len(), 44);
        assert!(qb64.starts_with('D'));
        assert_eq!(Ed25519PublicKey::from_qb64(&qb64).unwrap(), pk);
    }

    #[test]
    fn test_signature_qb64_roundtrip() {
        let kp = Keypair::from_seed(&[7u8; 32]);
        let sig = kp.sign(b"msg");
        let qb64 = sig.to_qb64();
        assert_eq!(qb64.len(), 88);
        assert!(qb64.starts_with("0B"));
        assert_eq!(Ed25519Signature::from_qb64(&qb64).unwrap(), sig);
    }

    #[test]
    fn test_public_key_rejects_digest_code() {
        let digest = cesr::encode(Code::Blake3_256, &[1u8; 32]).unwrap();
        assert!(Ed25519PublicKey::from_qb64(&digest).is_err());
    }

    #[test]
    fn test_public_key_serde_is_qb64() {
        let pk = Keypair::from_seed(&[1u8; 32]).public_key();
        let json = serde_json::to_string(&pk).unwrap();
        assert_eq!(json, format!("\"{}\"", pk.to_qb64()));
    }
}
