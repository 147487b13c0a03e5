//! Strong type definitions for the KERI Kernel.
//!
//! All identifiers are newtypes to prevent misuse at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cesr::{self, Code};
use crate::crypto::Blake3Hash;
use crate::error::CoreError;

/// A self-addressing identifier: the qb64 encoding of a Blake3-256 digest.
///
/// The same type names event digests, autonomous identifiers (the SAID of an
/// inception event), registry identifiers, credential SAIDs and next-key
/// digests. The inner string is always a valid 44 character primitive.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Said(String);

/// An autonomous identifier: the SAID of its own inception event.
pub type Prefix = Said;

/// A registry identifier: the SAID of the registry inception event.
pub type RegistryId = Said;

impl Said {
    /// Wrap a digest.
    pub fn from_digest(hash: &Blake3Hash) -> Self {
        // Encoding a 32 byte digest under a 32 byte code cannot fail.
        let qb64 = cesr::encode(Code::Blake3_256, hash.as_bytes()).unwrap_or_default();
        Self(qb64)
    }

    /// Parse and validate a qb64 digest.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        cesr::decode_as(s, Code::Blake3_256)?;
        Ok(Self(s.to_string()))
    }

    /// The raw digest bytes.
    pub fn digest(&self) -> Blake3Hash {
        let mut arr = [0u8; 32];
        if let Ok(raw) = cesr::decode_as(&self.0, Code::Blake3_256) {
            arr.copy_from_slice(&raw);
        }
        Blake3Hash::from_bytes(arr)
    }

    /// Get the qb64 text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The all-zero digest (sentinel).
    pub fn zero() -> Self {
        Self::from_digest(&Blake3Hash::ZERO)
    }
}

impl fmt::Debug for Said {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Said({})", &self.0[..12.min(self.0.len())])
    }
}

impl fmt::Display for Said {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Said {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Said {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl TryFrom<&str> for Said {
    type Error = CoreError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<Said> for String {
    fn from(said: Said) -> Self {
        said.0
    }
}

/// Format a sequence number or threshold as lowercase hex without leading zeros.
pub fn to_hex_sn(n: u64) -> String {
    format!("{:x}", n)
}

/// Parse a hex sequence number, rejecting non-canonical forms.
pub fn parse_hex_sn(s: &str) -> Result<u64, CoreError> {
    let n = u64::from_str_radix(s, 16)
        .map_err(|e| CoreError::MalformedInput(format!("bad hex number {s:?}: {e}")))?;
    if to_hex_sn(n) != s {
        return Err(CoreError::MalformedInput(format!(
            "non-canonical hex number {s:?}"
        )));
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_said_roundtrip() {
        let said = Said::from_digest(&Blake3Hash::hash(b"hello"));
        let parsed = Said::parse(said.as_str()).unwrap();
        assert_eq!(said, parsed);
        assert_eq!(parsed.digest(), Blake3Hash::hash(b"hello"));
    }

    #[test]
    fn test_said_rejects_placeholder() {
        assert!(Said::parse(&"#".repeat(44)).is_err());
    }

    #[test]
    fn test_said_debug() {
        let said = Said::zero();
        let debug = format!("{:?}", said);
        assert!(debug.starts_with("Said(E"));
    }

    #[test]
    fn test_said_serde_transparent() {
        let said = Said::from_digest(&Blake3Hash::hash(b"x"));
        let json = serde_json::to_string(&said).unwrap();
        assert_eq!(json, format!("\"{}\"", said));
        let back: Said = serde_json::from_str(&json).unwrap();
        assert_eq!(back, said);
        assert!(serde_json::from_str::<Said>("\"nope\"").is_err());
    }

    #[test]
    fn test_hex_sn() {
        assert_eq!(to_hex_sn(0), "0");
        assert_eq!(to_hex_sn(255), "ff");
        assert_eq!(parse_hex_sn("a").unwrap(), 10);
        assert!(parse_hex_sn("0a").is_err());
        assert!(parse_hex_sn("A").is_err());
        assert!(parse_hex_sn("").is_err());
        assert!(parse_hex_sn("-1").is_err());
    }
}
