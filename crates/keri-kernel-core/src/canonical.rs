//! Canonical JSON encoding for deterministic serialization.
//!
//! Event bodies are hashed over their canonical form:
//! - Object keys sorted by UTF-8 byte comparison, at every depth
//! - No whitespace between tokens
//! - Strings escaped exactly as `serde_json` escapes them
//! - Integers only (floats have no single canonical spelling)
//!
//! The canonical encoding is critical: it ensures that the same event
//! produces identical bytes (and thus identical SAIDs) across all platforms,
//! regardless of the key order a peer happened to send.

use serde_json::{Map, Value};
use std::fmt;

use crate::error::CoreError;

/// Length of a version string such as `KERI10JSON0000fd_`.
pub const VERSION_STRING_LEN: usize = 17;

/// Protocol named by a version string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Key event and transaction event logs.
    Keri,
    /// Authentic chained data containers (credentials).
    Acdc,
}

impl Protocol {
    fn as_str(self) -> &'static str {
        match self {
            Protocol::Keri => "KERI",
            Protocol::Acdc => "ACDC",
        }
    }
}

/// A parsed version string: protocol, version 1.0, JSON, body size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VersionString {
    pub protocol: Protocol,
    pub size: usize,
}

impl VersionString {
    /// A version string for the given protocol and body size.
    pub fn new(protocol: Protocol, size: usize) -> Self {
        Self { protocol, size }
    }

    /// Parse a version string.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        if s.len() != VERSION_STRING_LEN || !s.is_ascii() {
            return Err(CoreError::UnsupportedVersion(s.to_string()));
        }

        let protocol = match &s[0..4] {
            "KERI" => Protocol::Keri,
            "ACDC" => Protocol::Acdc,
            _ => return Err(CoreError::UnsupportedVersion(s.to_string())),
        };

        if &s[4..6] != "10" || &s[6..10] != "JSON" || &s[16..] != "_" {
            return Err(CoreError::UnsupportedVersion(s.to_string()));
        }

        let size_hex = &s[10..16];
        if !size_hex
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(CoreError::UnsupportedVersion(s.to_string()));
        }
        let size = usize::from_str_radix(size_hex, 16)
            .map_err(|_| CoreError::UnsupportedVersion(s.to_string()))?;

        Ok(Self { protocol, size })
    }
}

impl fmt::Display for VersionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}10JSON{:06x}_", self.protocol.as_str(), self.size)
    }
}

/// Encode a JSON value to canonical bytes.
pub fn canonical_json(value: &Value) -> Result<Vec<u8>, CoreError> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, value)?;
    Ok(buf)
}

/// Recursively encode a JSON value.
fn encode_value_to(buf: &mut Vec<u8>, value: &Value) -> Result<(), CoreError> {
    match value {
        Value::Null => buf.extend_from_slice(b"null"),
        Value::Bool(b) => buf.extend_from_slice(if *b { b"true" } else { b"false" }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                buf.extend_from_slice(i.to_string().as_bytes());
            } else if let Some(u) = n.as_u64() {
                buf.extend_from_slice(u.to_string().as_bytes());
            } else {
                return Err(CoreError::NonCanonicalNumber);
            }
        }
        Value::String(s) => encode_text(buf, s)?,
        Value::Array(arr) => {
            buf.push(b'[');
            for (i, item) in arr.iter().enumerate() {
                if i > 0 {
                    buf.push(b',');
                }
                encode_value_to(buf, item)?;
            }
            buf.push(b']');
        }
        Value::Object(map) => encode_map_canonical(buf, map)?,
    }
    Ok(())
}

fn encode_text(buf: &mut Vec<u8>, s: &str) -> Result<(), CoreError> {
    serde_json::to_writer(&mut *buf, s).map_err(|e| CoreError::EncodingError(e.to_string()))
}

/// Encode an object canonically.
///
/// Keys are sorted by their UTF-8 bytes.
fn encode_map_canonical(buf: &mut Vec<u8>, map: &Map<String, Value>) -> Result<(), CoreError> {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

    buf.push(b'{');
    for (i, (key, value)) in entries.into_iter().enumerate() {
        if i > 0 {
            buf.push(b',');
        }
        encode_text(buf, key)?;
        buf.push(b':');
        encode_value_to(buf, value)?;
    }
    buf.push(b'}');
    Ok(())
}

/// Read the version string of an object body.
pub fn version_of(body: &Value) -> Result<VersionString, CoreError> {
    let v = body
        .get("v")
        .ok_or_else(|| CoreError::MissingField("v".into()))?
        .as_str()
        .ok_or_else(|| CoreError::invalid("v", "expected a string"))?;
    VersionString::parse(v)
}

/// Fill in the body size of the version string.
///
/// The version string has a fixed length, so rewriting it does not change the
/// canonical length it records. Returns the size.
pub fn sizeify(body: &mut Value) -> Result<usize, CoreError> {
    let version = version_of(body)?;
    let size = canonical_json(body)?.len();

    let obj = body
        .as_object_mut()
        .ok_or_else(|| CoreError::MalformedInput("body is not an object".into()))?;
    obj.insert(
        "v".into(),
        Value::String(VersionString::new(version.protocol, size).to_string()),
    );
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keys_sorted_at_every_depth() {
        let value = json!({"b": 1, "a": {"z": true, "m": null}, "c": [{"y": 1, "x": 2}]});
        let bytes = canonical_json(&value).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"a":{"m":null,"z":true},"b":1,"c":[{"x":2,"y":1}]}"#
        );
    }

    #[test]
    fn test_insertion_order_irrelevant() {
        let a: Value = serde_json::from_str(r#"{"i":"x","d":"y","t":"icp"}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"t":"icp","i":"x","d":"y"}"#).unwrap();
        assert_eq!(canonical_json(&a).unwrap(), canonical_json(&b).unwrap());
    }

    #[test]
    fn test_string_escaping() {
        let value = json!({"s": "line\nquote\"slash\\é"});
        let bytes = canonical_json(&value).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "{\"s\":\"line\\nquote\\\"slash\\\\é\"}"
        );
    }

    #[test]
    fn test_floats_rejected() {
        let value = json!({"x": 1.5});
        assert_eq!(canonical_json(&value), Err(CoreError::NonCanonicalNumber));
        assert!(canonical_json(&json!({"x": -3})).is_ok());
    }

    #[test]
    fn test_version_string_roundtrip() {
        let v = VersionString::new(Protocol::Keri, 0xfd);
        assert_eq!(v.to_string(), "KERI10JSON0000fd_");
        assert_eq!(VersionString::parse("KERI10JSON0000fd_").unwrap(), v);

        let acdc = VersionString::parse("ACDC10JSON000123_").unwrap();
        assert_eq!(acdc.protocol, Protocol::Acdc);
        assert_eq!(acdc.size, 0x123);
    }

    #[test]
    fn test_version_string_rejects_bad_forms() {
        for bad in [
            "",
            "KERI10JSON0000fd",
            "KERI20JSON0000fd_",
            "KERI10CBOR0000fd_",
            "KERI10JSON0000FD_",
            "XXXX10JSON0000fd_",
            "KERI10JSON0000fd-",
        ] {
            assert!(VersionString::parse(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_sizeify_matches_canonical_length() {
        let mut body = json!({"v": "KERI10JSON000000_", "t": "ixn", "a": []});
        let size = sizeify(&mut body).unwrap();
        assert_eq!(canonical_json(&body).unwrap().len(), size);
        assert_eq!(version_of(&body).unwrap().size, size);
    }
}
