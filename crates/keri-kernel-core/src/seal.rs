//! Event seals: references from one log into another.

use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::types::{parse_hex_sn, to_hex_sn, Said};

/// A seal asserting "I have observed the event `digest` at `sn` of log `id`".
///
/// Serialized as `{"i": id, "s": snHex, "d": digest}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Seal {
    /// Identifier (or registry id) of the anchored log.
    pub anchored_id: Said,
    /// Sequence number of the anchored event.
    pub anchored_sn: u64,
    /// SAID of the anchored event.
    pub anchored_digest: Said,
}

impl Seal {
    pub fn new(anchored_id: Said, anchored_sn: u64, anchored_digest: Said) -> Self {
        Self {
            anchored_id,
            anchored_sn,
            anchored_digest,
        }
    }

    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("i".into(), Value::String(self.anchored_id.to_string()));
        map.insert("s".into(), Value::String(to_hex_sn(self.anchored_sn)));
        map.insert("d".into(), Value::String(self.anchored_digest.to_string()));
        Value::Object(map)
    }

    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        let field = |key: &str| -> Result<String, CoreError> {
            value
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| CoreError::invalid("a", format!("seal missing `{key}`")))
        };

        if value.as_object().map(|m| m.len()) != Some(3) {
            return Err(CoreError::invalid("a", "seal must have exactly i, s, d"));
        }

        Ok(Self {
            anchored_id: Said::parse(&field("i")?)?,
            anchored_sn: parse_hex_sn(&field("s")?)?,
            anchored_digest: Said::parse(&field("d")?)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Blake3Hash;
    use serde_json::json;

    #[test]
    fn test_seal_value_roundtrip() {
        let seal = Seal::new(
            Said::from_digest(&Blake3Hash::hash(b"log")),
            3,
            Said::from_digest(&Blake3Hash::hash(b"event")),
        );
        let value = seal.to_value();
        assert_eq!(value["s"], json!("3"));
        assert_eq!(Seal::from_value(value).unwrap(), seal);
    }

    #[test]
    fn test_seal_rejects_extra_or_missing_fields() {
        let id = Said::zero().to_string();
        assert!(Seal::from_value(json!({"i": id, "s": "0"})).is_err());
        assert!(Seal::from_value(json!({"i": id, "s": "0", "d": id, "x": 1})).is_err());
        assert!(Seal::from_value(json!("not a seal")).is_err());
    }
}
