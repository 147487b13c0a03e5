//! Field extraction for permissive event decoding.
//!
//! Required fields are removed from the body one by one; whatever remains is
//! kept as the event's extension map so re-serialization is lossless.

use serde_json::{Map, Value};

use crate::canonical::VersionString;
use crate::crypto::Ed25519PublicKey;
use crate::error::CoreError;
use crate::seal::Seal;
use crate::types::{parse_hex_sn, Said};

pub(crate) struct Fields {
    map: Map<String, Value>,
}

impl Fields {
    /// Start decoding an object body.
    pub(crate) fn new(value: Value) -> Result<Self, CoreError> {
        match value {
            Value::Object(map) => Ok(Self { map }),
            _ => Err(CoreError::MalformedInput("body is not an object".into())),
        }
    }

    /// Start decoding an event body whose `t` must equal `ilk`.
    pub(crate) fn open(value: Value, ilk: &str) -> Result<Self, CoreError> {
        let mut fields = Self::new(value)?;
        let t = fields.take_str("t")?;
        if t != ilk {
            return Err(CoreError::invalid("t", format!("expected {ilk}, got {t}")));
        }
        Ok(fields)
    }

    fn take(&mut self, key: &str) -> Result<Value, CoreError> {
        self.map
            .remove(key)
            .ok_or_else(|| CoreError::MissingField(key.to_string()))
    }

    pub(crate) fn take_str(&mut self, key: &str) -> Result<String, CoreError> {
        match self.take(key)? {
            Value::String(s) => Ok(s),
            _ => Err(CoreError::invalid(key, "expected a string")),
        }
    }

    pub(crate) fn take_version(&mut self) -> Result<VersionString, CoreError> {
        VersionString::parse(&self.take_str("v")?)
    }

    pub(crate) fn take_said(&mut self, key: &str) -> Result<Said, CoreError> {
        let s = self.take_str(key)?;
        Said::parse(&s).map_err(|e| CoreError::invalid(key, e.to_string()))
    }

    pub(crate) fn take_opt_said(&mut self, key: &str) -> Result<Option<Said>, CoreError> {
        if self.map.contains_key(key) {
            self.take_said(key).map(Some)
        } else {
            Ok(None)
        }
    }

    /// A hex-encoded integer (sequence number or threshold).
    pub(crate) fn take_hex(&mut self, key: &str) -> Result<u64, CoreError> {
        let s = self.take_str(key)?;
        parse_hex_sn(&s).map_err(|e| CoreError::invalid(key, e.to_string()))
    }

    pub(crate) fn take_keys(&mut self, key: &str) -> Result<Vec<Ed25519PublicKey>, CoreError> {
        self.take_str_list(key)?
            .iter()
            .map(|s| Ed25519PublicKey::from_qb64(s).map_err(|e| CoreError::invalid(key, e.to_string())))
            .collect()
    }

    pub(crate) fn take_saids(&mut self, key: &str) -> Result<Vec<Said>, CoreError> {
        self.take_str_list(key)?
            .iter()
            .map(|s| Said::parse(s).map_err(|e| CoreError::invalid(key, e.to_string())))
            .collect()
    }

    pub(crate) fn take_seals(&mut self, key: &str) -> Result<Vec<Seal>, CoreError> {
        match self.take(key)? {
            Value::Array(items) => items.into_iter().map(Seal::from_value).collect(),
            _ => Err(CoreError::invalid(key, "expected a list of seals")),
        }
    }

    pub(crate) fn take_opt_seals(&mut self, key: &str) -> Result<Option<Vec<Seal>>, CoreError> {
        if self.map.contains_key(key) {
            self.take_seals(key).map(Some)
        } else {
            Ok(None)
        }
    }

    pub(crate) fn take_object(&mut self, key: &str) -> Result<Map<String, Value>, CoreError> {
        match self.take(key)? {
            Value::Object(map) => Ok(map),
            _ => Err(CoreError::invalid(key, "expected an object")),
        }
    }

    pub(crate) fn take_opt_object(
        &mut self,
        key: &str,
    ) -> Result<Option<Map<String, Value>>, CoreError> {
        if self.map.contains_key(key) {
            self.take_object(key).map(Some)
        } else {
            Ok(None)
        }
    }

    fn take_str_list(&mut self, key: &str) -> Result<Vec<String>, CoreError> {
        match self.take(key)? {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s),
                    _ => Err(CoreError::invalid(key, "expected a list of strings")),
                })
                .collect(),
            _ => Err(CoreError::invalid(key, "expected a list")),
        }
    }

    /// Unrecognized fields.
    pub(crate) fn rest(self) -> Map<String, Value> {
        self.map
    }
}

/// Builds an event body in field order; extension fields go last.
pub(crate) struct Body {
    map: Map<String, Value>,
}

impl Body {
    /// A body with a version string and no event type.
    pub(crate) fn versioned(version: &VersionString) -> Self {
        let mut map = Map::new();
        map.insert("v".into(), Value::String(version.to_string()));
        Self { map }
    }

    pub(crate) fn new(version: &VersionString, ilk: &str) -> Self {
        Self::versioned(version).str("t", ilk)
    }

    pub(crate) fn str(mut self, key: &str, value: impl Into<String>) -> Self {
        self.map.insert(key.into(), Value::String(value.into()));
        self
    }

    pub(crate) fn hex(self, key: &str, n: u64) -> Self {
        self.str(key, crate::types::to_hex_sn(n))
    }

    pub(crate) fn strs<I, S>(mut self, key: &str, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let list = items.into_iter().map(|s| Value::String(s.into())).collect();
        self.map.insert(key.into(), Value::Array(list));
        self
    }

    pub(crate) fn seals(mut self, key: &str, seals: &[Seal]) -> Self {
        let list = seals.iter().map(Seal::to_value).collect();
        self.map.insert(key.into(), Value::Array(list));
        self
    }

    pub(crate) fn value(mut self, key: &str, value: Value) -> Self {
        self.map.insert(key.into(), value);
        self
    }

    pub(crate) fn extend(mut self, extra: &Map<String, Value>) -> Self {
        for (k, v) in extra {
            if !self.map.contains_key(k) {
                self.map.insert(k.clone(), v.clone());
            }
        }
        self
    }

    pub(crate) fn finish(self) -> Value {
        Value::Object(self.map)
    }
}
