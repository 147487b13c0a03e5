//! ACDC credentials.
//!
//! A credential is a SAID-addressed body:
//!
//! ```text
//! { v: "ACDC10JSON…_", d: SAID, i: issuer, ri?: registry, s: schema,
//!   a: { d: SAID, i?: holder, ...data },
//!   e?: { d: SAID, <label>: { n: credential SAID, s: schema SAID } } }
//! ```
//!
//! The attribute and edge blocks carry their own SAIDs, derived before the
//! outer SAID so the outer digest covers them. Status is not part of the
//! credential; it comes from the registry's TEL.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::canonical::{canonical_json, Protocol, VersionString};
use crate::error::{CoreError, ValidationError};
use crate::fields::{Body, Fields};
use crate::said::{self, placeholder};
use crate::types::{Prefix, RegistryId, Said};
use crate::validation::check_version;

/// Attribute block (`a`).
#[derive(Debug, Clone, PartialEq)]
pub struct Attributes {
    pub said: Said,
    pub holder: Option<Prefix>,
    pub data: Map<String, Value>,
}

/// A labelled edge to another credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    /// SAID of the referenced credential (`n`).
    pub credential: Said,
    /// Schema of the referenced credential (`s`).
    pub schema: Said,
}

/// Edge block (`e`).
#[derive(Debug, Clone, PartialEq)]
pub struct Edges {
    pub said: Said,
    pub edges: BTreeMap<String, Edge>,
}

/// An issued credential.
#[derive(Debug, Clone, PartialEq)]
pub struct Credential {
    pub version: VersionString,
    pub said: Said,
    pub issuer: Prefix,
    pub registry: Option<RegistryId>,
    pub schema: Said,
    pub attributes: Attributes,
    pub edges: Option<Edges>,
    pub extra: Map<String, Value>,
}

impl Attributes {
    fn body(said: &str, holder: Option<&Prefix>, data: &Map<String, Value>) -> Value {
        let mut map = data.clone();
        map.insert("d".into(), Value::String(said.to_string()));
        if let Some(holder) = holder {
            map.insert("i".into(), Value::String(holder.to_string()));
        }
        Value::Object(map)
    }

    pub fn to_value(&self) -> Value {
        Self::body(self.said.as_str(), self.holder.as_ref(), &self.data)
    }

    fn from_map(mut map: Map<String, Value>) -> Result<Self, CoreError> {
        let said = take_said(&mut map, "a.d")?
            .ok_or_else(|| CoreError::MissingField("a.d".into()))?;
        let holder = take_said(&mut map, "a.i")?;
        Ok(Self {
            said,
            holder,
            data: map,
        })
    }
}

impl Edge {
    fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("n".into(), Value::String(self.credential.to_string()));
        map.insert("s".into(), Value::String(self.schema.to_string()));
        Value::Object(map)
    }

    fn from_value(label: &str, value: Value) -> Result<Self, CoreError> {
        let field = |key: &str| -> Result<Said, CoreError> {
            let text = value
                .get(key)
                .and_then(Value::as_str)
                .ok_or_else(|| CoreError::MissingField(format!("e.{label}.{key}")))?;
            Said::parse(text)
        };
        Ok(Self {
            credential: field("n")?,
            schema: field("s")?,
        })
    }
}

impl Edges {
    fn body(said: &str, edges: &BTreeMap<String, Edge>) -> Value {
        let mut map = Map::new();
        map.insert("d".into(), Value::String(said.to_string()));
        for (label, edge) in edges {
            map.insert(label.clone(), edge.to_value());
        }
        Value::Object(map)
    }

    pub fn to_value(&self) -> Value {
        Self::body(self.said.as_str(), &self.edges)
    }

    fn from_map(mut map: Map<String, Value>) -> Result<Self, CoreError> {
        let said = take_said(&mut map, "e.d")?
            .ok_or_else(|| CoreError::MissingField("e.d".into()))?;
        let edges: BTreeMap<String, Edge> = map
            .into_iter()
            .map(|(label, value)| Edge::from_value(&label, value).map(|edge| (label, edge)))
            .collect::<Result<_, CoreError>>()?;
        Ok(Self { said, edges })
    }
}

fn take_said(map: &mut Map<String, Value>, name: &str) -> Result<Option<Said>, CoreError> {
    let key = name.rsplit('.').next().unwrap_or(name);
    match map.remove(key) {
        None => Ok(None),
        Some(Value::String(s)) => Said::parse(&s)
            .map(Some)
            .map_err(|e| CoreError::invalid(name, e.to_string())),
        Some(_) => Err(CoreError::invalid(name, "expected a string")),
    }
}

fn outer_body(
    version: &VersionString,
    said: &str,
    issuer: &Prefix,
    registry: Option<&RegistryId>,
    schema: &Said,
    attributes: Value,
    edges: Option<Value>,
) -> Body {
    let mut body = Body::versioned(version)
        .str("d", said)
        .str("i", issuer.to_string());
    if let Some(registry) = registry {
        body = body.str("ri", registry.to_string());
    }
    body = body.str("s", schema.to_string()).value("a", attributes);
    if let Some(edges) = edges {
        body = body.value("e", edges);
    }
    body
}

impl Credential {
    pub fn to_value(&self) -> Value {
        outer_body(
            &self.version,
            self.said.as_str(),
            &self.issuer,
            self.registry.as_ref(),
            &self.schema,
            self.attributes.to_value(),
            self.edges.as_ref().map(Edges::to_value),
        )
        .extend(&self.extra)
        .finish()
    }

    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        let mut f = Fields::new(value)?;
        let version = f.take_version()?;
        let said = f.take_said("d")?;
        let issuer = f.take_said("i")?;
        let registry = f.take_opt_said("ri")?;
        let schema = f.take_said("s")?;
        let attributes = Attributes::from_map(f.take_object("a")?)?;
        let edges = f.take_opt_object("e")?.map(Edges::from_map).transpose()?;
        Ok(Self {
            version,
            said,
            issuer,
            registry,
            schema,
            attributes,
            edges,
            extra: f.rest(),
        })
    }

    pub fn canonical_bytes(&self) -> Result<Vec<u8>, CoreError> {
        canonical_json(&self.to_value())
    }

    /// Check the attribute, edge and outer SAIDs and the version string.
    pub fn verify(&self) -> Result<Said, ValidationError> {
        said::check(&self.attributes.to_value(), &["d"])?;
        if let Some(edges) = &self.edges {
            said::check(&edges.to_value(), &["d"])?;
        }
        let body = self.to_value();
        let said = said::check(&body, &["d"])?;
        check_version(&body, &self.version, Protocol::Acdc)?;
        Ok(said)
    }
}

/// Builds and SAIDs a credential.
#[derive(Debug, Clone)]
pub struct CredentialBuilder {
    issuer: Prefix,
    schema: Said,
    registry: Option<RegistryId>,
    holder: Option<Prefix>,
    data: Map<String, Value>,
    edges: BTreeMap<String, Edge>,
}

impl CredentialBuilder {
    pub fn new(issuer: Prefix, schema: Said) -> Self {
        Self {
            issuer,
            schema,
            registry: None,
            holder: None,
            data: Map::new(),
            edges: BTreeMap::new(),
        }
    }

    pub fn registry(mut self, registry: RegistryId) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn holder(mut self, holder: Prefix) -> Self {
        self.holder = Some(holder);
        self
    }

    pub fn attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    pub fn data(mut self, data: Map<String, Value>) -> Self {
        self.data.extend(data);
        self
    }

    pub fn edge(mut self, label: impl Into<String>, edge: Edge) -> Self {
        self.edges.insert(label.into(), edge);
        self
    }

    pub fn build(self) -> Result<Credential, CoreError> {
        for reserved in ["d", "i"] {
            if self.data.contains_key(reserved) {
                return Err(CoreError::invalid(
                    reserved,
                    "reserved in the attribute block",
                ));
            }
        }
        if self.edges.contains_key("d") {
            return Err(CoreError::invalid("d", "reserved in the edge block"));
        }

        let mut attributes = Attributes::body(&placeholder(), self.holder.as_ref(), &self.data);
        said::derive(&mut attributes, "d")?;

        let edges = if self.edges.is_empty() {
            None
        } else {
            let mut edges = Edges::body(&placeholder(), &self.edges);
            said::derive(&mut edges, "d")?;
            Some(edges)
        };

        let mut body = outer_body(
            &VersionString::new(Protocol::Acdc, 0),
            &placeholder(),
            &self.issuer,
            self.registry.as_ref(),
            &self.schema,
            attributes,
            edges,
        )
        .finish();

        said::derive(&mut body, "d")?;
        Credential::from_value(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Blake3Hash;
    use serde_json::json;

    fn said(tag: &[u8]) -> Said {
        Said::from_digest(&Blake3Hash::hash(tag))
    }

    fn credential() -> Credential {
        CredentialBuilder::new(said(b"issuer"), said(b"schema"))
            .registry(said(b"registry"))
            .holder(said(b"holder"))
            .attribute("name", json!("Alice"))
            .attribute("score", json!(42))
            .edge("parent", Edge { credential: said(b"parent"), schema: said(b"schema") })
            .build()
            .unwrap()
    }

    #[test]
    fn test_built_credential_verifies() {
        let cred = credential();
        assert_eq!(cred.verify().unwrap(), cred.said);
        assert_eq!(cred.version.protocol, Protocol::Acdc);
        assert!(cred.to_value().get("t").is_none());
    }

    #[test]
    fn test_value_roundtrip() {
        let cred = credential();
        let back = Credential::from_value(cred.to_value()).unwrap();
        assert_eq!(back, cred);
    }

    #[test]
    fn test_tampered_attribute_fails() {
        let cred = credential();
        let mut value = cred.to_value();
        value["a"]["name"] = json!("Mallory");
        let tampered = Credential::from_value(value).unwrap();
        assert!(matches!(
            tampered.verify(),
            Err(ValidationError::SaidMismatch { .. })
        ));
    }

    #[test]
    fn test_minimal_credential() {
        let cred = CredentialBuilder::new(said(b"issuer"), said(b"schema"))
            .build()
            .unwrap();
        assert!(cred.verify().is_ok());
        assert!(cred.edges.is_none());
        assert!(cred.registry.is_none());
        assert!(cred.attributes.holder.is_none());
    }

    #[test]
    fn test_reserved_attribute_rejected() {
        let result = CredentialBuilder::new(said(b"issuer"), said(b"schema"))
            .attribute("d", json!("x"))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_credential_said_differs_per_holder() {
        let a = CredentialBuilder::new(said(b"issuer"), said(b"schema"))
            .holder(said(b"alice"))
            .build()
            .unwrap();
        let b = CredentialBuilder::new(said(b"issuer"), said(b"schema"))
            .holder(said(b"bob"))
            .build()
            .unwrap();
        assert_ne!(a.said, b.said);
    }
}
