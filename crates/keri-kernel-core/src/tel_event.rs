//! Transaction events: registry inception, issuance and revocation.

use rand::RngCore;
use serde_json::{Map, Value};

use crate::canonical::{canonical_json, Protocol, VersionString};
use crate::cesr::{self, Code};
use crate::error::CoreError;
use crate::fields::{Body, Fields};
use crate::said::{self, placeholder};
use crate::seal::Seal;
use crate::types::{Prefix, RegistryId, Said};

/// A random 128-bit nonce in qb64 form.
pub fn random_nonce() -> String {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    cesr::encode(Code::Salt128, &salt).unwrap_or_default()
}

/// Registry inception (`vcp`). `d` and `i` hold the registry id.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryInceptionEvent {
    pub version: VersionString,
    pub said: Said,
    pub registry_id: RegistryId,
    /// Issuer AID (`ii`).
    pub issuer: Prefix,
    /// Nonce (`n`) making registries of one issuer distinct.
    pub nonce: String,
    /// Parent registry (`pr`) for nested registries.
    pub parent: Option<RegistryId>,
    pub extra: Map<String, Value>,
}

/// Issuance (`iss`): records a credential SAID as issued.
#[derive(Debug, Clone, PartialEq)]
pub struct IssuanceEvent {
    pub version: VersionString,
    pub said: Said,
    /// Credential SAID (`i`).
    pub credential: Said,
    pub sn: u64,
    /// Registry id (`ri`).
    pub registry_id: RegistryId,
    pub prior: Said,
    /// Optional seals (`a`), e.g. anchoring a child registry.
    pub seals: Option<Vec<Seal>>,
    pub extra: Map<String, Value>,
}

/// Revocation (`rev`): marks an issued credential as revoked.
#[derive(Debug, Clone, PartialEq)]
pub struct RevocationEvent {
    pub version: VersionString,
    pub said: Said,
    pub credential: Said,
    pub sn: u64,
    pub registry_id: RegistryId,
    pub prior: Said,
    pub seals: Option<Vec<Seal>>,
    pub extra: Map<String, Value>,
}

/// An event of a Transaction Event Log.
#[derive(Debug, Clone, PartialEq)]
pub enum TelEvent {
    Inception(RegistryInceptionEvent),
    Issuance(IssuanceEvent),
    Revocation(RevocationEvent),
}

impl RegistryInceptionEvent {
    pub fn build(
        issuer: Prefix,
        parent: Option<RegistryId>,
        nonce: String,
    ) -> Result<Self, CoreError> {
        let mut body = Body::new(&VersionString::new(Protocol::Keri, 0), "vcp")
            .str("d", placeholder())
            .str("i", placeholder())
            .str("ii", issuer.to_string())
            .hex("s", 0)
            .str("n", nonce);
        if let Some(parent) = &parent {
            body = body.str("pr", parent.to_string());
        }
        let mut body = body.finish();

        said::derive_many(&mut body, &["d", "i"])?;
        Self::from_value(body)
    }

    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        let mut f = Fields::open(value, "vcp")?;
        let version = f.take_version()?;
        let said = f.take_said("d")?;
        let registry_id = f.take_said("i")?;
        let issuer = f.take_said("ii")?;
        if f.take_hex("s")? != 0 {
            return Err(CoreError::invalid("s", "registry inception must be at sequence 0"));
        }
        let nonce = f.take_str("n")?;
        let parent = f.take_opt_said("pr")?;
        Ok(Self {
            version,
            said,
            registry_id,
            issuer,
            nonce,
            parent,
            extra: f.rest(),
        })
    }

    pub fn to_value(&self) -> Value {
        let mut body = Body::new(&self.version, "vcp")
            .str("d", self.said.to_string())
            .str("i", self.registry_id.to_string())
            .str("ii", self.issuer.to_string())
            .hex("s", 0)
            .str("n", self.nonce.clone());
        if let Some(parent) = &self.parent {
            body = body.str("pr", parent.to_string());
        }
        body.extend(&self.extra).finish()
    }
}

#[allow(clippy::too_many_arguments)]
fn transfer_body(
    version: &VersionString,
    ilk: &str,
    said: &str,
    credential: &Said,
    sn: u64,
    registry_id: &RegistryId,
    prior: &Said,
    seals: Option<&[Seal]>,
) -> Body {
    let body = Body::new(version, ilk)
        .str("d", said)
        .str("i", credential.to_string())
        .hex("s", sn)
        .str("ri", registry_id.to_string())
        .str("p", prior.to_string());
    match seals {
        Some(seals) => body.seals("a", seals),
        None => body,
    }
}

impl IssuanceEvent {
    pub fn build(
        credential: Said,
        registry_id: RegistryId,
        sn: u64,
        prior: Said,
        seals: Option<Vec<Seal>>,
    ) -> Result<Self, CoreError> {
        let mut body = transfer_body(
            &VersionString::new(Protocol::Keri, 0),
            "iss",
            &placeholder(),
            &credential,
            sn,
            &registry_id,
            &prior,
            seals.as_deref(),
        )
        .finish();

        said::derive(&mut body, "d")?;
        Self::from_value(body)
    }

    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        let mut f = Fields::open(value, "iss")?;
        Ok(Self {
            version: f.take_version()?,
            said: f.take_said("d")?,
            credential: f.take_said("i")?,
            sn: f.take_hex("s")?,
            registry_id: f.take_said("ri")?,
            prior: f.take_said("p")?,
            seals: f.take_opt_seals("a")?,
            extra: f.rest(),
        })
    }

    pub fn to_value(&self) -> Value {
        transfer_body(
            &self.version,
            "iss",
            self.said.as_str(),
            &self.credential,
            self.sn,
            &self.registry_id,
            &self.prior,
            self.seals.as_deref(),
        )
        .extend(&self.extra)
        .finish()
    }
}

impl RevocationEvent {
    pub fn build(
        credential: Said,
        registry_id: RegistryId,
        sn: u64,
        prior: Said,
        seals: Option<Vec<Seal>>,
    ) -> Result<Self, CoreError> {
        let mut body = transfer_body(
            &VersionString::new(Protocol::Keri, 0),
            "rev",
            &placeholder(),
            &credential,
            sn,
            &registry_id,
            &prior,
            seals.as_deref(),
        )
        .finish();

        said::derive(&mut body, "d")?;
        Self::from_value(body)
    }

    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        let mut f = Fields::open(value, "rev")?;
        Ok(Self {
            version: f.take_version()?,
            said: f.take_said("d")?,
            credential: f.take_said("i")?,
            sn: f.take_hex("s")?,
            registry_id: f.take_said("ri")?,
            prior: f.take_said("p")?,
            seals: f.take_opt_seals("a")?,
            extra: f.rest(),
        })
    }

    pub fn to_value(&self) -> Value {
        transfer_body(
            &self.version,
            "rev",
            self.said.as_str(),
            &self.credential,
            self.sn,
            &self.registry_id,
            &self.prior,
            self.seals.as_deref(),
        )
        .extend(&self.extra)
        .finish()
    }
}

impl TelEvent {
    /// Decode any transaction event, dispatching on `t`.
    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        match value.get("t").and_then(Value::as_str) {
            Some("vcp") => RegistryInceptionEvent::from_value(value).map(TelEvent::Inception),
            Some("iss") => IssuanceEvent::from_value(value).map(TelEvent::Issuance),
            Some("rev") => RevocationEvent::from_value(value).map(TelEvent::Revocation),
            Some(other) => Err(CoreError::invalid(
                "t",
                format!("not a transaction event: {other}"),
            )),
            None => Err(CoreError::MissingField("t".into())),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            TelEvent::Inception(e) => e.to_value(),
            TelEvent::Issuance(e) => e.to_value(),
            TelEvent::Revocation(e) => e.to_value(),
        }
    }

    pub fn canonical_bytes(&self) -> Result<Vec<u8>, CoreError> {
        canonical_json(&self.to_value())
    }

    pub fn said_labels(&self) -> &'static [&'static str] {
        match self {
            TelEvent::Inception(_) => &["d", "i"],
            _ => &["d"],
        }
    }

    pub fn ilk(&self) -> &'static str {
        match self {
            TelEvent::Inception(_) => "vcp",
            TelEvent::Issuance(_) => "iss",
            TelEvent::Revocation(_) => "rev",
        }
    }

    pub fn version(&self) -> &VersionString {
        match self {
            TelEvent::Inception(e) => &e.version,
            TelEvent::Issuance(e) => &e.version,
            TelEvent::Revocation(e) => &e.version,
        }
    }

    pub fn said(&self) -> &Said {
        match self {
            TelEvent::Inception(e) => &e.said,
            TelEvent::Issuance(e) => &e.said,
            TelEvent::Revocation(e) => &e.said,
        }
    }

    /// The registry this event belongs to.
    pub fn registry_id(&self) -> &RegistryId {
        match self {
            TelEvent::Inception(e) => &e.registry_id,
            TelEvent::Issuance(e) => &e.registry_id,
            TelEvent::Revocation(e) => &e.registry_id,
        }
    }

    pub fn sn(&self) -> u64 {
        match self {
            TelEvent::Inception(_) => 0,
            TelEvent::Issuance(e) => e.sn,
            TelEvent::Revocation(e) => e.sn,
        }
    }

    pub fn prior(&self) -> Option<&Said> {
        match self {
            TelEvent::Inception(_) => None,
            TelEvent::Issuance(e) => Some(&e.prior),
            TelEvent::Revocation(e) => Some(&e.prior),
        }
    }

    /// Credential SAID for issuance and revocation.
    pub fn credential(&self) -> Option<&Said> {
        match self {
            TelEvent::Inception(_) => None,
            TelEvent::Issuance(e) => Some(&e.credential),
            TelEvent::Revocation(e) => Some(&e.credential),
        }
    }

    pub fn seals(&self) -> &[Seal] {
        match self {
            TelEvent::Inception(_) => &[],
            TelEvent::Issuance(e) => e.seals.as_deref().unwrap_or(&[]),
            TelEvent::Revocation(e) => e.seals.as_deref().unwrap_or(&[]),
        }
    }
}
