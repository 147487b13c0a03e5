//! Key events: inception, rotation and interaction.
//!
//! Each event is a tagged variant with a fixed required-field set plus an
//! open extension map. Bodies are decoded permissively and re-serialized
//! canonically; the SAID always covers the extension fields too.

use serde_json::{Map, Value};

use crate::canonical::{canonical_json, Protocol, VersionString};
use crate::crypto::Ed25519PublicKey;
use crate::error::CoreError;
use crate::fields::{Body, Fields};
use crate::said::{self, placeholder};
use crate::seal::Seal;
use crate::types::{Prefix, Said};

/// Current key configuration of an establishment event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyConfig {
    pub keys: Vec<Ed25519PublicKey>,
    pub key_threshold: u64,
    pub next_key_digests: Vec<Said>,
    pub next_threshold: u64,
}

impl KeyConfig {
    /// A configuration with default thresholds: half the list, rounded up.
    pub fn new(keys: Vec<Ed25519PublicKey>, next_key_digests: Vec<Said>) -> Self {
        let key_threshold = default_threshold(keys.len());
        let next_threshold = default_threshold(next_key_digests.len());
        Self {
            keys,
            key_threshold,
            next_key_digests,
            next_threshold,
        }
    }

    pub fn key_threshold(mut self, threshold: u64) -> Self {
        self.key_threshold = threshold;
        self
    }

    pub fn next_threshold(mut self, threshold: u64) -> Self {
        self.next_threshold = threshold;
        self
    }
}

fn default_threshold(len: usize) -> u64 {
    (len as u64 + 1) / 2
}

/// Inception (`icp`): establishes an identifier. `d` and `i` hold the same SAID.
#[derive(Debug, Clone, PartialEq)]
pub struct InceptionEvent {
    pub version: VersionString,
    pub said: Said,
    pub prefix: Prefix,
    pub config: KeyConfig,
    pub seals: Vec<Seal>,
    pub extra: Map<String, Value>,
}

/// Rotation (`rot`): reveals the pre-committed keys and commits to new ones.
#[derive(Debug, Clone, PartialEq)]
pub struct RotationEvent {
    pub version: VersionString,
    pub said: Said,
    pub prefix: Prefix,
    pub sn: u64,
    pub prior: Said,
    pub config: KeyConfig,
    pub seals: Vec<Seal>,
    pub extra: Map<String, Value>,
}

/// Interaction (`ixn`): anchors seals without changing key state.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionEvent {
    pub version: VersionString,
    pub said: Said,
    pub prefix: Prefix,
    pub sn: u64,
    pub prior: Said,
    pub seals: Vec<Seal>,
    pub extra: Map<String, Value>,
}

/// An event of a Key Event Log.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyEvent {
    Inception(InceptionEvent),
    Rotation(RotationEvent),
    Interaction(InteractionEvent),
}

impl InceptionEvent {
    /// Build an inception; the prefix is the SAID of the event.
    pub fn build(config: KeyConfig, seals: Vec<Seal>) -> Result<Self, CoreError> {
        let mut body = config_body(
            Body::new(&VersionString::new(Protocol::Keri, 0), "icp")
                .str("d", placeholder())
                .str("i", placeholder())
                .hex("s", 0),
            &config,
        )
        .seals("a", &seals)
        .finish();

        said::derive_many(&mut body, &["d", "i"])?;
        Self::from_value(body)
    }

    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        let mut f = Fields::open(value, "icp")?;
        let version = f.take_version()?;
        let said = f.take_said("d")?;
        let prefix = f.take_said("i")?;
        if f.take_hex("s")? != 0 {
            return Err(CoreError::invalid("s", "inception must be at sequence 0"));
        }
        let config = take_config(&mut f)?;
        let seals = f.take_seals("a")?;
        Ok(Self {
            version,
            said,
            prefix,
            config,
            seals,
            extra: f.rest(),
        })
    }

    pub fn to_value(&self) -> Value {
        config_body(
            Body::new(&self.version, "icp")
                .str("d", self.said.to_string())
                .str("i", self.prefix.to_string())
                .hex("s", 0),
            &self.config,
        )
        .seals("a", &self.seals)
        .extend(&self.extra)
        .finish()
    }
}

impl RotationEvent {
    pub fn build(
        prefix: Prefix,
        sn: u64,
        prior: Said,
        config: KeyConfig,
        seals: Vec<Seal>,
    ) -> Result<Self, CoreError> {
        let mut body = config_body(
            Body::new(&VersionString::new(Protocol::Keri, 0), "rot")
                .str("d", placeholder())
                .str("i", prefix.to_string())
                .hex("s", sn)
                .str("p", prior.to_string()),
            &config,
        )
        .seals("a", &seals)
        .finish();

        said::derive(&mut body, "d")?;
        Self::from_value(body)
    }

    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        let mut f = Fields::open(value, "rot")?;
        let version = f.take_version()?;
        let said = f.take_said("d")?;
        let prefix = f.take_said("i")?;
        let sn = f.take_hex("s")?;
        let prior = f.take_said("p")?;
        let config = take_config(&mut f)?;
        let seals = f.take_seals("a")?;
        Ok(Self {
            version,
            said,
            prefix,
            sn,
            prior,
            config,
            seals,
            extra: f.rest(),
        })
    }

    pub fn to_value(&self) -> Value {
        config_body(
            Body::new(&self.version, "rot")
                .str("d", self.said.to_string())
                .str("i", self.prefix.to_string())
                .hex("s", self.sn)
                .str("p", self.prior.to_string()),
            &self.config,
        )
        .seals("a", &self.seals)
        .extend(&self.extra)
        .finish()
    }
}

impl InteractionEvent {
    pub fn build(prefix: Prefix, sn: u64, prior: Said, seals: Vec<Seal>) -> Result<Self, CoreError> {
        let mut body = Body::new(&VersionString::new(Protocol::Keri, 0), "ixn")
            .str("d", placeholder())
            .str("i", prefix.to_string())
            .hex("s", sn)
            .str("p", prior.to_string())
            .seals("a", &seals)
            .finish();

        said::derive(&mut body, "d")?;
        Self::from_value(body)
    }

    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        let mut f = Fields::open(value, "ixn")?;
        Ok(Self {
            version: f.take_version()?,
            said: f.take_said("d")?,
            prefix: f.take_said("i")?,
            sn: f.take_hex("s")?,
            prior: f.take_said("p")?,
            seals: f.take_seals("a")?,
            extra: f.rest(),
        })
    }

    pub fn to_value(&self) -> Value {
        Body::new(&self.version, "ixn")
            .str("d", self.said.to_string())
            .str("i", self.prefix.to_string())
            .hex("s", self.sn)
            .str("p", self.prior.to_string())
            .seals("a", &self.seals)
            .extend(&self.extra)
            .finish()
    }
}

fn config_body(body: Body, config: &KeyConfig) -> Body {
    body.hex("kt", config.key_threshold)
        .strs("k", config.keys.iter().map(Ed25519PublicKey::to_qb64))
        .hex("nt", config.next_threshold)
        .strs("n", config.next_key_digests.iter().map(Said::to_string))
}

fn take_config(f: &mut Fields) -> Result<KeyConfig, CoreError> {
    Ok(KeyConfig {
        key_threshold: f.take_hex("kt")?,
        keys: f.take_keys("k")?,
        next_threshold: f.take_hex("nt")?,
        next_key_digests: f.take_saids("n")?,
    })
}

impl KeyEvent {
    /// Decode any key event, dispatching on `t`.
    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        match value.get("t").and_then(Value::as_str) {
            Some("icp") => InceptionEvent::from_value(value).map(KeyEvent::Inception),
            Some("rot") => RotationEvent::from_value(value).map(KeyEvent::Rotation),
            Some("ixn") => InteractionEvent::from_value(value).map(KeyEvent::Interaction),
            Some(other) => Err(CoreError::invalid("t", format!("not a key event: {other}"))),
            None => Err(CoreError::MissingField("t".into())),
        }
    }

    /// Decode from JSON bytes.
    pub fn from_json(bytes: &[u8]) -> Result<Self, CoreError> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| CoreError::MalformedInput(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn to_value(&self) -> Value {
        match self {
            KeyEvent::Inception(e) => e.to_value(),
            KeyEvent::Rotation(e) => e.to_value(),
            KeyEvent::Interaction(e) => e.to_value(),
        }
    }

    /// Canonical body bytes (what the SAID and signatures cover).
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, CoreError> {
        canonical_json(&self.to_value())
    }

    /// Fields holding the SAID.
    pub fn said_labels(&self) -> &'static [&'static str] {
        match self {
            KeyEvent::Inception(_) => &["d", "i"],
            _ => &["d"],
        }
    }

    pub fn ilk(&self) -> &'static str {
        match self {
            KeyEvent::Inception(_) => "icp",
            KeyEvent::Rotation(_) => "rot",
            KeyEvent::Interaction(_) => "ixn",
        }
    }

    pub fn version(&self) -> &VersionString {
        match self {
            KeyEvent::Inception(e) => &e.version,
            KeyEvent::Rotation(e) => &e.version,
            KeyEvent::Interaction(e) => &e.version,
        }
    }

    pub fn said(&self) -> &Said {
        match self {
            KeyEvent::Inception(e) => &e.said,
            KeyEvent::Rotation(e) => &e.said,
            KeyEvent::Interaction(e) => &e.said,
        }
    }

    pub fn prefix(&self) -> &Prefix {
        match self {
            KeyEvent::Inception(e) => &e.prefix,
            KeyEvent::Rotation(e) => &e.prefix,
            KeyEvent::Interaction(e) => &e.prefix,
        }
    }

    pub fn sn(&self) -> u64 {
        match self {
            KeyEvent::Inception(_) => 0,
            KeyEvent::Rotation(e) => e.sn,
            KeyEvent::Interaction(e) => e.sn,
        }
    }

    /// SAID of the prior event; `None` for inception.
    pub fn prior(&self) -> Option<&Said> {
        match self {
            KeyEvent::Inception(_) => None,
            KeyEvent::Rotation(e) => Some(&e.prior),
            KeyEvent::Interaction(e) => Some(&e.prior),
        }
    }

    pub fn seals(&self) -> &[Seal] {
        match self {
            KeyEvent::Inception(e) => &e.seals,
            KeyEvent::Rotation(e) => &e.seals,
            KeyEvent::Interaction(e) => &e.seals,
        }
    }

    /// Key configuration for establishment events.
    pub fn config(&self) -> Option<&KeyConfig> {
        match self {
            KeyEvent::Inception(e) => Some(&e.config),
            KeyEvent::Rotation(e) => Some(&e.config),
            KeyEvent::Interaction(_) => None,
        }
    }

    pub fn is_establishment(&self) -> bool {
        self.config().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use crate::keys::next_key_digest;
    use crate::said::verify_many;

    fn config() -> KeyConfig {
        let k0 = Keypair::from_seed(&[1u8; 32]).public_key();
        let k1 = Keypair::from_seed(&[2u8; 32]).public_key();
        KeyConfig::new(vec![k0], vec![next_key_digest(&k1)])
    }

    #[test]
    fn test_default_thresholds() {
        assert_eq!(default_threshold(0), 0);
        assert_eq!(default_threshold(1), 1);
        assert_eq!(default_threshold(2), 1);
        assert_eq!(default_threshold(3), 2);
    }

    #[test]
    fn test_inception_prefix_is_said() {
        let icp = InceptionEvent::build(config(), vec![]).unwrap();
        assert_eq!(icp.said, icp.prefix);
        assert!(verify_many(&icp.to_value(), &["d", "i"]));
    }

    #[test]
    fn test_inception_value_roundtrip() {
        let icp = KeyEvent::Inception(InceptionEvent::build(config(), vec![]).unwrap());
        let back = KeyEvent::from_value(icp.to_value()).unwrap();
        assert_eq!(back, icp);
        assert_eq!(back.canonical_bytes().unwrap(), icp.canonical_bytes().unwrap());
    }

    #[test]
    fn test_extension_fields_preserved() {
        let icp = InceptionEvent::build(config(), vec![]).unwrap();
        let mut value = icp.to_value();
        value["bt"] = serde_json::json!("0");
        let decoded = InceptionEvent::from_value(value.clone()).unwrap();
        assert_eq!(decoded.extra.get("bt"), Some(&serde_json::json!("0")));
        assert_eq!(decoded.to_value(), value);
    }

    #[test]
    fn test_missing_required_field() {
        let icp = InceptionEvent::build(config(), vec![]).unwrap();
        let mut value = icp.to_value();
        value.as_object_mut().unwrap().remove("kt");
        assert_eq!(
            InceptionEvent::from_value(value).unwrap_err(),
            CoreError::MissingField("kt".into())
        );
    }

    #[test]
    fn test_wrong_ilk_rejected() {
        let icp = InceptionEvent::build(config(), vec![]).unwrap();
        assert!(RotationEvent::from_value(icp.to_value()).is_err());
        assert!(KeyEvent::from_value(serde_json::json!({"t": "vcp"})).is_err());
    }

    #[test]
    fn test_interaction_chains_to_prior() {
        let icp = InceptionEvent::build(config(), vec![]).unwrap();
        let ixn =
            InteractionEvent::build(icp.prefix.clone(), 1, icp.said.clone(), vec![]).unwrap();
        let event = KeyEvent::Interaction(ixn);
        assert_eq!(event.sn(), 1);
        assert_eq!(event.prior(), Some(&icp.said));
        assert!(!event.is_establishment());
    }
}
