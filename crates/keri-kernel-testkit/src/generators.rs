//! Proptest generators for property-based testing.

use proptest::prelude::*;
use serde_json::{Map, Value};

use keri_kernel_core::{
    next_key_digest, Blake3Hash, Ed25519PublicKey, KeyConfig, KeyEventLog, Keypair, Said, Seal,
};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a random Ed25519PublicKey.
pub fn public_key() -> impl Strategy<Value = Ed25519PublicKey> {
    keypair().prop_map(|kp| kp.public_key())
}

/// Generate a random Blake3Hash.
pub fn blake3_hash() -> impl Strategy<Value = Blake3Hash> {
    any::<[u8; 32]>().prop_map(Blake3Hash)
}

/// Generate a random SAID.
pub fn said() -> impl Strategy<Value = Said> {
    blake3_hash().prop_map(|h| Said::from_digest(&h))
}

/// Generate a recovery phrase of a few lowercase words.
pub fn phrase() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z]{3,8}", 3..8).prop_map(|words| words.join(" "))
}

/// Generate a seal.
pub fn seal() -> impl Strategy<Value = Seal> {
    (said(), 0u64..1000, said()).prop_map(|(id, sn, digest)| Seal::new(id, sn, digest))
}

/// Generate a valid establishment config: 1-4 keys, 0-4 next keys, thresholds
/// within range.
pub fn key_config() -> impl Strategy<Value = KeyConfig> {
    (
        prop::collection::vec(public_key(), 1..=4),
        prop::collection::vec(public_key(), 0..=4),
    )
        .prop_flat_map(|(keys, next)| {
            let kt = 1..=keys.len() as u64;
            let nt = if next.is_empty() {
                (0..=0u64).boxed()
            } else {
                (1..=next.len() as u64).boxed()
            };
            (Just(keys), Just(next), kt, nt)
        })
        .prop_map(|(keys, next, kt, nt)| {
            let digests = next.iter().map(next_key_digest).collect();
            KeyConfig::new(keys, digests)
                .key_threshold(kt)
                .next_threshold(nt)
        })
}

/// Generate a JSON value that is valid in an event body (no floats).
pub fn json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[ -~]{0,16}".prop_map(Value::String),
        "\\PC{0,8}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

/// Generate attribute data for a credential (reserved keys excluded).
pub fn attributes() -> impl Strategy<Value = Map<String, Value>> {
    prop::collection::btree_map("[a-z]{2,8}", json_value(), 0..5).prop_map(|m| {
        m.into_iter()
            .filter(|(k, _)| k != "d" && k != "i")
            .collect()
    })
}

/// Parameters for generating a KEL.
#[derive(Debug, Clone)]
pub struct KelParams {
    pub seed: [u8; 32],
    /// For each event after inception: `true` rotates, `false` interacts.
    pub steps: Vec<bool>,
}

impl Arbitrary for KelParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (any::<[u8; 32]>(), prop::collection::vec(any::<bool>(), 0..8))
            .prop_map(|(seed, steps)| KelParams { seed, steps })
            .boxed()
    }
}

/// Keypair for a rotation index, derived from the params seed.
fn rotation_key(seed: &[u8; 32], rotation: u8) -> Keypair {
    let mut seed = *seed;
    seed[31] ^= rotation;
    Keypair::from_seed(&seed)
}

/// Build the KEL described by `params`.
pub fn kel_from_params(params: &KelParams) -> KeyEventLog {
    let mut kel = KeyEventLog::new();
    let mut rotation = 0u8;
    let key = |r: u8| rotation_key(&params.seed, r).public_key();

    kel.incept(KeyConfig::new(vec![key(0)], vec![next_key_digest(&key(1))]))
        .expect("generated inception is valid");

    for &rotate in &params.steps {
        if rotate {
            rotation += 1;
            let config = KeyConfig::new(
                vec![key(rotation)],
                vec![next_key_digest(&key(rotation + 1))],
            );
            kel.rotate(config, &[key(rotation)])
                .expect("generated rotation is valid");
        } else {
            kel.interact(Vec::new())
                .expect("generated interaction is valid");
        }
    }
    kel
}

#[cfg(test)]
mod tests {
    use super::*;
    use keri_kernel_core::{
        canonical_json, derive_seed, said as said_engine, InceptionEvent, KeyChain, KeyEvent,
    };

    proptest! {
        #[test]
        fn test_replay_equals_incremental(params: KelParams) {
            let kel = kel_from_params(&params);
            let replayed = KeyEventLog::replay(kel.events().to_vec()).unwrap();
            prop_assert_eq!(replayed.state(), kel.state());
            prop_assert_eq!(replayed.events(), kel.events());
        }

        #[test]
        fn test_duplicate_apply_is_noop(params: KelParams) {
            let mut kel = kel_from_params(&params);
            let before = kel.state().cloned();
            for event in kel.events().to_vec() {
                kel.apply(event).unwrap();
            }
            prop_assert_eq!(kel.state().cloned(), before);
        }

        #[test]
        fn test_generated_config_incepts(config in key_config()) {
            let event = InceptionEvent::build(config, Vec::new()).unwrap();
            prop_assert!(KeyEventLog::new().apply(KeyEvent::Inception(event)).is_ok());
        }

        #[test]
        fn test_extension_data_covered_by_said(data in attributes(), config in key_config()) {
            let mut icp = InceptionEvent::build(config, Vec::new()).unwrap();
            icp.extra = data.into_iter().map(|(k, v)| (format!("x{}", k), v)).collect();
            let mut body = KeyEvent::Inception(icp).to_value();
            said_engine::derive_many(&mut body, &["d", "i"]).unwrap();
            prop_assert!(said_engine::verify_many(&body, &["d", "i"]));

            body["X-added"] = Value::Bool(true);
            prop_assert!(!said_engine::verify_many(&body, &["d", "i"]));
        }

        #[test]
        fn test_seed_derivation_deterministic(words in phrase(), rotation in 0u32..16) {
            let path = format!("signing/{}/0", rotation);
            let a = derive_seed(&words, &path).unwrap();
            let b = derive_seed(&words.to_uppercase(), &path).unwrap();
            prop_assert_eq!(a.as_bytes(), b.as_bytes());

            let chain = KeyChain::new(&words).unwrap();
            let set = chain.key_set(rotation).unwrap();
            prop_assert_eq!(&set.next, &chain.key_set(rotation + 1).unwrap().current);
        }

        #[test]
        fn test_mutated_said_fails(config in key_config(), flip in 0usize..43) {
            let event = KeyEvent::Inception(InceptionEvent::build(config, Vec::new()).unwrap());
            let mut body = event.to_value();
            let said = body["d"].as_str().unwrap().to_string();
            let mut chars: Vec<char> = said.chars().collect();
            let i = 1 + flip % (chars.len() - 1);
            chars[i] = if chars[i] == 'A' { 'B' } else { 'A' };
            body["d"] = Value::String(chars.into_iter().collect());
            prop_assert!(!said_engine::verify_many(&body, &["d", "i"]));
        }

        #[test]
        fn test_canonical_json_stable(value in json_value()) {
            let once = canonical_json(&value).unwrap();
            let reparsed: Value = serde_json::from_slice(&once).unwrap();
            prop_assert_eq!(canonical_json(&reparsed).unwrap(), once);
        }
    }
}
