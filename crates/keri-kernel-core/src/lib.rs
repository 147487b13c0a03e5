//! # KERI Kernel Core
//!
//! Pure primitives for the KERI Kernel: self-addressing identifiers, key event
//! logs, credential registries, anchoring seals and the event stream codec.
//!
//! This crate contains no I/O, no storage, no networking. It is pure computation
//! over cryptographic data structures.
//!
//! ## Key Types
//!
//! - [`Said`] - Self-addressing identifier (qb64 Blake3-256 digest)
//! - [`KeyEvent`] / [`KeyEventLog`] - Identifier events and their state machine
//! - [`TelEvent`] / [`TransactionEventLog`] - Registry events and credential status
//! - [`Seal`] - Cross-log reference, verified with [`verify_anchor`]
//! - [`Credential`] - ACDC credential with attribute and edge blocks
//!
//! ## Canonicalization
//!
//! All bodies are hashed over canonical JSON. See the [`canonical`] and
//! [`said`] modules.

pub mod acdc;
pub mod anchor;
pub mod canonical;
pub mod cesr;
pub mod codec;
pub mod crypto;
pub mod error;
pub mod event;
mod fields;
pub mod kel;
pub mod keys;
pub mod said;
pub mod seal;
pub mod signing;
pub mod tel;
pub mod tel_event;
pub mod types;
pub mod validation;

pub use acdc::{Credential, CredentialBuilder, Edge};
pub use anchor::{find_anchor, seal_for, verify_anchor, AnchoredEvent, SealHost};
pub use canonical::{canonical_json, Protocol, VersionString};
pub use codec::{parse_stream, serialize_stream, to_json_array, LogEvent, ParsedStream};
pub use crypto::{Blake3Hash, Ed25519PublicKey, Ed25519Signature, Keypair};
pub use error::{CoreError, ValidationError};
pub use event::{InceptionEvent, InteractionEvent, KeyConfig, KeyEvent, RotationEvent};
pub use kel::{ApplyOutcome, KeyEventLog, KeyState};
pub use keys::{derive_seed, keypair_from, next_key_digest, KeyChain, KeyPath, KeySet, Seed};
pub use seal::Seal;
pub use signing::{sign, verify_signatures, IndexedSignature, Signable};
pub use tel::{CredentialStatus, Registry, RegistryState, TransactionEventLog};
pub use tel_event::{IssuanceEvent, RegistryInceptionEvent, RevocationEvent, TelEvent};
pub use types::{Prefix, RegistryId, Said};
pub use validation::{validate_credential, validate_key_event, validate_tel_event};
