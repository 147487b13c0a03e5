//! Error types for the KERI Kernel Core.

use thiserror::Error;

use crate::types::Said;

/// Core errors raised while encoding, decoding or deriving primitives.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("missing field `{0}`")]
    MissingField(String),

    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("invalid qb64 primitive: {0}")]
    InvalidQb64(String),

    #[error("unsupported version string: {0}")]
    UnsupportedVersion(String),

    #[error("non-integral number in canonical body")]
    NonCanonicalNumber,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("recovery phrase is empty")]
    EmptyPhrase,

    #[error("key derivation failed")]
    KeyDerivation,

    #[error("encoding error: {0}")]
    EncodingError(String),
}

impl CoreError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        CoreError::InvalidField {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Validation errors for event structure, log continuity and anchoring.
///
/// Every variant that concerns a log position carries both the expected and
/// the observed values so callers can decide whether to re-sync, alert, or
/// treat the peer as malicious.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("SAID mismatch: claimed {claimed}, computed {computed}")]
    SaidMismatch { claimed: Said, computed: Said },

    #[error("version string declares {declared} bytes, body has {actual}")]
    VersionSizeMismatch { declared: usize, actual: usize },

    #[error(
        "chain discontinuity in {log}: expected sn {expected_sn} prior {expected_prior:?}, \
         got sn {got_sn} prior {got_prior:?}"
    )]
    ChainDiscontinuity {
        log: Said,
        expected_sn: u64,
        got_sn: u64,
        expected_prior: Option<Said>,
        got_prior: Option<Said>,
    },

    #[error("fork detected in {log} at sn {sn}: existing {existing}, incoming {incoming}")]
    ForkDetected {
        log: Said,
        sn: u64,
        existing: Said,
        incoming: Said,
    },

    #[error("key commitment violation: committed {committed:?}, revealed {revealed:?}")]
    KeyCommitmentViolation {
        committed: Vec<Said>,
        revealed: Vec<Said>,
    },

    #[error("identifier {0} is non-transferable")]
    NonTransferable(Said),

    #[error("unknown identifier: {0}")]
    UnknownIdentifier(Said),

    #[error("log {0} is already incepted")]
    AlreadyIncepted(Said),

    #[error("log is not incepted")]
    NotIncepted,

    #[error("event belongs to {got}, not {expected}")]
    WrongLog { expected: Said, got: Said },

    #[error("invalid threshold {threshold} for {count} entries")]
    InvalidThreshold { threshold: u64, count: usize },

    #[error("credential {credential} is not issued in registry {registry}")]
    UnknownCredential { registry: Said, credential: Said },

    #[error("credential {credential} already issued in registry {registry}")]
    AlreadyIssued { registry: Said, credential: Said },

    #[error("credential {credential} already revoked in registry {registry}")]
    AlreadyRevoked { registry: Said, credential: Said },

    #[error("registry not found: {0}")]
    RegistryNotFound(Said),

    #[error("registry {registry} has no anchor in parent registry {parent}")]
    UnanchoredRegistry { registry: Said, parent: Said },

    #[error("registry {registry} names issuer {got}, expected {expected}")]
    IssuerMismatch {
        registry: Said,
        expected: Said,
        got: Said,
    },

    #[error("signature at index {index} failed verification")]
    SignatureFailed { index: u32 },

    #[error("insufficient signatures: {valid} valid, {required} required")]
    InsufficientSignatures { required: u64, valid: usize },

    #[error("structural error: {0}")]
    StructuralError(String),
}

impl ValidationError {
    /// True for errors that indicate conflicting histories rather than bad input.
    pub fn is_fork(&self) -> bool {
        matches!(self, ValidationError::ForkDetected { .. })
    }

    /// True for errors that break the sn / prior-digest chain.
    pub fn is_chain_break(&self) -> bool {
        matches!(
            self,
            ValidationError::ChainDiscontinuity { .. } | ValidationError::ForkDetected { .. }
        )
    }
}

impl From<CoreError> for ValidationError {
    fn from(e: CoreError) -> Self {
        ValidationError::MalformedInput(e.to_string())
    }
}
