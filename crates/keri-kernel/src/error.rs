//! Error types for the Kernel.

use keri_kernel_core::{CoreError, Prefix, RegistryId, Said, ValidationError};
use keri_kernel_store::{LogId, StoreError};
use thiserror::Error;

/// Errors that can occur during Kernel operations.
#[derive(Debug, Error)]
pub enum KernelError {
    /// Encoding or decoding error.
    #[error("malformed input: {0}")]
    Core(#[from] CoreError),

    /// Protocol validation error.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// No KEL for this identifier.
    #[error("unknown identifier: {0}")]
    UnknownIdentifier(Prefix),

    /// No TEL for this registry.
    #[error("registry not found: {0}")]
    RegistryNotFound(RegistryId),

    /// No stored credential with this SAID.
    #[error("credential not found: {0}")]
    CredentialNotFound(Said),

    /// The log head moved between validation and append.
    ///
    /// Registry operations write the anchor (a KEL interaction, or the
    /// parent registry's issuance for a child registry) before the TEL
    /// event. When the TEL append fails with this error the anchor is not
    /// rolled back: the host log keeps a seal for an event that was never
    /// stored. Retrying appends a fresh anchor.
    #[error("conflict on {log} at sn {sn}: head is {head:?}")]
    Conflict {
        log: LogId,
        sn: u64,
        head: Option<Said>,
    },

    /// Rejected before anything was applied.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// Invalid operation.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl KernelError {
    /// The protocol error, if this is one.
    pub fn validation(&self) -> Option<&ValidationError> {
        match self {
            KernelError::Validation(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type for Kernel operations.
pub type Result<T> = std::result::Result<T, KernelError>;
