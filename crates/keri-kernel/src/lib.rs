//! # KERI Kernel
//!
//! Self-certifying identifiers and credential registries over an append-only
//! log store.
//!
//! ## Overview
//!
//! - **Identifiers**: a Key Event Log (KEL) of inception, rotation and
//!   interaction events under pre-rotation; the identifier is the SAID of its
//!   inception
//! - **Registries**: a Transaction Event Log (TEL) per registry recording
//!   credential issuance and revocation, anchored into the issuer's KEL
//! - **Credentials**: ACDC bodies identified by their SAID; status comes from
//!   the TEL
//! - **Streams**: export and import of logs as `version-token || body` streams
//!
//! ## Usage
//!
//! ```rust,no_run
//! use keri_kernel::{Kernel, KernelConfig};
//! use keri_kernel::core::{KeyChain, KeyConfig};
//! use keri_kernel::store::SqliteStore;
//!
//! async fn example() {
//!     let store = SqliteStore::open("kernel.db").unwrap();
//!     let kernel = Kernel::new(store, KernelConfig::default());
//!
//!     // Keys are derived by the caller; the kernel never holds secrets.
//!     let chain = KeyChain::new("correct horse battery staple").unwrap();
//!     let keys = chain.key_set(0).unwrap();
//!     let icp = kernel
//!         .create_identifier(KeyConfig::new(keys.current, keys.next_digests))
//!         .await
//!         .unwrap();
//!
//!     let vcp = kernel.create_registry(icp.prefix(), None).await.unwrap();
//!     println!("registry {}", vcp.registry_id());
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `keri_kernel::core` - Core primitives (SAIDs, events, logs, credentials)
//! - `keri_kernel::store` - Storage abstraction and SQLite

pub mod config;
pub mod error;
pub mod kernel;

// Re-export component crates
pub use keri_kernel_core as core;
pub use keri_kernel_store as store;

// Re-export main types for convenience
pub use config::KernelConfig;
pub use error::{KernelError, Result};
pub use kernel::{ImportReport, Kernel};

// Re-export commonly used core types
pub use keri_kernel_core::{
    ApplyOutcome, Credential, CredentialBuilder, CredentialStatus, IndexedSignature, KeyConfig,
    KeyEvent, KeyState, Prefix, Registry, RegistryId, Said, Seal, TelEvent,
};
