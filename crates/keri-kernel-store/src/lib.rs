//! # KERI Kernel Store
//!
//! Storage abstraction for the KERI Kernel. Provides a trait-based interface
//! for append-only KEL and TEL persistence with SQLite and in-memory
//! implementations.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`LogId`] / [`StoredEvent`] - A log and an event's canonical bytes in it
//! - [`InsertResult`] - Result of appending an event
//! - [`Fork`] - Evidence of a refused competing event
//!
//! ## Usage
//!
//! ```rust,no_run
//! use keri_kernel_store::{SqliteStore, StoreExt};
//! use keri_kernel_core::Said;
//!
//! async fn example(prefix: Said) {
//!     let store = SqliteStore::open("kernel.db").unwrap();
//!     let kel = store.load_kel(&prefix).await.unwrap();
//!     println!("{} events", kel.len());
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Idempotent appends**: Appending the same event twice returns `AlreadyExists`
//! - **Conflict detection**: A different event at the same position returns `Conflict`
//! - **Head precondition**: Appends name the prior SAID they build on; a moved
//!   head returns `StaleHead`
//! - **No validation**: the store holds bytes; the kernel validates before appending

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{
    Fork, InsertResult, LogId, LogKind, Store, StoreExt, StoredCredential, StoredEvent,
};
