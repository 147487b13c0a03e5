//! # KERI Kernel Testkit
//!
//! Testing utilities for the KERI Kernel.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Determinism vectors**: phrase-to-prefix cases for cross-implementation checks
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: A phrase-driven [`Controller`] and kernel setup helpers
//!
//! ## Determinism Vectors
//!
//! ```rust
//! use keri_kernel_testkit::vectors::{all_vectors, prefix_from_vector};
//!
//! for vector in all_vectors() {
//!     let prefix = prefix_from_vector(&vector).unwrap();
//!     println!("{}: {}", vector.name, prefix);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use keri_kernel_testkit::generators::{kel_from_params, KelParams};
//!
//! proptest! {
//!     #[test]
//!     fn kel_is_deterministic(params: KelParams) {
//!         let a = kel_from_params(&params);
//!         let b = kel_from_params(&params);
//!         prop_assert_eq!(a.state(), b.state());
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,ignore
//! use keri_kernel_testkit::fixtures::{memory_kernel, Controller};
//!
//! let kernel = memory_kernel();
//! let mut controller = Controller::new("alpha beta gamma")?;
//! let icp = controller.incept(&kernel).await?;
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{
    memory_kernel, multi_party_controllers, sample_credential, schema_said, Controller,
};
pub use generators::{kel_from_params, KelParams};
pub use vectors::{all_vectors, prefix_from_vector, verify_all_vectors, DeterminismVector};
