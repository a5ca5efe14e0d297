//! # Evidence Ledger Testkit
//!
//! Testing utilities for the evidence ledger.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Known RHIDs, receipt ids, canonical bytes and chain
//!   hashes for cross-implementation verification
//! - **Generators**: Proptest strategies for generated runs
//! - **Fixtures**: The reference scenarios (happy path, gate deny, missing
//!   manifest entry) recorded through a real writer
//!
//! ## Golden Vectors
//!
//! ```rust
//! use evidence_ledger_testkit::vectors::all_vectors;
//!
//! for vector in all_vectors() {
//!     assert!(vector.holds(), "{}", vector.name);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use evidence_ledger_testkit::{actions, actions_bundle};
//!
//! proptest! {
//!     #[test]
//!     fn generated_runs_verify(run in actions(8)) {
//!         let bundle = actions_bundle(&run);
//!         let report = evidence_ledger_core::Verifier::default().verify(&bundle).unwrap();
//!         prop_assert!(report.is_valid());
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use evidence_ledger_testkit::fixtures::{scenario_bundle, Scenario};
//!
//! let bundle = scenario_bundle(Scenario::HappyPath);
//! assert_eq!(bundle.ledger.len(), 5);
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{actions_bundle, block_on, record_actions, scenario_bundle, Scenario, PHANTOM_RHID};
pub use generators::{actions, ActionSpec};
pub use vectors::{all_vectors, verify_all_vectors, GoldenVector};
