//! # Evidence Ledger
//!
//! The unified API for producing and auditing evidence bundles: an
//! append-only action ledger and an independent receipt chain, both
//! hash-linked, with every referenced object content-addressed in a
//! manifest.
//!
//! ## Overview
//!
//! - **Producing**: [`EvidenceWriter`] is the single writer of a run. It
//!   registers objects, mints one receipt per action, and chains every
//!   ledger entry to its predecessor.
//! - **Auditing**: [`load_bundle`] and [`verify_store`] read a bundle back
//!   and run the chain-of-custody [`Verifier`] over it. The verifier never
//!   trusts the producer; it recomputes every hash.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use evidence_ledger::{ActionRequest, EvidenceWriter, WriterConfig};
//! use evidence_ledger::core::{Actor, PolicyDecision, RhidKind};
//! use evidence_ledger::store::FsStore;
//!
//! async fn example() -> evidence_ledger::Result<()> {
//!     let store = FsStore::open("bundle").await?;
//!     let writer = EvidenceWriter::new(store, WriterConfig::new("run-0001"));
//!     let reviewer = Actor::new("human:reviewer", "human", "Reviewer");
//!
//!     let plan = writer
//!         .register(b"# Plan", RhidKind::Artifact, "plan.md", &reviewer, None)
//!         .await?;
//!     writer
//!         .append(
//!             ActionRequest::new("step-1", &reviewer, "gate.resolve")
//!                 .input(plan)
//!                 .decision(PolicyDecision::Allow),
//!         )
//!         .await?;
//!     writer
//!         .append(ActionRequest::new("step-2", &reviewer, "pack.seal"))
//!         .await?;
//!
//!     let report = writer.verify().await?;
//!     assert!(report.is_valid() && report.pack.sealed());
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `evidence_ledger::core` - Primitives and the verifier
//! - `evidence_ledger::store` - Storage abstraction and backends

pub mod bundle;
pub mod clock;
pub mod config;
pub mod error;
pub mod writer;

// Re-export component crates
pub use evidence_ledger_core as core;
pub use evidence_ledger_store as store;

pub use bundle::{load_bundle, verify_store};
pub use clock::LogicalClock;
pub use config::WriterConfig;
pub use error::{LedgerError, Result};
pub use writer::{ActionRequest, AppendOutcome, EvidenceWriter};

// Re-export commonly used core types
pub use evidence_ledger_core::{
    Actor, Banner, EvidenceBundle, Finding, LedgerEntry, Manifest, PolicyDecision, Receipt, Rhid,
    RhidKind, VerificationReport, Verifier, VerifierConfig,
};
