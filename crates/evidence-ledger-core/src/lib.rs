//! # Evidence Ledger Core
//!
//! Pure primitives for the evidence ledger: content addressing, canonical
//! hashing, chain construction, and chain-of-custody verification.
//!
//! This crate contains no I/O and no storage. Bundles are loaded by
//! `evidence-ledger-store` and produced by `evidence-ledger`.
//!
//! ## Key Types
//!
//! - [`Rhid`] - Namespaced identifier of a stored object
//! - [`Manifest`] - The authoritative RHID index of a run
//! - [`LedgerEntry`] - One governed action, hash-chained to its predecessor
//! - [`Receipt`] - A decision's evidentiary backing, chained independently
//! - [`Verifier`] - Recomputes every hash and produces a [`VerificationReport`]
//!
//! ## Canonicalization
//!
//! Every hash is SHA-256 over canonical JSON. See [`canonical`] module.

pub mod canonical;
pub mod digest;
pub mod error;
pub mod ledger;
pub mod manifest;
pub mod receipt;
pub mod report;
pub mod rhid;
pub mod signer;
pub mod types;
pub mod validation;
pub mod verify;

pub use canonical::{canonical_digest, canonical_json, canonical_json_value, canonical_json_without};
pub use digest::Sha256Digest;
pub use error::{
    CanonicalError, CoreError, DigestParseError, JsonlError, RhidParseError, StructuralViolation,
};
pub use ledger::{
    parse_jsonl, to_jsonl_line, EntryDraft, LedgerChain, LedgerEntry, ACTION_GATE_RESOLVE,
    ACTION_PACK_SEAL, STATUS_SUCCESS,
};
pub use manifest::{content_type_for, IndexedManifest, Manifest, ManifestEntry, ManifestIndex};
pub use receipt::{mint_receipt, receipt_id_for, Receipt, ReceiptBuilder, ReceiptChain};
pub use report::{
    Banner, Compliance, EntryReport, EntryStatus, ExhibitReport, ExhibitStatus, Finding,
    GateState, PackStatus, ReceiptCheck, ReferenceRole, SealState, VerificationReport,
};
pub use rhid::{Rhid, RhidKind};
pub use signer::{Ed25519Signer, Signer};
pub use types::{Actor, PolicyDecision, Timestamp};
pub use validation::{validate_ledger, validate_manifest, validate_receipts};
pub use verify::{verify, EvidenceBundle, Verifier, VerifierConfig};
