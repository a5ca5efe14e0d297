//! Error types for the evidence ledger API.

use evidence_ledger_core::{CanonicalError, CoreError, Rhid, StructuralViolation};
use evidence_ledger_store::StoreError;
use thiserror::Error;

/// Errors that can occur while producing or loading a bundle.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Storage error. The append-only guarantee is at risk; never ignored.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// The bundle cannot be verified at all.
    #[error("structural violation: {0}")]
    Structural(#[from] StructuralViolation),

    #[error(transparent)]
    Canonical(#[from] CanonicalError),

    /// The run has a `pack.seal` entry; nothing more may be written.
    #[error("bundle is sealed")]
    Sealed,

    /// The seed of a new object collides with a registered one.
    #[error("rhid {0} is already registered")]
    DuplicateRhid(Rhid),

    /// Another writer appended first. Nothing from this append reached the
    /// ledger.
    #[error("ledger tail moved: tried seq {expected}, ledger holds {tail_len} entries")]
    TailConflict { expected: u64, tail_len: u64 },

    /// A bundle with no manifest document.
    #[error("bundle has no manifest")]
    MissingManifest,

    /// The ledger references a receipt the store does not hold.
    #[error("receipt {0} referenced by the ledger is not in the store")]
    MissingReceipt(Rhid),
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
