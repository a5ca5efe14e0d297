//! Error types for the evidence ledger core.

use thiserror::Error;

use crate::rhid::Rhid;

/// A digest string that is not `sha256:<64 lowercase hex>`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DigestParseError {
    #[error("digest must start with \"sha256:\"")]
    MissingPrefix,

    #[error("digest must carry 64 hex characters, got {0}")]
    InvalidLength(usize),

    #[error("digest contains non-hex or uppercase characters")]
    InvalidHex,
}

/// An RHID string that does not match `rhid:<kind>:<fingerprint>`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RhidParseError {
    #[error("rhid must start with \"rhid:\": {0:?}")]
    MissingScheme(String),

    #[error("unknown rhid kind {0:?}")]
    UnknownKind(String),

    #[error("invalid rhid fingerprint {0:?}")]
    InvalidFingerprint(String),
}

/// Failures while producing canonical JSON.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CanonicalError {
    #[error("floating point numbers are not allowed in canonical form")]
    FloatNotAllowed,

    #[error("expected a JSON object")]
    NotAnObject,

    #[error("serialization failed: {0}")]
    Serialize(String),
}

/// Failures while reading a JSON-lines ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JsonlError {
    /// The final line has no terminating newline: the ledger was cut short.
    #[error("ledger is truncated after {complete_lines} complete lines")]
    Truncated { complete_lines: usize },

    #[error("ledger line {line} is not a valid entry: {message}")]
    Line { line: usize, message: String },
}

/// Core errors raised by the producer-side primitives.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Canonical(#[from] CanonicalError),

    #[error("rhid {0} is already registered in the manifest")]
    DuplicateRhid(Rhid),

    #[error("unexpected ledger seq: expected {expected}, got {got}")]
    UnexpectedSeq { expected: u64, got: u64 },

    #[error("hash chain is broken at seq {seq}")]
    ChainDiscontinuity { seq: u64 },
}

/// A ledger, manifest, or receipt set that cannot be verified at all.
///
/// These reject the whole bundle instead of being reported as findings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralViolation {
    #[error("ledger seq out of order: expected {expected}, got {got}")]
    NonMonotonicSeq { expected: u64, got: u64 },

    #[error("ledger seq {0} appears more than once")]
    DuplicateSeq(u64),

    #[error("malformed timestamp {value:?} in {location}")]
    MalformedTimestamp { location: String, value: String },

    #[error("rhid {0} appears more than once in the manifest")]
    DuplicateRhid(Rhid),

    #[error(transparent)]
    Encoding(#[from] CanonicalError),
}
