//! The structured result of chain-of-custody verification.
//!
//! Detected problems are data, not errors: every finding is collected and
//! scoped to the smallest affected unit (one exhibit, one entry, or the
//! chain from a break onward).

use serde::Serialize;

use crate::digest::Sha256Digest;
use crate::ledger::LedgerEntry;
use crate::manifest::ManifestEntry;
use crate::rhid::Rhid;

/// Where an RHID reference came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceRole {
    Input,
    Output,
    Receipt,
    Policy,
    Evidence,
}

/// One detected problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
    /// The entry at `seq` does not chain to the recomputed hash of its
    /// predecessor. Nothing from `seq` onward is trusted.
    ChainDiscontinuity {
        seq: u64,
        expected: Option<Sha256Digest>,
        found: Option<Sha256Digest>,
    },
    /// A receipt's `prev_receipt_hash` does not match the receipt before it.
    ReceiptChainDiscontinuity {
        receipt_rhid: Rhid,
        expected: Option<Sha256Digest>,
        found: Option<Sha256Digest>,
    },
    /// A referenced RHID is absent from the manifest.
    UnresolvedReference {
        seq: u64,
        role: ReferenceRole,
        rhid: Rhid,
    },
    /// The receipt RHID resolves but no receipt body was supplied.
    MissingReceipt { seq: u64, receipt_rhid: Rhid },
    /// The receipt's stored `hash` does not match its recomputed hash.
    TamperedReceipt {
        seq: u64,
        receipt_rhid: Rhid,
        declared: Sha256Digest,
        recomputed: Sha256Digest,
    },
    /// An intact receipt stored under an RHID it was not minted for, or
    /// issued for another action type than the entry's.
    MisboundReceipt {
        seq: u64,
        receipt_rhid: Rhid,
        bound_to: Rhid,
        action_type: String,
    },
    /// Stored bytes do not match the manifest digest. `actual` is `None`
    /// when no bytes were found for the entry.
    ContentDigestMismatch {
        rhid: Rhid,
        declared: Sha256Digest,
        actual: Option<Sha256Digest>,
    },
}

/// Verdict for one ledger entry, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Valid,
    ReceiptChainBroken,
    TamperedReceipt,
    /// Receipt RHID unresolved or its body missing: rendered BLOCKED / INVALID.
    CustodyInvalid,
    /// At or after a ledger hash discontinuity.
    ChainBroken,
}

impl EntryStatus {
    pub fn is_valid(self) -> bool {
        self == EntryStatus::Valid
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhibitStatus {
    Resolved,
    Unresolved,
    /// Resolved, but the stored bytes do not match the manifest digest.
    DigestMismatch,
}

/// One input or output of an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExhibitReport {
    pub rhid: Rhid,
    pub role: ReferenceRole,
    pub status: ExhibitStatus,
    pub manifest_entry: Option<ManifestEntry>,
}

/// Outcome of checking an entry's receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReceiptCheck {
    /// The entry references no receipt.
    Absent,
    /// The receipt RHID is not in the manifest.
    Unresolved,
    /// In the manifest, but no receipt body was supplied.
    Missing,
    Verified { hash: Sha256Digest },
    Tampered {
        declared: Sha256Digest,
        recomputed: Sha256Digest,
    },
    /// Intact, but minted for another RHID or action type.
    Misbound { bound_to: Rhid, action_type: String },
    /// Intact, but at or after a receipt chain break.
    ChainBroken { hash: Sha256Digest },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryReport {
    pub seq: u64,
    pub status: EntryStatus,
    /// Recomputed hash; `None` at or after a chain break.
    pub entry_hash: Option<Sha256Digest>,
    pub receipt: ReceiptCheck,
    pub exhibits: Vec<ExhibitReport>,
    /// The raw entry, surfaced for inspection even when untrusted.
    pub entry: LedgerEntry,
}

impl EntryReport {
    pub fn unresolved_exhibits(&self) -> impl Iterator<Item = &ExhibitReport> {
        self.exhibits
            .iter()
            .filter(|e| e.status == ExhibitStatus::Unresolved)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SealState {
    Unsealed,
    Sealed,
}

/// Projection of the most recent `gate.resolve` decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    NoDecision,
    Allowed,
    Flagged,
    Denied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Compliance {
    Unknown,
    Compliant,
    NonCompliant,
}

/// Derived lifecycle of the pack. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PackStatus {
    pub seal: SealState,
    pub gate: GateState,
    pub compliance: Compliance,
}

impl PackStatus {
    pub fn sealed(&self) -> bool {
        self.seal == SealState::Sealed
    }

    pub fn compliant(&self) -> bool {
        self.compliance == Compliance::Compliant
    }

    pub fn non_compliant(&self) -> bool {
        self.compliance == Compliance::NonCompliant
    }
}

impl Default for PackStatus {
    fn default() -> Self {
        Self {
            seal: SealState::Unsealed,
            gate: GateState::NoDecision,
            compliance: Compliance::Unknown,
        }
    }
}

/// What a rendering layer should show at the top of a pack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Banner {
    Blocked,
    Sealed,
    Open,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub entries: Vec<EntryReport>,
    pub findings: Vec<Finding>,
    pub pack: PackStatus,
    /// Seq of the first ledger chain break.
    pub chain_break_at: Option<u64>,
    /// First receipt whose `prev_receipt_hash` failed to link.
    pub receipt_chain_break_at: Option<Rhid>,
}

impl VerificationReport {
    /// No findings of any kind.
    pub fn is_valid(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn invalid_entries(&self) -> impl Iterator<Item = &EntryReport> {
        self.entries.iter().filter(|e| !e.status.is_valid())
    }

    /// `(seq, exhibit)` for every exhibit absent from the manifest.
    pub fn unresolved_exhibits(&self) -> impl Iterator<Item = (u64, &ExhibitReport)> {
        self.entries
            .iter()
            .flat_map(|e| e.unresolved_exhibits().map(move |x| (e.seq, x)))
    }

    pub fn banner(&self) -> Banner {
        if !self.is_valid() {
            Banner::Blocked
        } else if self.pack.sealed() {
            Banner::Sealed
        } else {
            Banner::Open
        }
    }
}
