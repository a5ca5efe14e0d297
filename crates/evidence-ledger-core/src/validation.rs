//! Structural validation.
//!
//! A bundle that fails these checks cannot be verified at all: the whole
//! ledger or manifest is rejected instead of partially recovered.

use std::collections::{BTreeMap, HashSet};

use crate::error::StructuralViolation;
use crate::ledger::LedgerEntry;
use crate::manifest::{Manifest, ManifestIndex};
use crate::rhid::Rhid;
use crate::receipt::Receipt;
use crate::types::Timestamp;

/// Check that `seq` runs 0, 1, 2, ... without gaps or repeats, and that
/// every timestamp parses.
pub fn validate_ledger(entries: &[LedgerEntry]) -> Result<(), StructuralViolation> {
    let mut seen = HashSet::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let expected = index as u64;
        if !seen.insert(entry.seq) {
            return Err(StructuralViolation::DuplicateSeq(entry.seq));
        }
        if entry.seq != expected {
            return Err(StructuralViolation::NonMonotonicSeq {
                expected,
                got: entry.seq,
            });
        }
        check_timestamp(&entry.timestamp, || format!("ledger entry {}", entry.seq))?;
    }
    Ok(())
}

/// Check that RHIDs are unique and every `created_at` parses.
pub fn validate_manifest(manifest: &Manifest) -> Result<(), StructuralViolation> {
    ManifestIndex::build(manifest)?;
    for entry in &manifest.entries {
        check_timestamp(&entry.created_at, || format!("manifest entry {}", entry.rhid))?;
    }
    Ok(())
}

/// Check every receipt timestamp parses.
pub fn validate_receipts(receipts: &BTreeMap<Rhid, Receipt>) -> Result<(), StructuralViolation> {
    for (rhid, receipt) in receipts {
        check_timestamp(&receipt.timestamp, || format!("receipt {rhid}"))?;
    }
    Ok(())
}

fn check_timestamp(
    ts: &Timestamp,
    location: impl FnOnce() -> String,
) -> Result<(), StructuralViolation> {
    if ts.is_well_formed() {
        Ok(())
    } else {
        Err(StructuralViolation::MalformedTimestamp {
            location: location(),
            value: ts.as_str().to_string(),
        })
    }
}
