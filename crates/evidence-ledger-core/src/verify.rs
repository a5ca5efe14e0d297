//! Chain-of-custody verification.
//!
//! The verifier is a pure function of a bundle. It never trusts the
//! producer: every hash is recomputed and every reference resolved against
//! the manifest. Structural problems reject the bundle; everything else is
//! collected into a [`VerificationReport`].

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::digest::Sha256Digest;
use crate::error::StructuralViolation;
use crate::ledger::LedgerEntry;
use crate::manifest::{Manifest, ManifestIndex};
use crate::receipt::Receipt;
use crate::report::{
    Compliance, EntryReport, EntryStatus, ExhibitReport, ExhibitStatus, Finding, GateState,
    PackStatus, ReceiptCheck, ReferenceRole, SealState, VerificationReport,
};
use crate::rhid::{Rhid, RhidKind};
use crate::types::PolicyDecision;

/// Which optional checks the verifier runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Re-digest stored bytes against the manifest when objects are loaded.
    pub check_content_digests: bool,
    /// Walk `prev_receipt_hash` links.
    pub check_receipt_chain: bool,
    /// Resolve receipt policy and evidence RHIDs.
    pub check_receipt_references: bool,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            check_content_digests: true,
            check_receipt_chain: true,
            check_receipt_references: true,
        }
    }
}

/// Everything a verifier needs from one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvidenceBundle {
    pub manifest: Manifest,
    pub ledger: Vec<LedgerEntry>,
    pub receipts: BTreeMap<Rhid, Receipt>,
    /// Raw stored bytes per RHID, receipt files included. `None` skips the
    /// content digest check.
    pub objects: Option<BTreeMap<Rhid, Bytes>>,
}

impl EvidenceBundle {
    pub fn new(
        manifest: Manifest,
        ledger: Vec<LedgerEntry>,
        receipts: BTreeMap<Rhid, Receipt>,
    ) -> Self {
        Self {
            manifest,
            ledger,
            receipts,
            objects: None,
        }
    }

    pub fn with_objects(mut self, objects: BTreeMap<Rhid, Bytes>) -> Self {
        self.objects = Some(objects);
        self
    }
}

/// Verify with the default configuration and no stored bytes.
pub fn verify(
    manifest: &Manifest,
    ledger: &[LedgerEntry],
    receipts: &BTreeMap<Rhid, Receipt>,
) -> Result<VerificationReport, StructuralViolation> {
    Verifier::default().verify_parts(manifest, ledger, receipts, None)
}

#[derive(Debug, Clone, Default)]
pub struct Verifier {
    config: VerifierConfig,
}

impl Verifier {
    pub fn new(config: VerifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    pub fn verify(&self, bundle: &EvidenceBundle) -> Result<VerificationReport, StructuralViolation> {
        self.verify_parts(
            &bundle.manifest,
            &bundle.ledger,
            &bundle.receipts,
            bundle.objects.as_ref(),
        )
    }

    /// Verify independent bundles concurrently, one thread each.
    pub fn verify_many(
        &self,
        bundles: &[EvidenceBundle],
    ) -> Vec<Result<VerificationReport, StructuralViolation>> {
        std::thread::scope(|scope| {
            let handles: Vec<_> = bundles
                .iter()
                .map(|bundle| scope.spawn(move || self.verify(bundle)))
                .collect();
            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(result) => result,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        })
    }

    pub fn verify_parts(
        &self,
        manifest: &Manifest,
        ledger: &[LedgerEntry],
        receipts: &BTreeMap<Rhid, Receipt>,
        objects: Option<&BTreeMap<Rhid, Bytes>>,
    ) -> Result<VerificationReport, StructuralViolation> {
        crate::validation::validate_manifest(manifest)?;
        crate::validation::validate_ledger(ledger)?;
        crate::validation::validate_receipts(receipts)?;
        let index = ManifestIndex::build(manifest)?;

        let (content_findings, mismatched) = match objects {
            Some(objects) if self.config.check_content_digests => {
                check_content(manifest, objects)
            }
            _ => (Vec::new(), HashSet::new()),
        };

        let receipt_chain = if self.config.check_receipt_chain {
            walk_receipt_chain(manifest, ledger, receipts)
        } else {
            ReceiptChainWalk::default()
        };

        let walk = LedgerWalk {
            index: &index,
            receipts,
            mismatched: &mismatched,
            broken_receipts: &receipt_chain.broken,
            check_references: self.config.check_receipt_references,
        };

        let mut entries = Vec::with_capacity(ledger.len());
        let mut findings = Vec::new();
        let mut expected_prev: Option<Sha256Digest> = None;
        let mut chain_break_at = None;
        let mut pack = PackStatus::default();

        for entry in ledger {
            if chain_break_at.is_none() && entry.prev_action_hash != expected_prev {
                findings.push(Finding::ChainDiscontinuity {
                    seq: entry.seq,
                    expected: expected_prev,
                    found: entry.prev_action_hash,
                });
                chain_break_at = Some(entry.seq);
            }
            let trusted = chain_break_at.is_none();

            let entry_hash = if trusted {
                let hash = entry.compute_hash()?;
                expected_prev = Some(hash);
                Some(hash)
            } else {
                None
            };

            let (mut report, entry_findings) = walk.check_entry(entry)?;
            report.entry_hash = entry_hash;
            if trusted {
                findings.extend(entry_findings);
                project(&mut pack, entry);
            } else {
                report.status = EntryStatus::ChainBroken;
            }
            entries.push(report);
        }

        pack.compliance = match pack.gate {
            GateState::Allowed => Compliance::Compliant,
            GateState::Denied => Compliance::NonCompliant,
            GateState::Flagged | GateState::NoDecision => Compliance::Unknown,
        };

        findings.extend(receipt_chain.findings);
        findings.extend(content_findings);

        Ok(VerificationReport {
            entries,
            findings,
            pack,
            chain_break_at,
            receipt_chain_break_at: receipt_chain.break_at,
        })
    }
}

/// Fold one trusted entry into the pack projection.
fn project(pack: &mut PackStatus, entry: &LedgerEntry) {
    if entry.is_seal() {
        pack.seal = SealState::Sealed;
    }
    if entry.is_gate_resolve() {
        pack.gate = match entry.policy_decision {
            Some(PolicyDecision::Allow) => GateState::Allowed,
            Some(PolicyDecision::Flag) => GateState::Flagged,
            Some(PolicyDecision::Deny) => GateState::Denied,
            None => GateState::NoDecision,
        };
    }
}

fn check_content(
    manifest: &Manifest,
    objects: &BTreeMap<Rhid, Bytes>,
) -> (Vec<Finding>, HashSet<Rhid>) {
    let mut findings = Vec::new();
    let mut mismatched = HashSet::new();
    for entry in &manifest.entries {
        let actual = objects.get(&entry.rhid).map(|b| Sha256Digest::of(b));
        if actual != Some(entry.sha256) {
            findings.push(Finding::ContentDigestMismatch {
                rhid: entry.rhid.clone(),
                declared: entry.sha256,
                actual,
            });
            mismatched.insert(entry.rhid.clone());
        }
    }
    (findings, mismatched)
}

#[derive(Debug, Default)]
struct ReceiptChainWalk {
    findings: Vec<Finding>,
    broken: HashSet<Rhid>,
    break_at: Option<Rhid>,
}

/// Receipts in mint order: first reference by ledger seq, then receipts the
/// ledger never references, in manifest order.
fn receipt_order<'a>(
    manifest: &'a Manifest,
    ledger: &'a [LedgerEntry],
    receipts: &BTreeMap<Rhid, Receipt>,
) -> Vec<&'a Rhid> {
    let mut seen = HashSet::new();
    ledger
        .iter()
        .filter_map(|e| e.receipt_rhid.as_ref())
        .chain(manifest.entries_of_kind(RhidKind::Receipt).map(|e| &e.rhid))
        .filter(|rhid| receipts.contains_key(*rhid))
        .filter(|rhid| seen.insert(*rhid))
        .collect()
}

fn walk_receipt_chain(
    manifest: &Manifest,
    ledger: &[LedgerEntry],
    receipts: &BTreeMap<Rhid, Receipt>,
) -> ReceiptChainWalk {
    let mut walk = ReceiptChainWalk::default();
    let mut expected: Option<Sha256Digest> = None;
    for rhid in receipt_order(manifest, ledger, receipts) {
        let Some(receipt) = receipts.get(rhid) else {
            continue;
        };
        if walk.break_at.is_none() && receipt.prev_receipt_hash != expected {
            walk.findings.push(Finding::ReceiptChainDiscontinuity {
                receipt_rhid: rhid.clone(),
                expected,
                found: receipt.prev_receipt_hash,
            });
            walk.break_at = Some(rhid.clone());
        }
        if walk.break_at.is_some() {
            walk.broken.insert(rhid.clone());
        }
        expected = Some(receipt.hash);
    }
    walk
}

/// Per-entry checks that do not depend on the ledger chain.
struct LedgerWalk<'a> {
    index: &'a ManifestIndex<'a>,
    receipts: &'a BTreeMap<Rhid, Receipt>,
    mismatched: &'a HashSet<Rhid>,
    broken_receipts: &'a HashSet<Rhid>,
    check_references: bool,
}

impl LedgerWalk<'_> {
    fn check_entry(
        &self,
        entry: &LedgerEntry,
    ) -> Result<(EntryReport, Vec<Finding>), StructuralViolation> {
        let mut findings = Vec::new();
        let mut status = EntryStatus::Valid;

        let receipt = match &entry.receipt_rhid {
            None => ReceiptCheck::Absent,
            Some(rhid) => {
                let (check, receipt_status) = self.check_receipt(entry, rhid, &mut findings)?;
                status = status.max(receipt_status);
                check
            }
        };

        let exhibits = entry
            .inputs
            .iter()
            .map(|rhid| (rhid, ReferenceRole::Input))
            .chain(entry.outputs.iter().map(|rhid| (rhid, ReferenceRole::Output)))
            .map(|(rhid, role)| self.check_exhibit(entry.seq, rhid, role, &mut findings))
            .collect();

        let report = EntryReport {
            seq: entry.seq,
            status,
            entry_hash: None,
            receipt,
            exhibits,
            entry: entry.clone(),
        };
        Ok((report, findings))
    }

    fn check_receipt(
        &self,
        entry: &LedgerEntry,
        rhid: &Rhid,
        findings: &mut Vec<Finding>,
    ) -> Result<(ReceiptCheck, EntryStatus), StructuralViolation> {
        if self.index.resolve(rhid).is_none() {
            findings.push(Finding::UnresolvedReference {
                seq: entry.seq,
                role: ReferenceRole::Receipt,
                rhid: rhid.clone(),
            });
            return Ok((ReceiptCheck::Unresolved, EntryStatus::CustodyInvalid));
        }
        let Some(receipt) = self.receipts.get(rhid) else {
            findings.push(Finding::MissingReceipt {
                seq: entry.seq,
                receipt_rhid: rhid.clone(),
            });
            return Ok((ReceiptCheck::Missing, EntryStatus::CustodyInvalid));
        };

        if self.check_references {
            self.check_receipt_references(entry, receipt, findings);
        }

        let recomputed = receipt.compute_hash()?;
        if recomputed != receipt.hash {
            findings.push(Finding::TamperedReceipt {
                seq: entry.seq,
                receipt_rhid: rhid.clone(),
                declared: receipt.hash,
                recomputed,
            });
            let check = ReceiptCheck::Tampered {
                declared: receipt.hash,
                recomputed,
            };
            return Ok((check, EntryStatus::TamperedReceipt));
        }
        let bound_to = receipt.rhid();
        if bound_to != *rhid || receipt.action_type != entry.action_type {
            findings.push(Finding::MisboundReceipt {
                seq: entry.seq,
                receipt_rhid: rhid.clone(),
                bound_to: bound_to.clone(),
                action_type: receipt.action_type.clone(),
            });
            let check = ReceiptCheck::Misbound {
                bound_to,
                action_type: receipt.action_type.clone(),
            };
            return Ok((check, EntryStatus::TamperedReceipt));
        }
        if self.broken_receipts.contains(rhid) {
            let check = ReceiptCheck::ChainBroken { hash: receipt.hash };
            return Ok((check, EntryStatus::ReceiptChainBroken));
        }
        Ok((ReceiptCheck::Verified { hash: receipt.hash }, EntryStatus::Valid))
    }

    /// Policy and evidence references that are not already entry exhibits.
    /// Reported, but they never change the entry status.
    fn check_receipt_references(
        &self,
        entry: &LedgerEntry,
        receipt: &Receipt,
        findings: &mut Vec<Finding>,
    ) {
        let exhibits: HashSet<&Rhid> = entry.exhibits().collect();
        let policy = receipt
            .policy_rhid
            .iter()
            .map(|rhid| (rhid, ReferenceRole::Policy));
        let evidence = receipt
            .evidence_rhids
            .iter()
            .filter(|rhid| !exhibits.contains(rhid))
            .map(|rhid| (rhid, ReferenceRole::Evidence));
        for (rhid, role) in policy.chain(evidence) {
            if self.index.resolve(rhid).is_none() {
                findings.push(Finding::UnresolvedReference {
                    seq: entry.seq,
                    role,
                    rhid: rhid.clone(),
                });
            }
        }
    }

    fn check_exhibit(
        &self,
        seq: u64,
        rhid: &Rhid,
        role: ReferenceRole,
        findings: &mut Vec<Finding>,
    ) -> ExhibitReport {
        let manifest_entry = self.index.resolve(rhid).cloned();
        let status = if manifest_entry.is_none() {
            findings.push(Finding::UnresolvedReference {
                seq,
                role,
                rhid: rhid.clone(),
            });
            ExhibitStatus::Unresolved
        } else if self.mismatched.contains(rhid) {
            ExhibitStatus::DigestMismatch
        } else {
            ExhibitStatus::Resolved
        };
        ExhibitReport {
            rhid: rhid.clone(),
            role,
            status,
            manifest_entry,
        }
    }
}
