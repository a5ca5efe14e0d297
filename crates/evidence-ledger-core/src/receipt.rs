//! Receipts: immutable, hash-chained records of a governed decision.
//!
//! A receipt names the policy that decided an action and the evidence it
//! relied on. Its `hash` is the digest of its own canonical form with the
//! `hash` key removed. `prev_receipt_hash` chains receipts in the order
//! they were minted, independently of the ledger `seq`.

use serde::{Deserialize, Serialize};

use crate::canonical::{canonical_json, canonical_json_without};
use crate::digest::Sha256Digest;
use crate::error::CanonicalError;
use crate::rhid::{Rhid, RhidKind};
use crate::signer::Signer;
use crate::types::Timestamp;

/// Prefix of every deterministic receipt id.
pub const RECEIPT_ID_PREFIX: &str = "rcpt_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Receipt {
    pub receipt_id: String,
    pub run_id: String,
    pub action_type: String,
    pub timestamp: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_rhid: Option<Rhid>,
    pub evidence_rhids: Vec<Rhid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_receipt_hash: Option<Sha256Digest>,
    pub hash: Sha256Digest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Receipt {
    /// Recompute the integrity hash: everything but `hash`, signature included.
    pub fn compute_hash(&self) -> Result<Sha256Digest, CanonicalError> {
        Ok(Sha256Digest::of(&canonical_json_without(self, &["hash"])?))
    }

    /// The bytes handed to a signer: everything but `hash` and `signature`.
    pub fn signed_message(&self) -> Result<Vec<u8>, CanonicalError> {
        canonical_json_without(self, &["hash", "signature"])
    }

    /// Whether the stored `hash` matches the recomputed one.
    pub fn is_intact(&self) -> Result<bool, CanonicalError> {
        Ok(self.compute_hash()? == self.hash)
    }

    /// Canonical encoding of the full receipt; this is the stored file.
    pub fn to_canonical_bytes(&self) -> Result<Vec<u8>, CanonicalError> {
        canonical_json(self)
    }

    /// The RHID this receipt is registered under.
    pub fn rhid(&self) -> Rhid {
        Rhid::mint(RhidKind::Receipt, &self.receipt_id)
    }
}

/// Deterministic receipt id: `rcpt_` + 16 hex of SHA-256(`<run_id>:<index>`).
pub fn receipt_id_for(run_id: &str, index: u64) -> String {
    let hex = Sha256Digest::of(format!("{run_id}:{index}").as_bytes()).to_hex();
    format!("{RECEIPT_ID_PREFIX}{}", &hex[..16])
}

/// Builder for minting receipts.
#[derive(Debug, Clone)]
pub struct ReceiptBuilder {
    receipt_id: String,
    run_id: String,
    action_type: String,
    timestamp: Timestamp,
    policy_rhid: Option<Rhid>,
    evidence_rhids: Vec<Rhid>,
    prev_receipt_hash: Option<Sha256Digest>,
}

impl ReceiptBuilder {
    pub fn new(
        receipt_id: impl Into<String>,
        run_id: impl Into<String>,
        action_type: impl Into<String>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            receipt_id: receipt_id.into(),
            run_id: run_id.into(),
            action_type: action_type.into(),
            timestamp,
            policy_rhid: None,
            evidence_rhids: Vec::new(),
            prev_receipt_hash: None,
        }
    }

    pub fn policy(mut self, rhid: Rhid) -> Self {
        self.policy_rhid = Some(rhid);
        self
    }

    /// Add an evidence reference. Repeats are kept once, first position wins.
    pub fn add_evidence(mut self, rhid: Rhid) -> Self {
        if !self.evidence_rhids.contains(&rhid) {
            self.evidence_rhids.push(rhid);
        }
        self
    }

    pub fn evidence<'a>(self, rhids: impl IntoIterator<Item = &'a Rhid>) -> Self {
        rhids
            .into_iter()
            .fold(self, |builder, rhid| builder.add_evidence(rhid.clone()))
    }

    pub fn prev(mut self, hash: Sha256Digest) -> Self {
        self.prev_receipt_hash = Some(hash);
        self
    }

    /// Sign (when a signer is given), then seal the body with its hash.
    pub fn mint(self, signer: Option<&dyn Signer>) -> Result<Receipt, CanonicalError> {
        let mut receipt = Receipt {
            receipt_id: self.receipt_id,
            run_id: self.run_id,
            action_type: self.action_type,
            timestamp: self.timestamp,
            policy_rhid: self.policy_rhid,
            evidence_rhids: self.evidence_rhids,
            prev_receipt_hash: self.prev_receipt_hash,
            hash: Sha256Digest::ZERO,
            signature: None,
        };
        if let Some(signer) = signer {
            receipt.signature = Some(signer.sign(&receipt.signed_message()?));
        }
        receipt.hash = receipt.compute_hash()?;
        Ok(receipt)
    }
}

/// The producer-side tail of a run's receipt chain.
///
/// Like [`crate::ledger::LedgerChain`], minting is pure and the chain only
/// moves on `advance`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptChain {
    run_id: String,
    minted: u64,
    tail: Option<Sha256Digest>,
}

impl ReceiptChain {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            minted: 0,
            tail: None,
        }
    }

    /// Rebuild from receipts in mint order.
    pub fn resume<'a>(run_id: impl Into<String>, receipts: impl IntoIterator<Item = &'a Receipt>) -> Self {
        let mut chain = Self::new(run_id);
        for receipt in receipts {
            chain.advance(receipt);
        }
        chain
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Number of receipts minted so far.
    pub fn minted(&self) -> u64 {
        self.minted
    }

    /// Hash of the last minted receipt.
    pub fn tail(&self) -> Option<Sha256Digest> {
        self.tail
    }

    /// Mint the next receipt of the chain without moving it.
    pub fn mint(
        &self,
        action_type: &str,
        timestamp: Timestamp,
        policy_rhid: Option<Rhid>,
        evidence_rhids: &[Rhid],
        signer: Option<&dyn Signer>,
    ) -> Result<Receipt, CanonicalError> {
        mint_receipt(
            receipt_id_for(&self.run_id, self.minted),
            &self.run_id,
            action_type,
            timestamp,
            policy_rhid,
            evidence_rhids,
            self.tail,
            signer,
        )
    }

    pub fn advance(&mut self, receipt: &Receipt) {
        self.minted += 1;
        self.tail = Some(receipt.hash);
    }
}

/// Mint one receipt with an explicit predecessor hash.
#[allow(clippy::too_many_arguments)]
pub fn mint_receipt(
    receipt_id: String,
    run_id: &str,
    action_type: &str,
    timestamp: Timestamp,
    policy_rhid: Option<Rhid>,
    evidence_rhids: &[Rhid],
    prev_hash: Option<Sha256Digest>,
    signer: Option<&dyn Signer>,
) -> Result<Receipt, CanonicalError> {
    let mut builder =
        ReceiptBuilder::new(receipt_id, run_id, action_type, timestamp).evidence(evidence_rhids);
    if let Some(policy) = policy_rhid {
        builder = builder.policy(policy);
    }
    if let Some(prev) = prev_hash {
        builder = builder.prev(prev);
    }
    builder.mint(signer)
}
