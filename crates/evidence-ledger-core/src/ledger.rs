//! The action ledger: an append-only, hash-chained sequence of entries.
//!
//! Each entry's `prev_action_hash` is the digest of the canonical form of
//! the entry before it, that entry's own `prev_action_hash` included. Entry 0
//! carries no `prev_action_hash`. The persisted form is JSON lines, one
//! canonical entry per `\n`-terminated line, in `seq` order.

use serde::{Deserialize, Serialize};

use crate::canonical::{canonical_digest, canonical_json};
use crate::digest::Sha256Digest;
use crate::error::{CanonicalError, CoreError, JsonlError};
use crate::rhid::Rhid;
use crate::types::{Actor, PolicyDecision, Timestamp};

/// Action type of the terminal entry that closes a bundle.
pub const ACTION_PACK_SEAL: &str = "pack.seal";

/// Action type of a policy gate resolution.
pub const ACTION_GATE_RESOLVE: &str = "gate.resolve";

/// Default entry status.
pub const STATUS_SUCCESS: &str = "success";

/// One governed action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerEntry {
    pub seq: u64,
    pub step_id: String,
    pub actor_id: String,
    pub actor_type: String,
    pub action_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_decision: Option<PolicyDecision>,
    pub timestamp: Timestamp,
    pub duration_ms: u64,
    pub status: String,
    pub inputs: Vec<Rhid>,
    pub outputs: Vec<Rhid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_rhid: Option<Rhid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_action_hash: Option<Sha256Digest>,
}

impl LedgerEntry {
    /// Digest of this entry's canonical form. The next entry chains to it.
    pub fn compute_hash(&self) -> Result<Sha256Digest, CanonicalError> {
        canonical_digest(self)
    }

    /// Inputs followed by outputs.
    pub fn exhibits(&self) -> impl Iterator<Item = &Rhid> {
        self.inputs.iter().chain(self.outputs.iter())
    }

    pub fn is_seal(&self) -> bool {
        self.action_type == ACTION_PACK_SEAL
    }

    pub fn is_gate_resolve(&self) -> bool {
        self.action_type == ACTION_GATE_RESOLVE
    }
}

/// An entry before the chain assigns its `seq` and `prev_action_hash`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDraft {
    pub step_id: String,
    pub actor_id: String,
    pub actor_type: String,
    pub action_type: String,
    pub policy_decision: Option<PolicyDecision>,
    pub timestamp: Timestamp,
    pub duration_ms: u64,
    pub status: String,
    pub inputs: Vec<Rhid>,
    pub outputs: Vec<Rhid>,
    pub receipt_rhid: Option<Rhid>,
}

impl EntryDraft {
    pub fn new(
        step_id: impl Into<String>,
        actor: &Actor,
        action_type: impl Into<String>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            step_id: step_id.into(),
            actor_id: actor.id.clone(),
            actor_type: actor.actor_type.clone(),
            action_type: action_type.into(),
            policy_decision: None,
            timestamp,
            duration_ms: 0,
            status: STATUS_SUCCESS.to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            receipt_rhid: None,
        }
    }
}

/// The tail of a ledger: the next `seq` and the hash of the last entry.
///
/// `link` is pure; the chain only moves on `advance`, so a caller can
/// persist the linked entry first and advance once the write succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerChain {
    next_seq: u64,
    tail: Option<Sha256Digest>,
}

impl LedgerChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the tail from persisted entries, checking every link.
    pub fn resume(entries: &[LedgerEntry]) -> Result<Self, CoreError> {
        let mut chain = Self::new();
        for entry in entries {
            if entry.prev_action_hash != chain.tail {
                return Err(CoreError::ChainDiscontinuity { seq: entry.seq });
            }
            let hash = entry.compute_hash()?;
            chain.advance(entry, hash)?;
        }
        Ok(chain)
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Hash of the last appended entry, `None` for an empty ledger.
    pub fn tail(&self) -> Option<Sha256Digest> {
        self.tail
    }

    /// Materialize the next entry and its hash without moving the chain.
    pub fn link(&self, draft: EntryDraft) -> Result<(LedgerEntry, Sha256Digest), CoreError> {
        let entry = LedgerEntry {
            seq: self.next_seq,
            step_id: draft.step_id,
            actor_id: draft.actor_id,
            actor_type: draft.actor_type,
            action_type: draft.action_type,
            policy_decision: draft.policy_decision,
            timestamp: draft.timestamp,
            duration_ms: draft.duration_ms,
            status: draft.status,
            inputs: draft.inputs,
            outputs: draft.outputs,
            receipt_rhid: draft.receipt_rhid,
            prev_action_hash: self.tail,
        };
        let hash = entry.compute_hash()?;
        Ok((entry, hash))
    }

    /// Move the tail past a persisted entry.
    pub fn advance(&mut self, entry: &LedgerEntry, hash: Sha256Digest) -> Result<(), CoreError> {
        if entry.seq != self.next_seq {
            return Err(CoreError::UnexpectedSeq {
                expected: self.next_seq,
                got: entry.seq,
            });
        }
        self.next_seq += 1;
        self.tail = Some(hash);
        Ok(())
    }
}

/// Encode one entry as a canonical, newline-terminated JSON line.
pub fn to_jsonl_line(entry: &LedgerEntry) -> Result<Vec<u8>, CanonicalError> {
    let mut line = canonical_json(entry)?;
    line.push(b'\n');
    Ok(line)
}

/// Parse a JSON-lines ledger.
///
/// A final line without its terminating newline means the read (or the
/// write) was cut short; the ledger is reported as truncated rather than
/// verified against a partial chain.
pub fn parse_jsonl(text: &str) -> Result<Vec<LedgerEntry>, JsonlError> {
    if text.is_empty() {
        return Ok(Vec::new());
    }
    let Some(body) = text.strip_suffix('\n') else {
        return Err(JsonlError::Truncated {
            complete_lines: text.matches('\n').count(),
        });
    };
    body.split('\n')
        .enumerate()
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|e| JsonlError::Line {
                line: i + 1,
                message: e.to_string(),
            })
        })
        .collect()
}
