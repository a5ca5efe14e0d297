//! Golden test vectors for deterministic verification.
//!
//! Any producer of compatible bundles must reproduce these values exactly:
//! RHID minting, receipt ids, canonical bytes, and both chain hashes. The
//! expected values were computed independently of this code base, from
//! sorted-key compact JSON and SHA-256.

use evidence_ledger_core::{
    canonical_json, receipt_id_for, Actor, EntryDraft, LedgerChain, Receipt, ReceiptBuilder, Rhid,
    RhidKind, Timestamp,
};

/// Start of every vector's logical clock.
pub const VECTOR_TIMESTAMP: &str = "2026-02-07T08:00:00.000Z";

/// A golden test vector.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Expected rendering of the computed value.
    pub expected: &'static str,
    compute: fn() -> String,
}

impl GoldenVector {
    /// Compute the value with this code base.
    pub fn actual(&self) -> String {
        (self.compute)()
    }

    pub fn holds(&self) -> bool {
        self.actual() == self.expected
    }
}

fn first_receipt() -> Receipt {
    ReceiptBuilder::new(
        receipt_id_for("run-0001", 0),
        "run-0001",
        "workflow.start",
        Timestamp::from_raw(VECTOR_TIMESTAMP),
    )
    .mint(None)
    .expect("receipt encodes")
}

fn first_entry_draft() -> EntryDraft {
    let planner = Actor::new("agent:planner", "agent", "Planner");
    let mut draft = EntryDraft::new(
        "step-0",
        &planner,
        "workflow.start",
        Timestamp::from_raw(VECTOR_TIMESTAMP),
    );
    draft.duration_ms = 100;
    draft.receipt_rhid = Some(first_receipt().rhid());
    draft
}

fn utf8(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes).expect("canonical JSON is UTF-8")
}

/// Get all golden test vectors.
///
/// The receipt and entry are the first records an [`evidence_ledger::EvidenceWriter`]
/// with the default configuration writes for a `workflow.start` by
/// `agent:planner`.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "artifact rhid minted from name and timestamp",
            expected: "rhid:artifact:32742bba68c3",
            compute: || {
                Rhid::mint(RhidKind::Artifact, &format!("plan.md-{VECTOR_TIMESTAMP}")).to_string()
            },
        },
        GoldenVector {
            name: "policy rhid of gate.resolve",
            expected: "rhid:policy:a85f7052d7d8",
            compute: || Rhid::policy_for("gate.resolve").to_string(),
        },
        GoldenVector {
            name: "first receipt id of run-0001",
            expected: "rcpt_46e5e1bedf293102",
            compute: || receipt_id_for("run-0001", 0),
        },
        GoldenVector {
            name: "second receipt id of run-0001",
            expected: "rcpt_bd07ebf810053e32",
            compute: || receipt_id_for("run-0001", 1),
        },
        GoldenVector {
            name: "receipt signed message",
            expected: r#"{"action_type":"workflow.start","evidence_rhids":[],"receipt_id":"rcpt_46e5e1bedf293102","run_id":"run-0001","timestamp":"2026-02-07T08:00:00.000Z"}"#,
            compute: || utf8(first_receipt().signed_message().expect("receipt encodes")),
        },
        GoldenVector {
            name: "receipt hash",
            expected: "sha256:bc0772ec933e7849b5afdc6b216aec07a94c1cad3b219c901a1cb71f0c2d303b",
            compute: || first_receipt().hash.to_string(),
        },
        GoldenVector {
            name: "receipt rhid",
            expected: "rhid:receipt:be8782524139",
            compute: || first_receipt().rhid().to_string(),
        },
        GoldenVector {
            name: "first ledger line",
            expected: r#"{"action_type":"workflow.start","actor_id":"agent:planner","actor_type":"agent","duration_ms":100,"inputs":[],"outputs":[],"receipt_rhid":"rhid:receipt:be8782524139","seq":0,"status":"success","step_id":"step-0","timestamp":"2026-02-07T08:00:00.000Z"}"#,
            compute: || {
                let (entry, _) = LedgerChain::new()
                    .link(first_entry_draft())
                    .expect("entry links");
                utf8(canonical_json(&entry).expect("entry encodes"))
            },
        },
        GoldenVector {
            name: "first ledger entry hash",
            expected: "sha256:4f1fea1f6720e9f0128bef841094d30919465aab4f53a37aea0f9d8247a80175",
            compute: || {
                let (_, hash) = LedgerChain::new()
                    .link(first_entry_draft())
                    .expect("entry links");
                hash.to_string()
            },
        },
    ]
}

/// `(name, holds, actual)` for every vector.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    all_vectors()
        .iter()
        .map(|v| (v.name.to_string(), v.holds(), v.actual()))
        .collect()
}
