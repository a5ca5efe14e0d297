//! The EvidenceWriter: the single writer of a run.
//!
//! Every ledger entry and receipt chains to the one before it, so appends
//! are serialized under one lock that owns the chain tails. Changes are
//! staged, persisted, and only then committed to the in-memory state; a
//! failed append leaves the writer where it was.
//!
//! A failed append can still leave bytes in the store: a receipt or policy
//! record written before the ledger line was refused. No manifest registers
//! them, so the next append replaces them. A crash between the ledger line
//! and the manifest is repaired by [`EvidenceWriter::resume`].

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use evidence_ledger_core::{
    canonical_json, content_type_for, validate_ledger, validate_manifest, Actor, EntryDraft,
    IndexedManifest, LedgerChain, LedgerEntry, Manifest, ManifestEntry, PolicyDecision, Receipt,
    ReceiptChain, Rhid, RhidKind, Sha256Digest, Signer, Timestamp, VerificationReport, Verifier,
    STATUS_SUCCESS,
};
use evidence_ledger_store::{AppendResult, Store, StoreError};

use crate::bundle::verify_store;
use crate::clock::LogicalClock;
use crate::config::WriterConfig;
use crate::error::{LedgerError, Result};

const JSON_CONTENT_TYPE: &str = "application/json";

/// One governed action to record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRequest {
    pub step_id: String,
    pub actor: Actor,
    pub action_type: String,
    pub inputs: Vec<Rhid>,
    pub outputs: Vec<Rhid>,
    pub decision: Option<PolicyDecision>,
    pub status: String,
    /// `None` records the configured default duration.
    pub duration_ms: Option<u64>,
    /// Whether the action gets a receipt. On by default.
    pub mint_receipt: bool,
}

impl ActionRequest {
    pub fn new(step_id: impl Into<String>, actor: &Actor, action_type: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            actor: actor.clone(),
            action_type: action_type.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            decision: None,
            status: STATUS_SUCCESS.to_string(),
            duration_ms: None,
            mint_receipt: true,
        }
    }

    pub fn input(mut self, rhid: Rhid) -> Self {
        self.inputs.push(rhid);
        self
    }

    pub fn output(mut self, rhid: Rhid) -> Self {
        self.outputs.push(rhid);
        self
    }

    pub fn decision(mut self, decision: PolicyDecision) -> Self {
        self.decision = Some(decision);
        self
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    pub fn duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = Some(ms);
        self
    }

    pub fn without_receipt(mut self) -> Self {
        self.mint_receipt = false;
        self
    }
}

/// What an append produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendOutcome {
    pub seq: u64,
    pub receipt_rhid: Option<Rhid>,
    /// Hash of the new entry; the next entry's `prev_action_hash`.
    pub entry_hash: Sha256Digest,
}

/// Mutable state guarded by the writer lock.
struct WriterState {
    manifest: IndexedManifest,
    ledger: LedgerChain,
    receipts: ReceiptChain,
    clock: LogicalClock,
    sealed: bool,
}

/// The single writer of a run's evidence bundle.
pub struct EvidenceWriter<S: Store> {
    store: Arc<S>,
    config: WriterConfig,
    signer: Option<Arc<dyn Signer>>,
    state: Mutex<WriterState>,
}

impl<S: Store> EvidenceWriter<S> {
    /// Start a new, empty run.
    pub fn new(store: S, config: WriterConfig) -> Self {
        let state = WriterState {
            manifest: IndexedManifest::new(),
            ledger: LedgerChain::new(),
            receipts: ReceiptChain::new(config.run_id.clone()),
            clock: LogicalClock::new(config.start_time, config.step_gap_ms),
            sealed: false,
        };
        Self {
            store: Arc::new(store),
            config,
            signer: None,
            state: Mutex::new(state),
        }
    }

    /// Continue a run from what the store already holds.
    ///
    /// The ledger chain is re-verified link by link; a broken chain is not
    /// extended. Receipts and policy records the ledger relies on but the
    /// stored manifest lacks are re-registered from their stored bytes.
    pub async fn resume(store: S, config: WriterConfig) -> Result<Self> {
        let manifest = store.read_manifest().await?.unwrap_or_default();
        let ledger = store.read_ledger().await?;
        validate_manifest(&manifest)?;
        validate_ledger(&ledger)?;
        let mut manifest = IndexedManifest::from_manifest(manifest)?;

        let chain = LedgerChain::resume(&ledger)?;
        let receipts = referenced_receipts(&store, &ledger).await?;
        if let Some(other) = receipts.iter().find(|r| r.run_id != config.run_id) {
            warn!(
                configured = %config.run_id,
                stored = %other.run_id,
                "resuming a run under a different run id"
            );
        }
        let receipt_chain = ReceiptChain::resume(config.run_id.clone(), &receipts);

        let recovered =
            reregister_issued(&store, &config.issuer_id, &ledger, &receipts, &mut manifest).await?;
        if recovered > 0 {
            warn!(recovered, "manifest was behind the ledger; re-registered issued records");
            store.write_manifest(manifest.manifest()).await?;
        }

        let clock = match ledger.last() {
            Some(last) => LogicalClock::after(last, config.step_gap_ms)?,
            None => LogicalClock::new(config.start_time, config.step_gap_ms),
        };
        let sealed = ledger.iter().any(LedgerEntry::is_seal);

        info!(
            run_id = %config.run_id,
            entries = ledger.len(),
            manifest_entries = manifest.len(),
            sealed,
            "resumed run"
        );

        let state = WriterState {
            manifest,
            ledger: chain,
            receipts: receipt_chain,
            clock,
            sealed,
        };
        Ok(Self {
            store: Arc::new(store),
            config,
            signer: None,
            state: Mutex::new(state),
        })
    }

    /// Attach a signer for receipts minted from now on.
    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Snapshot of the manifest.
    pub async fn manifest(&self) -> Manifest {
        self.state.lock().await.manifest.manifest().clone()
    }

    pub async fn next_seq(&self) -> u64 {
        self.state.lock().await.ledger.next_seq()
    }

    pub async fn is_sealed(&self) -> bool {
        self.state.lock().await.sealed
    }

    /// Verify what the store holds, stored bytes included.
    ///
    /// Holds the writer lock so no append is half persisted while loading.
    pub async fn verify(&self) -> Result<VerificationReport> {
        let _state = self.state.lock().await;
        verify_store(&*self.store, &Verifier::default()).await
    }

    /// Store content and register it in the manifest.
    ///
    /// The RHID is minted from `"<name>-<logical timestamp>"`; registering
    /// the same name twice within one step is a `DuplicateRhid`.
    pub async fn register(
        &self,
        content: &[u8],
        kind: RhidKind,
        name: &str,
        creator: &Actor,
        content_type: Option<&str>,
    ) -> Result<Rhid> {
        let mut state = self.state.lock().await;
        if state.sealed {
            return Err(LedgerError::Sealed);
        }

        let created_at = state.clock.now();
        let rhid = Rhid::mint(kind, &format!("{name}-{created_at}"));
        if state.manifest.contains(&rhid) {
            return Err(LedgerError::DuplicateRhid(rhid));
        }

        let next_seq = state.ledger.next_seq();
        let storage_uri = self.put_unregistered(next_seq, &rhid, content).await?;
        let entry = ManifestEntry {
            rhid: rhid.clone(),
            sha256: Sha256Digest::of(content),
            content_type: content_type
                .unwrap_or_else(|| content_type_for(name))
                .to_string(),
            size_bytes: content.len() as u64,
            storage_uri,
            created_by_actor_id: creator.id.clone(),
            created_at,
        };

        state.manifest.insert(entry)?;
        if let Err(e) = self.store.write_manifest(state.manifest.manifest()).await {
            state.manifest.pop();
            return Err(e.into());
        }

        debug!(%rhid, name, size = content.len(), "registered object");
        Ok(rhid)
    }

    /// Record one action: mint its receipt, chain its entry, persist both.
    ///
    /// Persistence order: objects and receipt, then the ledger line
    /// (compare-and-swap on the tail), then the manifest. A writer that
    /// loses the race gets `TailConflict` and the ledger is untouched.
    pub async fn append(&self, request: ActionRequest) -> Result<AppendOutcome> {
        let mut state = self.state.lock().await;
        if state.sealed {
            return Err(LedgerError::Sealed);
        }

        let timestamp = state.clock.now();
        let duration_ms = request
            .duration_ms
            .unwrap_or(self.config.default_duration_ms);
        let next_seq = state.ledger.next_seq();
        let mut staged: Vec<ManifestEntry> = Vec::new();

        let policy_rhid = match request.decision {
            Some(_) => Some(
                self.stage_policy(
                    &state.manifest,
                    next_seq,
                    &request.action_type,
                    &timestamp,
                    &mut staged,
                )
                .await?,
            ),
            None => None,
        };

        let receipt = if request.mint_receipt {
            let evidence: Vec<Rhid> = request
                .inputs
                .iter()
                .chain(request.outputs.iter())
                .cloned()
                .collect();
            let receipt = state.receipts.mint(
                &request.action_type,
                timestamp.clone(),
                policy_rhid,
                &evidence,
                self.signer.as_deref(),
            )?;
            self.stage_receipt(&state.manifest, next_seq, &receipt, &timestamp, &mut staged)
                .await?;
            Some(receipt)
        } else {
            None
        };
        let receipt_rhid = receipt.as_ref().map(Receipt::rhid);

        let draft = EntryDraft {
            step_id: request.step_id,
            actor_id: request.actor.id,
            actor_type: request.actor.actor_type,
            action_type: request.action_type,
            policy_decision: request.decision,
            timestamp,
            duration_ms,
            status: request.status,
            inputs: request.inputs,
            outputs: request.outputs,
            receipt_rhid: receipt_rhid.clone(),
        };
        let (entry, entry_hash) = state.ledger.link(draft)?;

        match self.store.append_ledger_entry(&entry).await? {
            AppendResult::Appended => {}
            AppendResult::Conflict { tail_len } => {
                warn!(seq = entry.seq, tail_len, "another writer moved the ledger tail");
                return Err(LedgerError::TailConflict {
                    expected: entry.seq,
                    tail_len,
                });
            }
        }

        // The ledger line is durable: commit.
        state.ledger.advance(&entry, entry_hash)?;
        if let Some(receipt) = &receipt {
            state.receipts.advance(receipt);
        }
        for manifest_entry in staged {
            state.manifest.insert(manifest_entry)?;
        }
        state.clock.advance(duration_ms);
        if entry.is_seal() {
            state.sealed = true;
        }
        self.store.write_manifest(state.manifest.manifest()).await?;

        info!(
            seq = entry.seq,
            action_type = %entry.action_type,
            receipt = ?receipt_rhid,
            "appended action"
        );
        Ok(AppendOutcome {
            seq: entry.seq,
            receipt_rhid,
            entry_hash,
        })
    }

    /// Store the policy record for an action type, once per run.
    async fn stage_policy(
        &self,
        manifest: &IndexedManifest,
        next_seq: u64,
        action_type: &str,
        timestamp: &Timestamp,
        staged: &mut Vec<ManifestEntry>,
    ) -> Result<Rhid> {
        let rhid = Rhid::policy_for(action_type);
        if manifest.contains(&rhid) {
            return Ok(rhid);
        }
        let content = policy_record(&rhid, action_type)?;
        let storage_uri = self.put_unregistered(next_seq, &rhid, &content).await?;
        staged.push(issued_entry(&self.config.issuer_id, &rhid, &content, storage_uri, timestamp));
        Ok(rhid)
    }

    async fn stage_receipt(
        &self,
        manifest: &IndexedManifest,
        next_seq: u64,
        receipt: &Receipt,
        timestamp: &Timestamp,
        staged: &mut Vec<ManifestEntry>,
    ) -> Result<()> {
        let rhid = receipt.rhid();
        if manifest.contains(&rhid) {
            return Err(LedgerError::DuplicateRhid(rhid));
        }
        let content = receipt.to_canonical_bytes()?;
        let storage_uri = self.put_unregistered(next_seq, &rhid, &content).await?;
        staged.push(issued_entry(&self.config.issuer_id, &rhid, &content, storage_uri, timestamp));
        Ok(())
    }

    /// Store bytes under an RHID the manifest does not register.
    ///
    /// Different bytes already there were left by an append or registration
    /// that never completed, and are replaced. If the ledger has moved past
    /// `next_seq` they may belong to another writer instead, so nothing is
    /// touched.
    async fn put_unregistered(&self, next_seq: u64, rhid: &Rhid, content: &[u8]) -> Result<String> {
        match self.store.put_object(rhid, content).await {
            Err(StoreError::ObjectExists(_)) => {
                let tail_len = self.store.ledger_len().await?;
                if tail_len != next_seq {
                    return Err(LedgerError::TailConflict {
                        expected: next_seq,
                        tail_len,
                    });
                }
                warn!(%rhid, "replacing bytes left by an incomplete write");
                Ok(self.store.replace_object(rhid, content).await?)
            }
            result => Ok(result?),
        }
    }
}

fn issued_entry(
    issuer_id: &str,
    rhid: &Rhid,
    content: &[u8],
    storage_uri: String,
    timestamp: &Timestamp,
) -> ManifestEntry {
    ManifestEntry {
        rhid: rhid.clone(),
        sha256: Sha256Digest::of(content),
        content_type: JSON_CONTENT_TYPE.to_string(),
        size_bytes: content.len() as u64,
        storage_uri,
        created_by_actor_id: issuer_id.to_string(),
        created_at: timestamp.clone(),
    }
}

fn policy_record(rhid: &Rhid, action_type: &str) -> Result<Vec<u8>> {
    let record = PolicyRecord {
        policy_rhid: rhid,
        action_type,
    };
    Ok(canonical_json(&record)?)
}

/// Body of the object a policy RHID names.
#[derive(serde::Serialize)]
struct PolicyRecord<'a> {
    policy_rhid: &'a Rhid,
    action_type: &'a str,
}

/// Register the receipts and policy records the ledger relies on that the
/// manifest lacks, in the order an uninterrupted run would have. Only
/// records whose bytes are in the store are registered. Returns how many.
async fn reregister_issued<S: Store>(
    store: &S,
    issuer_id: &str,
    ledger: &[LedgerEntry],
    receipts: &[Receipt],
    manifest: &mut IndexedManifest,
) -> Result<usize> {
    let by_rhid: HashMap<Rhid, &Receipt> = receipts.iter().map(|r| (r.rhid(), r)).collect();
    let mut recovered = 0;
    for entry in ledger {
        let Some(receipt_rhid) = &entry.receipt_rhid else {
            continue;
        };
        let policy = by_rhid
            .get(receipt_rhid)
            .and_then(|receipt| receipt.policy_rhid.as_ref());
        for rhid in policy.into_iter().chain(std::iter::once(receipt_rhid)) {
            if manifest.contains(rhid) {
                continue;
            }
            let Some(content) = store.get_object(rhid).await? else {
                continue;
            };
            let storage_uri = store.put_object(rhid, &content).await?;
            manifest.insert(issued_entry(issuer_id, rhid, &content, storage_uri, &entry.timestamp))?;
            debug!(%rhid, seq = entry.seq, "re-registered issued record");
            recovered += 1;
        }
    }
    Ok(recovered)
}

/// Receipts the ledger references, in first-reference order.
async fn referenced_receipts<S: Store>(store: &S, ledger: &[LedgerEntry]) -> Result<Vec<Receipt>> {
    let mut receipts: Vec<Receipt> = Vec::new();
    for rhid in ledger.iter().filter_map(|e| e.receipt_rhid.as_ref()) {
        if receipts.iter().any(|r| &r.rhid() == rhid) {
            continue;
        }
        let receipt = store
            .get_receipt(rhid)
            .await?
            .ok_or_else(|| LedgerError::MissingReceipt(rhid.clone()))?;
        receipts.push(receipt);
    }
    Ok(receipts)
}
