//! Loading a bundle out of a store and verifying it.

use std::collections::BTreeMap;

use bytes::Bytes;
use tracing::{debug, warn};

use evidence_ledger_core::{
    EvidenceBundle, Receipt, Rhid, RhidKind, VerificationReport, Verifier,
};
use evidence_ledger_store::Store;

use crate::error::{LedgerError, Result};

/// Read a whole bundle from a store.
///
/// Receipts are gathered from the manifest and from ledger references; a
/// referenced receipt the store does not hold is left out so the verifier
/// reports it. With `with_objects`, the stored bytes of every manifest
/// entry are loaded for the content digest check.
pub async fn load_bundle<S: Store + ?Sized>(store: &S, with_objects: bool) -> Result<EvidenceBundle> {
    let manifest = store
        .read_manifest()
        .await?
        .ok_or(LedgerError::MissingManifest)?;
    let ledger = store.read_ledger().await?;

    let mut receipts: BTreeMap<Rhid, Receipt> = BTreeMap::new();
    let referenced = ledger.iter().filter_map(|e| e.receipt_rhid.as_ref());
    let registered = manifest
        .entries_of_kind(RhidKind::Receipt)
        .map(|e| &e.rhid);
    for rhid in referenced.chain(registered) {
        if receipts.contains_key(rhid) {
            continue;
        }
        if let Some(receipt) = store.get_receipt(rhid).await? {
            receipts.insert(rhid.clone(), receipt);
        }
    }

    let mut bundle = EvidenceBundle::new(manifest, ledger, receipts);
    if with_objects {
        let mut objects: BTreeMap<Rhid, Bytes> = BTreeMap::new();
        for entry in &bundle.manifest.entries {
            if let Some(bytes) = store.get_object(&entry.rhid).await? {
                objects.insert(entry.rhid.clone(), bytes);
            }
        }
        bundle = bundle.with_objects(objects);
    }

    debug!(
        entries = bundle.ledger.len(),
        manifest_entries = bundle.manifest.len(),
        receipts = bundle.receipts.len(),
        "loaded bundle"
    );
    Ok(bundle)
}

/// Load and verify a bundle. Stored bytes are loaded only when the
/// verifier checks content digests.
pub async fn verify_store<S: Store + ?Sized>(
    store: &S,
    verifier: &Verifier,
) -> Result<VerificationReport> {
    let bundle = load_bundle(store, verifier.config().check_content_digests).await?;
    let report = verifier.verify(&bundle)?;
    if report.is_valid() {
        debug!(entries = report.entries.len(), pack = ?report.pack, "bundle verified");
    } else {
        warn!(
            findings = report.findings.len(),
            chain_break_at = ?report.chain_break_at,
            "bundle has findings"
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use evidence_ledger_core::{Actor, Finding, PolicyDecision, VerifierConfig};
    use evidence_ledger_store::MemoryStore;

    use crate::{ActionRequest, EvidenceWriter, WriterConfig};

    fn executor() -> Actor {
        Actor::new("tool:executor", "tool", "CodeExecutor")
    }

    async fn small_run() -> EvidenceWriter<MemoryStore> {
        let writer = EvidenceWriter::new(MemoryStore::new(), WriterConfig::default());
        let out = writer
            .register(b"ok", RhidKind::Toolio, "run.log", &executor(), None)
            .await
            .unwrap();
        writer
            .append(ActionRequest::new("step-0", &executor(), "tool.run").output(out))
            .await
            .unwrap();
        writer
            .append(
                ActionRequest::new("step-1", &executor(), "gate.resolve")
                    .decision(PolicyDecision::Allow),
            )
            .await
            .unwrap();
        writer
    }

    #[tokio::test]
    async fn test_load_requires_manifest() {
        let store = MemoryStore::new();
        assert!(matches!(
            load_bundle(&store, false).await,
            Err(LedgerError::MissingManifest)
        ));
    }

    #[tokio::test]
    async fn test_load_collects_receipts_and_objects() {
        let writer = small_run().await;
        let bundle = load_bundle(writer.store(), true).await.unwrap();
        assert_eq!(bundle.ledger.len(), 2);
        assert_eq!(bundle.receipts.len(), 2);
        // Object, policy record and two receipts.
        assert_eq!(bundle.manifest.len(), 4);
        assert_eq!(bundle.objects.as_ref().map(BTreeMap::len), Some(4));

        let without = load_bundle(writer.store(), false).await.unwrap();
        assert!(without.objects.is_none());
    }

    #[tokio::test]
    async fn test_verify_store_clean_run() {
        let writer = small_run().await;
        let report = writer.verify().await.unwrap();
        assert!(report.is_valid(), "{:?}", report.findings);
        assert!(report.pack.compliant());
        assert!(!report.pack.sealed());
    }

    #[tokio::test]
    async fn test_verify_store_reports_missing_object() {
        let writer = small_run().await;
        let mut manifest = writer.manifest().await;
        let mut phantom = manifest.entries[0].clone();
        phantom.rhid = Rhid::mint(RhidKind::Artifact, "never-stored");
        manifest.entries.push(phantom.clone());
        writer.store().write_manifest(&manifest).await.unwrap();

        let report = verify_store(writer.store(), &Verifier::default())
            .await
            .unwrap();
        assert!(report.findings.iter().any(|f| matches!(
            f,
            Finding::ContentDigestMismatch { rhid, actual: None, .. } if *rhid == phantom.rhid
        )));

        let lenient = Verifier::new(VerifierConfig {
            check_content_digests: false,
            ..VerifierConfig::default()
        });
        let report = verify_store(writer.store(), &lenient).await.unwrap();
        assert!(report.is_valid());
    }
}
