//! End-to-end tests: produce a bundle on disk, tamper with it the way an
//! attacker or a broken disk would, and check what the verifier reports.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tempfile::TempDir;

use evidence_ledger::core::{EntryStatus, ExhibitStatus, ReceiptCheck, ReferenceRole};
use evidence_ledger::store::fs::{LEDGER_FILE, MANIFEST_FILE};
use evidence_ledger::store::{FsStore, MemoryStore, SqliteStore, Store, StoreError};
use evidence_ledger::{
    load_bundle, verify_store, ActionRequest, Actor, Banner, EvidenceWriter, Finding,
    LedgerError, PolicyDecision, Rhid, RhidKind, Verifier, WriterConfig,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn planner() -> Actor {
    Actor::new("agent:planner", "agent", "Planner")
}

fn executor() -> Actor {
    Actor::new("tool:executor", "tool", "CodeExecutor")
}

fn reviewer() -> Actor {
    Actor::new("human:reviewer", "human", "Reviewer")
}

/// workflow.start, task.plan, tool.run, gate.resolve(allow), pack.seal.
/// Returns the RHID of the tool output.
async fn happy_path<S: Store>(writer: &EvidenceWriter<S>) -> Result<Rhid> {
    writer
        .append(ActionRequest::new("step-0", &planner(), "workflow.start"))
        .await?;

    let plan = writer
        .register(b"# Plan\n1. run tests\n", RhidKind::Artifact, "plan.md", &planner(), None)
        .await?;
    writer
        .append(ActionRequest::new("step-1", &planner(), "task.plan").output(plan.clone()))
        .await?;

    let log = writer
        .register(b"42 passed", RhidKind::Toolio, "pytest.log", &executor(), None)
        .await?;
    writer
        .append(
            ActionRequest::new("step-2", &executor(), "tool.run")
                .input(plan.clone())
                .output(log.clone())
                .duration_ms(1_850),
        )
        .await?;

    writer
        .append(
            ActionRequest::new("step-3", &reviewer(), "gate.resolve")
                .input(log.clone())
                .decision(PolicyDecision::Allow),
        )
        .await?;
    writer
        .append(ActionRequest::new("step-4", &reviewer(), "pack.seal"))
        .await?;
    Ok(log)
}

fn rewrite_ledger_line(root: &Path, seq: usize, edit: impl FnOnce(&mut serde_json::Value)) {
    let path = root.join(LEDGER_FILE);
    let text = std::fs::read_to_string(&path).unwrap();
    let mut lines: Vec<String> = text.lines().map(String::from).collect();
    let mut value: serde_json::Value = serde_json::from_str(&lines[seq]).unwrap();
    edit(&mut value);
    lines[seq] = serde_json::to_string(&value).unwrap();
    std::fs::write(&path, lines.join("\n") + "\n").unwrap();
}

#[tokio::test]
async fn happy_path_on_disk() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let writer = EvidenceWriter::new(FsStore::open(dir.path()).await?, WriterConfig::default());
    happy_path(&writer).await?;

    assert!(dir.path().join(LEDGER_FILE).exists());
    assert!(dir.path().join(MANIFEST_FILE).exists());
    let ledger_text = std::fs::read_to_string(dir.path().join(LEDGER_FILE))?;
    assert_eq!(ledger_text.lines().count(), 5);

    let report = writer.verify().await?;
    assert!(report.is_valid(), "{:?}", report.findings);
    assert!(report.pack.sealed());
    assert!(report.pack.compliant());
    assert_eq!(report.invalid_entries().count(), 0);
    assert_eq!(report.banner(), Banner::Sealed);
    for entry in &report.entries {
        assert!(matches!(entry.receipt, ReceiptCheck::Verified { .. }));
        assert!(entry.entry_hash.is_some());
    }
    Ok(())
}

#[tokio::test]
async fn every_manifest_digest_matches_stored_bytes() -> Result<()> {
    let dir = TempDir::new()?;
    let store = FsStore::open(dir.path()).await?;
    let writer = EvidenceWriter::new(store, WriterConfig::default());
    happy_path(&writer).await?;

    let manifest = writer.manifest().await;
    // Two objects, one policy record, five receipts.
    assert_eq!(manifest.len(), 8);
    for entry in &manifest.entries {
        let bytes = writer.store().get_object(&entry.rhid).await?.unwrap();
        assert!(entry.matches_content(&bytes), "{}", entry.rhid);
        assert_eq!(entry.size_bytes, bytes.len() as u64);
        let path = entry.storage_uri.strip_prefix("file://").unwrap();
        assert_eq!(std::fs::read(path)?, bytes.to_vec());
    }
    Ok(())
}

#[tokio::test]
async fn edited_ledger_line_breaks_chain_at_next_entry() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let writer = EvidenceWriter::new(FsStore::open(dir.path()).await?, WriterConfig::default());
    happy_path(&writer).await?;

    rewrite_ledger_line(dir.path(), 2, |entry| {
        entry["duration_ms"] = serde_json::json!(5);
    });

    let report = writer.verify().await?;
    assert_eq!(report.chain_break_at, Some(3));
    assert!(matches!(
        report.findings.as_slice(),
        [Finding::ChainDiscontinuity { seq: 3, .. }]
    ));
    let statuses: Vec<_> = report.entries.iter().map(|e| e.status).collect();
    assert_eq!(
        statuses,
        vec![
            EntryStatus::Valid,
            EntryStatus::Valid,
            EntryStatus::Valid,
            EntryStatus::ChainBroken,
            EntryStatus::ChainBroken,
        ]
    );
    // Nothing past the break is trusted, the seal included.
    assert!(!report.pack.sealed());
    assert_eq!(report.banner(), Banner::Blocked);
    // Raw entries stay available for inspection.
    assert_eq!(report.entries[4].entry.action_type, "pack.seal");
    Ok(())
}

#[tokio::test]
async fn edited_receipt_file_is_tampered() -> Result<()> {
    let dir = TempDir::new()?;
    let store = FsStore::open(dir.path()).await?;
    let writer = EvidenceWriter::new(store, WriterConfig::default());
    happy_path(&writer).await?;

    let ledger = writer.store().read_ledger().await?;
    let receipt_rhid = ledger[3].receipt_rhid.clone().unwrap();
    let path = writer.store().object_path(&receipt_rhid);
    let mut receipt: serde_json::Value = serde_json::from_slice(&std::fs::read(&path)?)?;
    receipt["action_type"] = serde_json::json!("gate.skip");
    std::fs::write(&path, serde_json::to_vec(&receipt)?)?;

    let report = writer.verify().await?;
    assert_eq!(report.entries[3].status, EntryStatus::TamperedReceipt);
    assert!(matches!(report.entries[3].receipt, ReceiptCheck::Tampered { .. }));
    assert!(report.findings.iter().any(|f| matches!(
        f,
        Finding::ContentDigestMismatch { rhid, actual: Some(_), .. } if *rhid == receipt_rhid
    )));
    // The ledger chain itself is intact.
    assert_eq!(report.chain_break_at, None);
    assert_eq!(report.entries[4].status, EntryStatus::Valid);
    Ok(())
}

#[tokio::test]
async fn removed_manifest_entry_flags_one_exhibit() -> Result<()> {
    let writer = EvidenceWriter::new(MemoryStore::new(), WriterConfig::default());
    let log = happy_path(&writer).await?;

    let mut manifest = writer.manifest().await;
    manifest.entries.retain(|e| e.rhid != log);
    writer.store().write_manifest(&manifest).await?;

    let report = verify_store(writer.store(), &Verifier::default()).await?;
    let unresolved: Vec<_> = report.unresolved_exhibits().collect();
    // Output of tool.run and input of gate.resolve.
    assert_eq!(unresolved.len(), 2);
    assert_eq!((unresolved[0].0, unresolved[0].1.role), (2, ReferenceRole::Output));
    assert_eq!((unresolved[1].0, unresolved[1].1.role), (3, ReferenceRole::Input));
    assert_eq!(report.invalid_entries().count(), 0);
    assert_eq!(report.chain_break_at, None);

    let tool_run = &report.entries[2];
    assert_eq!(tool_run.exhibits[0].status, ExhibitStatus::Resolved);
    assert_eq!(tool_run.exhibits[1].status, ExhibitStatus::Unresolved);
    Ok(())
}

#[tokio::test]
async fn truncated_ledger_is_insufficient_data() -> Result<()> {
    let dir = TempDir::new()?;
    let writer = EvidenceWriter::new(FsStore::open(dir.path()).await?, WriterConfig::default());
    happy_path(&writer).await?;

    let path = dir.path().join(LEDGER_FILE);
    let mut bytes = std::fs::read(&path)?;
    bytes.truncate(bytes.len() - 20);
    std::fs::write(&path, bytes)?;

    let store = FsStore::open(dir.path()).await?;
    let err = load_bundle(&store, false).await.unwrap_err();
    assert!(matches!(
        err,
        LedgerError::Store(StoreError::Truncated { complete_lines: 4 })
    ));
    assert!(EvidenceWriter::resume(store, WriterConfig::default()).await.is_err());
    Ok(())
}

#[tokio::test]
async fn reordered_ledger_is_rejected() -> Result<()> {
    let dir = TempDir::new()?;
    let writer = EvidenceWriter::new(FsStore::open(dir.path()).await?, WriterConfig::default());
    happy_path(&writer).await?;

    let path = dir.path().join(LEDGER_FILE);
    let text = std::fs::read_to_string(&path)?;
    let mut lines: Vec<&str> = text.lines().collect();
    lines.swap(1, 2);
    std::fs::write(&path, lines.join("\n") + "\n")?;

    let err = writer.verify().await.unwrap_err();
    assert!(matches!(err, LedgerError::Structural(_)));
    Ok(())
}

#[tokio::test]
async fn resumed_writer_extends_the_same_chain() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    {
        let writer =
            EvidenceWriter::new(FsStore::open(dir.path()).await?, WriterConfig::default());
        writer
            .append(ActionRequest::new("step-0", &planner(), "workflow.start"))
            .await?;
        writer
            .append(
                ActionRequest::new("step-1", &reviewer(), "gate.resolve")
                    .decision(PolicyDecision::Flag),
            )
            .await?;
    }

    let writer =
        EvidenceWriter::resume(FsStore::open(dir.path()).await?, WriterConfig::default()).await?;
    assert_eq!(writer.next_seq().await, 2);
    writer
        .append(
            ActionRequest::new("step-2", &reviewer(), "gate.resolve")
                .decision(PolicyDecision::Allow),
        )
        .await?;

    let report = writer.verify().await?;
    assert!(report.is_valid(), "{:?}", report.findings);
    assert_eq!(report.entries.len(), 3);
    assert!(report.pack.compliant());
    // The policy record was registered once, before the restart.
    assert_eq!(
        writer
            .manifest()
            .await
            .entries_of_kind(RhidKind::Policy)
            .count(),
        1
    );
    Ok(())
}

#[tokio::test]
async fn resume_of_sealed_run_stays_sealed() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let writer = EvidenceWriter::new(store.clone(), WriterConfig::default());
    happy_path(&writer).await?;
    drop(writer);

    let resumed = EvidenceWriter::resume(store, WriterConfig::default()).await?;
    assert!(resumed.is_sealed().await);
    let err = resumed
        .append(ActionRequest::new("step-5", &planner(), "task.plan"))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Sealed));
    Ok(())
}

#[tokio::test]
async fn concurrent_appends_stay_linear() -> Result<()> {
    let writer = Arc::new(EvidenceWriter::new(
        SqliteStore::open_memory()?,
        WriterConfig::default(),
    ));

    let mut handles = Vec::new();
    for i in 0..16 {
        let writer = writer.clone();
        handles.push(tokio::spawn(async move {
            writer
                .append(ActionRequest::new(format!("step-{i}"), &executor(), "tool.run"))
                .await
        }));
    }
    let mut seqs = Vec::new();
    for handle in handles {
        seqs.push(handle.await??.seq);
    }
    seqs.sort_unstable();
    assert_eq!(seqs, (0..16).collect::<Vec<_>>());

    let report = writer.verify().await?;
    assert!(report.is_valid(), "{:?}", report.findings);
    assert_eq!(report.entries.len(), 16);
    Ok(())
}

#[tokio::test]
async fn identical_runs_produce_identical_bundles() -> Result<()> {
    let a = TempDir::new()?;
    let b = TempDir::new()?;
    for dir in [&a, &b] {
        let writer =
            EvidenceWriter::new(FsStore::open(dir.path()).await?, WriterConfig::default());
        happy_path(&writer).await?;
    }

    assert_eq!(
        std::fs::read(a.path().join(LEDGER_FILE))?,
        std::fs::read(b.path().join(LEDGER_FILE))?
    );
    // Storage URIs embed the bundle directory; everything else matches.
    let store_a = FsStore::open(a.path()).await?;
    let store_b = FsStore::open(b.path()).await?;
    let manifest_a = store_a.read_manifest().await?.unwrap();
    let manifest_b = store_b.read_manifest().await?.unwrap();
    let strip = |m: &evidence_ledger::Manifest| {
        m.entries
            .iter()
            .map(|e| (e.rhid.clone(), e.sha256, e.created_at.clone()))
            .collect::<Vec<_>>()
    };
    assert_eq!(strip(&manifest_a), strip(&manifest_b));
    Ok(())
}
