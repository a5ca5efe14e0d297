//! File-system implementation of the Store trait.
//!
//! Lays a bundle out on disk the way auditors receive it:
//!
//! ```text
//! <root>/collaboration_ledger.jsonl
//! <root>/evidence/manifest.json
//! <root>/evidence/receipts/<rhid_kind_fingerprint>.json
//! <root>/evidence/objects/<rhid_kind_fingerprint>.dat
//! ```
//!
//! Ledger appends take an exclusive advisory lock on `<root>/.ledger.lock`
//! for the length check and the write, so separate `FsStore` values and
//! separate processes on one directory still append one line per seq.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use fs2::FileExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use evidence_ledger_core::{canonical_json, parse_jsonl, to_jsonl_line, LedgerEntry, Manifest, Rhid, RhidKind};

use crate::error::{Result, StoreError};
use crate::traits::{check_write_once, AppendResult, Store};

pub const LEDGER_FILE: &str = "collaboration_ledger.jsonl";
pub const MANIFEST_FILE: &str = "evidence/manifest.json";
pub const RECEIPTS_DIR: &str = "evidence/receipts";
pub const OBJECTS_DIR: &str = "evidence/objects";
pub const LOCK_FILE: &str = ".ledger.lock";

/// A bundle directory on the local file system.
pub struct FsStore {
    root: PathBuf,
    /// Queues this value's appends before they contend for the file lock.
    ledger_lock: Mutex<()>,
}

impl FsStore {
    /// Open (or create) a bundle directory.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        tokio::fs::create_dir_all(root.join(RECEIPTS_DIR)).await?;
        tokio::fs::create_dir_all(root.join(OBJECTS_DIR)).await?;
        let root = tokio::fs::canonicalize(root).await?;
        debug!(root = %root.display(), "opened bundle directory");
        Ok(Self {
            root,
            ledger_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the bytes of an RHID live. Receipts are `.json` files under
    /// `evidence/receipts`, everything else `.dat` under `evidence/objects`.
    pub fn object_path(&self, rhid: &Rhid) -> PathBuf {
        match rhid.kind() {
            RhidKind::Receipt => self
                .root
                .join(RECEIPTS_DIR)
                .join(format!("{}.json", rhid.storage_stem())),
            _ => self
                .root
                .join(OBJECTS_DIR)
                .join(format!("{}.dat", rhid.storage_stem())),
        }
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.root.join(LEDGER_FILE)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    async fn read_ledger_bytes(&self) -> Result<Option<Vec<u8>>> {
        read_optional(&self.ledger_path()).await
    }
}

async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write through a temporary file so a reader never sees half the bytes.
async fn write_replacing(path: &Path, content: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, content).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Append `line` if the ledger holds exactly `seq` complete lines.
///
/// Runs on a blocking thread: the lock is held from the length check
/// through the sync, and released when `lock` is dropped.
fn append_locked(lock_path: &Path, ledger_path: &Path, seq: u64, line: &[u8]) -> Result<AppendResult> {
    let lock = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(lock_path)?;
    lock.lock_exclusive()?;

    let tail_len = match std::fs::read(ledger_path) {
        Ok(bytes) => complete_lines(&bytes)?,
        Err(e) if e.kind() == ErrorKind::NotFound => 0,
        Err(e) => return Err(e.into()),
    };
    if seq != tail_len {
        return Ok(AppendResult::Conflict { tail_len });
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(ledger_path)?;
    file.write_all(line)?;
    file.sync_data()?;
    drop(lock);
    Ok(AppendResult::Appended)
}

/// Count complete ledger lines, refusing a ledger cut short mid-line.
fn complete_lines(bytes: &[u8]) -> Result<u64> {
    let lines = bytes.iter().filter(|&&b| b == b'\n').count();
    match bytes.last() {
        None | Some(b'\n') => Ok(lines as u64),
        Some(_) => Err(StoreError::Truncated {
            complete_lines: lines,
        }),
    }
}

#[async_trait]
impl Store for FsStore {
    async fn put_object(&self, rhid: &Rhid, content: &[u8]) -> Result<String> {
        let path = self.object_path(rhid);
        let existing = read_optional(&path).await?;
        if check_write_once(rhid, existing.as_deref(), content)? {
            tokio::fs::write(&path, content).await?;
            debug!(%rhid, size = content.len(), "stored object");
        }
        Ok(format!("file://{}", path.display()))
    }

    async fn get_object(&self, rhid: &Rhid) -> Result<Option<Bytes>> {
        Ok(read_optional(&self.object_path(rhid)).await?.map(Bytes::from))
    }

    async fn replace_object(&self, rhid: &Rhid, content: &[u8]) -> Result<String> {
        let path = self.object_path(rhid);
        write_replacing(&path, content).await?;
        debug!(%rhid, size = content.len(), "replaced object");
        Ok(format!("file://{}", path.display()))
    }

    async fn write_manifest(&self, manifest: &Manifest) -> Result<()> {
        write_replacing(&self.manifest_path(), &canonical_json(manifest)?).await?;
        debug!(entries = manifest.len(), "wrote manifest");
        Ok(())
    }

    async fn read_manifest(&self) -> Result<Option<Manifest>> {
        match read_optional(&self.manifest_path()).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn append_ledger_entry(&self, entry: &LedgerEntry) -> Result<AppendResult> {
        let _guard = self.ledger_lock.lock().await;

        let line = to_jsonl_line(entry)?;
        let seq = entry.seq;
        let (lock_path, ledger_path) = (self.lock_path(), self.ledger_path());
        let result = tokio::task::spawn_blocking(move || {
            append_locked(&lock_path, &ledger_path, seq, &line)
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))??;

        match result {
            AppendResult::Appended => {
                debug!(seq, action_type = %entry.action_type, "appended ledger entry");
            }
            AppendResult::Conflict { tail_len } => {
                warn!(seq, tail_len, "ledger append conflict");
            }
        }
        Ok(result)
    }

    async fn read_ledger(&self) -> Result<Vec<LedgerEntry>> {
        let Some(bytes) = self.read_ledger_bytes().await? else {
            return Ok(Vec::new());
        };
        let text = String::from_utf8(bytes)
            .map_err(|e| StoreError::InvalidData(format!("ledger is not UTF-8: {e}")))?;
        Ok(parse_jsonl(&text)?)
    }

    async fn ledger_len(&self) -> Result<u64> {
        match self.read_ledger_bytes().await? {
            Some(bytes) => complete_lines(&bytes),
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evidence_ledger_core::{Actor, EntryDraft, LedgerChain, ReceiptBuilder, Timestamp};
    use tempfile::TempDir;

    fn ts() -> Timestamp {
        Timestamp::from_raw("2026-02-07T08:00:00.000Z")
    }

    fn entries(n: usize) -> Vec<LedgerEntry> {
        let actor = Actor::new("tool:executor", "tool", "CodeExecutor");
        let mut chain = LedgerChain::new();
        (0..n)
            .map(|i| {
                let (entry, hash) = chain
                    .link(EntryDraft::new(format!("step-{i}"), &actor, "tool.run", ts()))
                    .unwrap();
                chain.advance(&entry, hash).unwrap();
                entry
            })
            .collect()
    }

    #[tokio::test]
    async fn test_fs_store_layout() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::open(dir.path()).await.unwrap();

        let artifact = Rhid::mint(RhidKind::Artifact, "output.txt");
        let uri = store.put_object(&artifact, b"hello").await.unwrap();
        assert!(uri.starts_with("file://"));
        assert!(uri.ends_with(&format!("evidence/objects/{}.dat", artifact.storage_stem())));

        let receipt = ReceiptBuilder::new("rcpt_1", "run-1", "tool.run", ts())
            .mint(None)
            .unwrap();
        store.put_receipt(&receipt.rhid(), &receipt).await.unwrap();
        let on_disk = std::fs::read(store.object_path(&receipt.rhid())).unwrap();
        assert!(store.object_path(&receipt.rhid()).starts_with(store.root().join(RECEIPTS_DIR)));
        assert_eq!(on_disk, receipt.to_canonical_bytes().unwrap());
        assert_eq!(store.get_receipt(&receipt.rhid()).await.unwrap(), Some(receipt));
    }

    #[tokio::test]
    async fn test_fs_store_ledger_lines() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::open(dir.path()).await.unwrap();
        let entries = entries(3);

        assert!(store.read_ledger().await.unwrap().is_empty());
        for entry in &entries {
            assert_eq!(
                store.append_ledger_entry(entry).await.unwrap(),
                AppendResult::Appended
            );
        }
        assert_eq!(
            store.append_ledger_entry(&entries[1]).await.unwrap(),
            AppendResult::Conflict { tail_len: 3 }
        );

        let text = std::fs::read_to_string(store.ledger_path()).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.ends_with('\n'));
        assert_eq!(store.read_ledger().await.unwrap(), entries);
        assert_eq!(store.ledger_len().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_fs_store_truncated_ledger() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::open(dir.path()).await.unwrap();
        for entry in &entries(2) {
            store.append_ledger_entry(entry).await.unwrap();
        }
        let mut bytes = std::fs::read(store.ledger_path()).unwrap();
        bytes.truncate(bytes.len() - 10);
        std::fs::write(store.ledger_path(), bytes).unwrap();

        assert!(matches!(
            store.read_ledger().await,
            Err(StoreError::Truncated { complete_lines: 1 })
        ));
        // A cut-short ledger also refuses further appends.
        assert!(matches!(
            store.append_ledger_entry(&entries(3)[2]).await,
            Err(StoreError::Truncated { .. })
        ));
    }

    #[tokio::test]
    async fn test_fs_store_manifest_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::open(dir.path()).await.unwrap();
        assert!(store.read_manifest().await.unwrap().is_none());

        store.write_manifest(&Manifest::new()).await.unwrap();
        assert_eq!(store.read_manifest().await.unwrap(), Some(Manifest::new()));
        assert!(!store.manifest_path().with_extension("tmp").exists());
        assert_eq!(
            std::fs::read_to_string(store.manifest_path()).unwrap(),
            r#"{"entries":[]}"#
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_two_stores_on_one_directory_append_once() {
        let entry = entries(1).remove(0);
        for _ in 0..25 {
            let dir = TempDir::new().unwrap();
            let a = FsStore::open(dir.path()).await.unwrap();
            let b = FsStore::open(dir.path()).await.unwrap();

            let (ra, rb) = tokio::join!(
                tokio::spawn({
                    let entry = entry.clone();
                    async move { a.append_ledger_entry(&entry).await.unwrap() }
                }),
                tokio::spawn({
                    let entry = entry.clone();
                    async move { b.append_ledger_entry(&entry).await.unwrap() }
                }),
            );
            let mut results = [ra.unwrap(), rb.unwrap()];
            results.sort_by_key(|r| matches!(r, AppendResult::Conflict { .. }));
            assert_eq!(
                results,
                [AppendResult::Appended, AppendResult::Conflict { tail_len: 1 }]
            );

            let reopened = FsStore::open(dir.path()).await.unwrap();
            assert_eq!(reopened.read_ledger().await.unwrap(), vec![entry.clone()]);
        }
    }

    #[tokio::test]
    async fn test_fs_store_replace_object() {
        let dir = TempDir::new().unwrap();
        let store = FsStore::open(dir.path()).await.unwrap();
        let rhid = Rhid::mint(RhidKind::Receipt, "rcpt_0");

        store.put_object(&rhid, b"aborted").await.unwrap();
        assert!(matches!(
            store.put_object(&rhid, b"retried").await,
            Err(StoreError::ObjectExists(_))
        ));
        let uri = store.replace_object(&rhid, b"retried").await.unwrap();
        assert_eq!(uri, format!("file://{}", store.object_path(&rhid).display()));
        assert_eq!(
            store.get_object(&rhid).await.unwrap(),
            Some(Bytes::from_static(b"retried"))
        );
    }

    #[tokio::test]
    async fn test_fs_store_reopen() {
        let dir = TempDir::new().unwrap();
        let rhid = Rhid::mint(RhidKind::Llm, "completion");
        {
            let store = FsStore::open(dir.path()).await.unwrap();
            store.put_object(&rhid, b"tokens").await.unwrap();
        }
        let store = FsStore::open(dir.path()).await.unwrap();
        assert_eq!(
            store.get_object(&rhid).await.unwrap(),
            Some(Bytes::from_static(b"tokens"))
        );
    }
}
