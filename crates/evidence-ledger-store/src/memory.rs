//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as the file and
//! SQLite backends but keeps everything in memory with no persistence.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, warn};

use evidence_ledger_core::{LedgerEntry, Manifest, Rhid};

use crate::error::{Result, StoreError};
use crate::traits::{check_write_once, AppendResult, Store};

/// URI scheme of objects held by [`MemoryStore`].
pub const MEMORY_URI_SCHEME: &str = "mem://";

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Object and receipt bytes, keyed by RHID.
    objects: BTreeMap<Rhid, Bytes>,
    manifest: Option<Manifest>,
    ledger: Vec<LedgerEntry>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn put_object(&self, rhid: &Rhid, content: &[u8]) -> Result<String> {
        let mut inner = self.write()?;
        let existing = inner.objects.get(rhid).map(|b| b.as_ref());
        if check_write_once(rhid, existing, content)? {
            inner
                .objects
                .insert(rhid.clone(), Bytes::copy_from_slice(content));
            debug!(%rhid, size = content.len(), "stored object");
        }
        Ok(format!("{MEMORY_URI_SCHEME}{rhid}"))
    }

    async fn get_object(&self, rhid: &Rhid) -> Result<Option<Bytes>> {
        Ok(self.read()?.objects.get(rhid).cloned())
    }

    async fn replace_object(&self, rhid: &Rhid, content: &[u8]) -> Result<String> {
        let previous = self
            .write()?
            .objects
            .insert(rhid.clone(), Bytes::copy_from_slice(content));
        if previous.is_some() {
            warn!(%rhid, "replaced unregistered object");
        }
        Ok(format!("{MEMORY_URI_SCHEME}{rhid}"))
    }

    async fn write_manifest(&self, manifest: &Manifest) -> Result<()> {
        self.write()?.manifest = Some(manifest.clone());
        Ok(())
    }

    async fn read_manifest(&self) -> Result<Option<Manifest>> {
        Ok(self.read()?.manifest.clone())
    }

    async fn append_ledger_entry(&self, entry: &LedgerEntry) -> Result<AppendResult> {
        let mut inner = self.write()?;
        let tail_len = inner.ledger.len() as u64;
        if entry.seq != tail_len {
            warn!(seq = entry.seq, tail_len, "ledger append conflict");
            return Ok(AppendResult::Conflict { tail_len });
        }
        inner.ledger.push(entry.clone());
        Ok(AppendResult::Appended)
    }

    async fn read_ledger(&self) -> Result<Vec<LedgerEntry>> {
        Ok(self.read()?.ledger.clone())
    }

    async fn ledger_len(&self) -> Result<u64> {
        Ok(self.read()?.ledger.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evidence_ledger_core::{
        Actor, EntryDraft, LedgerChain, ReceiptBuilder, RhidKind, Timestamp,
    };

    fn ts() -> Timestamp {
        Timestamp::from_raw("2026-02-07T08:00:00.000Z")
    }

    fn entries(n: usize) -> Vec<LedgerEntry> {
        let actor = Actor::new("agent:planner", "agent", "Planner");
        let mut chain = LedgerChain::new();
        (0..n)
            .map(|i| {
                let (entry, hash) = chain
                    .link(EntryDraft::new(format!("step-{i}"), &actor, "task.plan", ts()))
                    .unwrap();
                chain.advance(&entry, hash).unwrap();
                entry
            })
            .collect()
    }

    #[tokio::test]
    async fn test_memory_store_replace_object() {
        let store = MemoryStore::new();
        let rhid = Rhid::mint(RhidKind::Receipt, "rcpt_0");
        store.put_object(&rhid, b"aborted").await.unwrap();
        assert!(store.put_object(&rhid, b"retried").await.is_err());

        let uri = store.replace_object(&rhid, b"retried").await.unwrap();
        assert_eq!(uri, format!("mem://{rhid}"));
        assert_eq!(
            store.get_object(&rhid).await.unwrap(),
            Some(Bytes::from_static(b"retried"))
        );
    }

    #[tokio::test]
    async fn test_memory_store_objects() {
        let store = MemoryStore::new();
        let rhid = Rhid::mint(RhidKind::Artifact, "plan.md");

        let uri = store.put_object(&rhid, b"# plan").await.unwrap();
        assert_eq!(uri, format!("mem://{rhid}"));
        assert_eq!(
            store.get_object(&rhid).await.unwrap().unwrap(),
            Bytes::from_static(b"# plan")
        );

        // Identical bytes are idempotent, different bytes are refused.
        store.put_object(&rhid, b"# plan").await.unwrap();
        assert!(matches!(
            store.put_object(&rhid, b"# other").await,
            Err(StoreError::ObjectExists(_))
        ));

        let missing = Rhid::mint(RhidKind::Artifact, "nope");
        assert!(store.get_object(&missing).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_receipt_is_object() {
        let store = MemoryStore::new();
        let receipt = ReceiptBuilder::new("rcpt_1", "run-1", "tool.run", ts())
            .mint(None)
            .unwrap();
        let rhid = receipt.rhid();
        store.put_receipt(&rhid, &receipt).await.unwrap();

        assert_eq!(store.get_receipt(&rhid).await.unwrap(), Some(receipt.clone()));
        let bytes = store.get_object(&rhid).await.unwrap().unwrap();
        assert_eq!(bytes.as_ref(), receipt.to_canonical_bytes().unwrap().as_slice());
    }

    #[tokio::test]
    async fn test_memory_store_ledger_cas() {
        let store = MemoryStore::new();
        let entries = entries(3);

        assert_eq!(
            store.append_ledger_entry(&entries[0]).await.unwrap(),
            AppendResult::Appended
        );
        // Skipping ahead is a conflict and writes nothing.
        assert_eq!(
            store.append_ledger_entry(&entries[2]).await.unwrap(),
            AppendResult::Conflict { tail_len: 1 }
        );
        // Replaying seq 0 is a conflict too.
        assert_eq!(
            store.append_ledger_entry(&entries[0]).await.unwrap(),
            AppendResult::Conflict { tail_len: 1 }
        );
        store.append_ledger_entry(&entries[1]).await.unwrap();
        assert_eq!(store.ledger_len().await.unwrap(), 2);
        assert_eq!(store.read_ledger().await.unwrap(), entries[..2].to_vec());
    }

    #[tokio::test]
    async fn test_memory_store_manifest() {
        let store = MemoryStore::new();
        assert!(store.read_manifest().await.unwrap().is_none());
        store.write_manifest(&Manifest::new()).await.unwrap();
        assert_eq!(store.read_manifest().await.unwrap(), Some(Manifest::new()));
    }
}
