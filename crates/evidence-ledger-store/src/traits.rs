//! Store trait: the abstract interface for bundle persistence.
//!
//! A bundle is four things: raw object bytes, receipt files, the manifest
//! document, and the JSON-lines ledger. Backends decide where they live; the
//! writer and the verifier only see this trait.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use evidence_ledger_core::{LedgerEntry, Manifest, Receipt, Rhid};

use crate::error::{Result, StoreError};

/// Result of a compare-and-swap ledger append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendResult {
    /// The entry is now the last line of the ledger.
    Appended,
    /// The entry's `seq` was not the ledger length; nothing was written.
    Conflict {
        /// Number of entries actually in the ledger.
        tail_len: u64,
    },
}

/// The Store trait: async interface for bundle persistence.
///
/// # Design Notes
///
/// - **Write-once objects**: storing identical bytes twice is a no-op;
///   storing different bytes under an existing RHID is `ObjectExists`.
///   `replace_object` is the one way around it, for unregistered leftovers.
/// - **Receipts are objects**: a receipt is stored as its canonical bytes,
///   so `get_object` on a receipt RHID returns the receipt file.
/// - **Compare-and-swap appends**: `append_ledger_entry` only writes when
///   `entry.seq` equals the current ledger length.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Object Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Store raw content under an RHID. Returns the storage URI.
    async fn put_object(&self, rhid: &Rhid, content: &[u8]) -> Result<String>;

    /// Raw bytes stored under an RHID, receipt files included.
    async fn get_object(&self, rhid: &Rhid) -> Result<Option<Bytes>>;

    /// Store content under an RHID, overwriting whatever is there.
    ///
    /// Only for RHIDs no manifest registers: bytes left behind by an append
    /// that never reached the ledger.
    async fn replace_object(&self, rhid: &Rhid, content: &[u8]) -> Result<String>;

    /// Store a receipt as its canonical bytes. Returns the storage URI.
    async fn put_receipt(&self, rhid: &Rhid, receipt: &Receipt) -> Result<String> {
        let bytes = receipt.to_canonical_bytes()?;
        self.put_object(rhid, &bytes).await
    }

    async fn get_receipt(&self, rhid: &Rhid) -> Result<Option<Receipt>> {
        match self.get_object(rhid).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Manifest Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Replace the stored manifest document.
    async fn write_manifest(&self, manifest: &Manifest) -> Result<()>;

    /// The stored manifest, `None` if none was ever written.
    async fn read_manifest(&self) -> Result<Option<Manifest>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Ledger Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Append one entry if `entry.seq` is the current ledger length.
    async fn append_ledger_entry(&self, entry: &LedgerEntry) -> Result<AppendResult>;

    /// Every entry, in stored order. A cut-short ledger is an error.
    async fn read_ledger(&self) -> Result<Vec<LedgerEntry>>;

    /// Number of entries in the ledger.
    async fn ledger_len(&self) -> Result<u64>;
}

/// A shared store is a store: several writers may point at one backend.
#[async_trait]
impl<T: Store + ?Sized> Store for Arc<T> {
    async fn put_object(&self, rhid: &Rhid, content: &[u8]) -> Result<String> {
        (**self).put_object(rhid, content).await
    }

    async fn get_object(&self, rhid: &Rhid) -> Result<Option<Bytes>> {
        (**self).get_object(rhid).await
    }

    async fn replace_object(&self, rhid: &Rhid, content: &[u8]) -> Result<String> {
        (**self).replace_object(rhid, content).await
    }

    async fn put_receipt(&self, rhid: &Rhid, receipt: &Receipt) -> Result<String> {
        (**self).put_receipt(rhid, receipt).await
    }

    async fn get_receipt(&self, rhid: &Rhid) -> Result<Option<Receipt>> {
        (**self).get_receipt(rhid).await
    }

    async fn write_manifest(&self, manifest: &Manifest) -> Result<()> {
        (**self).write_manifest(manifest).await
    }

    async fn read_manifest(&self) -> Result<Option<Manifest>> {
        (**self).read_manifest().await
    }

    async fn append_ledger_entry(&self, entry: &LedgerEntry) -> Result<AppendResult> {
        (**self).append_ledger_entry(entry).await
    }

    async fn read_ledger(&self) -> Result<Vec<LedgerEntry>> {
        (**self).read_ledger().await
    }

    async fn ledger_len(&self) -> Result<u64> {
        (**self).ledger_len().await
    }
}

/// Whether `content` still has to be written under `rhid`.
pub(crate) fn check_write_once(
    rhid: &Rhid,
    existing: Option<&[u8]>,
    content: &[u8],
) -> Result<bool> {
    match existing {
        None => Ok(true),
        Some(bytes) if bytes == content => Ok(false),
        Some(_) => Err(StoreError::ObjectExists(rhid.clone())),
    }
}
