//! SQLite implementation of the Store trait.
//!
//! Keeps a whole bundle in one database file. It uses rusqlite with bundled
//! SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, warn};

use evidence_ledger_core::{canonical_json, LedgerEntry, Manifest, ManifestEntry, Rhid, RhidKind};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{check_write_once, AppendResult, Store};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path, running migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a closure against the connection on the blocking pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Poisoned(e.to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
    }
}

/// Receipts and plain objects live in separate tables.
fn table_for(rhid: &Rhid) -> &'static str {
    match rhid.kind() {
        RhidKind::Receipt => "receipts",
        _ => "objects",
    }
}

fn content_column(table: &str) -> &'static str {
    if table == "receipts" {
        "body"
    } else {
        "content"
    }
}

fn canonical_text<T: Serialize>(value: &T) -> Result<String> {
    String::from_utf8(canonical_json(value)?)
        .map_err(|e| StoreError::Serialization(e.to_string()))
}

#[async_trait]
impl Store for SqliteStore {
    async fn put_object(&self, rhid: &Rhid, content: &[u8]) -> Result<String> {
        let rhid = rhid.clone();
        let content = content.to_vec();
        self.blocking(move |conn| {
            let table = table_for(&rhid);
            let column = content_column(table);
            let key = rhid.to_string();

            let existing: Option<Vec<u8>> = conn
                .query_row(
                    &format!("SELECT {column} FROM {table} WHERE rhid = ?1"),
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;

            if check_write_once(&rhid, existing.as_deref(), &content)? {
                conn.execute(
                    &format!("INSERT INTO {table} (rhid, {column}, stored_at) VALUES (?1, ?2, ?3)"),
                    params![key, content, chrono::Utc::now().timestamp_millis()],
                )?;
                debug!(%rhid, size = content.len(), "stored object");
            }
            Ok(format!("sqlite://{table}/{rhid}"))
        })
        .await
    }

    async fn replace_object(&self, rhid: &Rhid, content: &[u8]) -> Result<String> {
        let rhid = rhid.clone();
        let content = content.to_vec();
        self.blocking(move |conn| {
            let table = table_for(&rhid);
            let column = content_column(table);
            let replaced = conn.execute(
                &format!(
                    "INSERT INTO {table} (rhid, {column}, stored_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(rhid) DO UPDATE SET {column} = excluded.{column}, stored_at = excluded.stored_at"
                ),
                params![rhid.to_string(), content, chrono::Utc::now().timestamp_millis()],
            )?;
            debug!(%rhid, size = content.len(), replaced, "replaced object");
            Ok(format!("sqlite://{table}/{rhid}"))
        })
        .await
    }

    async fn get_object(&self, rhid: &Rhid) -> Result<Option<Bytes>> {
        let rhid = rhid.clone();
        self.blocking(move |conn| {
            let table = table_for(&rhid);
            let column = content_column(table);
            let bytes: Option<Vec<u8>> = conn
                .query_row(
                    &format!("SELECT {column} FROM {table} WHERE rhid = ?1"),
                    params![rhid.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(bytes.map(Bytes::from))
        })
        .await
    }

    async fn write_manifest(&self, manifest: &Manifest) -> Result<()> {
        let rows = manifest
            .entries
            .iter()
            .map(|entry| Ok((entry.rhid.to_string(), canonical_text(entry)?)))
            .collect::<Result<Vec<_>>>()?;

        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM manifest_entries", [])?;
            for (position, (rhid, entry)) in rows.iter().enumerate() {
                tx.execute(
                    "INSERT INTO manifest_entries (position, rhid, entry) VALUES (?1, ?2, ?3)",
                    params![position as i64, rhid, entry],
                )?;
            }
            tx.execute(
                "INSERT OR REPLACE INTO bundle_meta (key, value) VALUES ('manifest', 'written')",
                [],
            )?;
            tx.commit()?;
            debug!(entries = rows.len(), "wrote manifest");
            Ok(())
        })
        .await
    }

    async fn read_manifest(&self) -> Result<Option<Manifest>> {
        self.blocking(|conn| {
            let written: Option<String> = conn
                .query_row(
                    "SELECT value FROM bundle_meta WHERE key = 'manifest'",
                    [],
                    |row| row.get(0),
                )
                .optional()?;
            if written.is_none() {
                return Ok(None);
            }

            let mut stmt =
                conn.prepare("SELECT entry FROM manifest_entries ORDER BY position ASC")?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            let entries = rows
                .iter()
                .map(|text| serde_json::from_str::<ManifestEntry>(text).map_err(StoreError::from))
                .collect::<Result<Vec<_>>>()?;
            Ok(Some(Manifest { entries }))
        })
        .await
    }

    async fn append_ledger_entry(&self, entry: &LedgerEntry) -> Result<AppendResult> {
        let seq = entry.seq;
        let line = canonical_text(entry)?;
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            let tail_len: i64 =
                tx.query_row("SELECT COUNT(*) FROM ledger_entries", [], |row| row.get(0))?;
            let tail_len = tail_len as u64;
            if seq != tail_len {
                warn!(seq, tail_len, "ledger append conflict");
                return Ok(AppendResult::Conflict { tail_len });
            }
            tx.execute(
                "INSERT INTO ledger_entries (seq, line) VALUES (?1, ?2)",
                params![seq as i64, line],
            )?;
            tx.commit()?;
            debug!(seq, "appended ledger entry");
            Ok(AppendResult::Appended)
        })
        .await
    }

    async fn read_ledger(&self) -> Result<Vec<LedgerEntry>> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare("SELECT line FROM ledger_entries ORDER BY seq ASC")?;
            let lines = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            lines
                .iter()
                .map(|line| serde_json::from_str::<LedgerEntry>(line).map_err(StoreError::from))
                .collect()
        })
        .await
    }

    async fn ledger_len(&self) -> Result<u64> {
        self.blocking(|conn| {
            let len: i64 =
                conn.query_row("SELECT COUNT(*) FROM ledger_entries", [], |row| row.get(0))?;
            Ok(len as u64)
        })
        .await
    }
}
