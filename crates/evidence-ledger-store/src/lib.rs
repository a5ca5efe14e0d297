//! # Evidence Ledger Store
//!
//! Storage abstraction for the evidence ledger. Provides a trait-based
//! interface for bundle persistence with file, SQLite, and in-memory
//! implementations.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`FsStore`] - The on-disk bundle layout auditors receive
//! - [`SqliteStore`] - A whole bundle in one SQLite database
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`AppendResult`] - Result of a compare-and-swap ledger append
//!
//! ## Usage
//!
//! ```rust,no_run
//! use evidence_ledger_store::{FsStore, Store};
//!
//! async fn example() {
//!     let store = FsStore::open("run-42").await.unwrap();
//!     let ledger = store.read_ledger().await.unwrap();
//!     let manifest = store.read_manifest().await.unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Write-once objects**: the same RHID never holds two different contents
//! - **Compare-and-swap appends**: a stale writer gets `Conflict`, never a
//!   partial line in the ledger
//! - **Fail closed**: a ledger cut short mid-line is `Truncated`, not a
//!   shorter valid ledger

pub mod error;
pub mod fs;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use fs::FsStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{AppendResult, Store};
