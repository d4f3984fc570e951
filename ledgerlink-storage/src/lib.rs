//! SQLite storage layer for ledgerlink.
//!
//! Caches the accounts and transactions of each server profile.
//!
//! # Architecture
//!
//! - Rows are keyed by natural keys: (profile, account name) and
//!   (profile, ledger id); synthetic row ids stay stable across syncs
//! - Every row carries the sync generation that last confirmed it
//! - A sync writes the next generation, then purges older rows
//! - Local appends reuse the current generation so the next sync can
//!   replace them with the server's view

mod error;
mod persist;
mod records;
mod store;

pub use error::{StorageError, StorageResult};
pub use records::{PurgeStats, SaveSummary, StoredAccount, StoredTransaction};
pub use store::{LedgerStore, StorageConfig};
