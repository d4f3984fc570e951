//! Rows as they come back out of the store.

use ledgerlink_types::{AccountAmount, Generation, ProfileId, RowId, Transaction};
use serde::{Deserialize, Serialize};

/// A cached account together with its local UI state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredAccount {
    pub id: RowId,
    pub profile_id: ProfileId,
    pub name: String,
    pub parent_name: Option<String>,
    pub level: usize,
    /// Children shown in the account tree. Never touched by sync.
    pub expanded: bool,
    /// All commodities shown instead of the first one. Never touched by sync.
    pub amounts_expanded: bool,
    pub generation: Generation,
    pub amounts: Vec<AccountAmount>,
}

/// A cached transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTransaction {
    pub id: RowId,
    pub profile_id: ProfileId,
    pub data_hash: String,
    pub generation: Generation,
    pub transaction: Transaction,
}

/// Rows removed by a purge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeStats {
    pub accounts: usize,
    pub account_values: usize,
    pub transactions: usize,
    pub postings: usize,
}

impl PurgeStats {
    #[must_use]
    pub fn total(&self) -> usize {
        self.accounts + self.account_values + self.transactions + self.postings
    }
}

/// What a generational save did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveSummary {
    /// Generation the saved rows are now tagged with.
    pub generation: Generation,
    pub accounts: usize,
    pub transactions_inserted: usize,
    pub transactions_updated: usize,
    pub transactions_unchanged: usize,
    pub purged: PurgeStats,
}
