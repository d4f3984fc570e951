//! Ledger accounts and the colon-delimited account hierarchy.

use crate::amount::AccountAmount;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Separator between account name segments.
pub const ACCOUNT_SEPARATOR: char = ':';

/// Returns the parent of `name`, or `None` for a top-level account.
///
/// `Assets:Bank:Checking` → `Assets:Bank`.
#[must_use]
pub fn parent_name(name: &str) -> Option<&str> {
    match name.rfind(ACCOUNT_SEPARATOR) {
        Some(idx) if idx > 0 => Some(&name[..idx]),
        _ => None,
    }
}

/// Depth of `name` in the hierarchy; top-level accounts are level 0.
#[must_use]
pub fn level(name: &str) -> usize {
    name.matches(ACCOUNT_SEPARATOR).count()
}

/// An account as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Full colon-delimited name.
    pub name: String,
    /// Per-currency balances, one entry per commodity.
    pub amounts: Vec<AccountAmount>,
}

impl Account {
    /// Creates an account with no balances.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            amounts: Vec::new(),
        }
    }

    /// Adds balances.
    #[must_use]
    pub fn with_amounts(mut self, amounts: Vec<AccountAmount>) -> Self {
        self.amounts = amounts;
        self
    }

    /// Parent account name, derived from the name alone.
    #[must_use]
    pub fn parent_name(&self) -> Option<&str> {
        parent_name(&self.name)
    }

    /// Hierarchy level, derived from the name alone.
    #[must_use]
    pub fn level(&self) -> usize {
        level(&self.name)
    }
}

/// Appends an empty account for every ancestor that is not already listed.
///
/// Servers report a flat list, so `Assets:Cash` may arrive without `Assets`.
pub fn ensure_parent_accounts(accounts: &mut Vec<Account>) {
    let mut known: HashSet<String> = accounts.iter().map(|a| a.name.clone()).collect();
    let mut missing = Vec::new();

    for account in accounts.iter() {
        let mut parent = account.parent_name();
        while let Some(name) = parent {
            if !known.insert(name.to_string()) {
                break;
            }
            missing.push(Account::new(name));
            parent = parent_name(name);
        }
    }

    accounts.extend(missing);
}
