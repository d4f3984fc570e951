//! Double-entry balancing of a transaction being composed.
//!
//! Within each currency the fixed amounts must sum to zero. A single posting
//! left without an amount absorbs the difference; with more than one such
//! posting the transaction stays unbalanced and nothing is guessed.

use ledgerlink_types::{Posting, is_effectively_zero};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One posting row as the user entered it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountEntry {
    pub account_name: String,
    /// `None` when the amount was left blank or could not be parsed.
    pub amount: Option<Decimal>,
    pub currency: String,
    pub comment: Option<String>,
}

impl AccountEntry {
    pub fn new(account_name: impl Into<String>, amount: Option<Decimal>, currency: impl Into<String>) -> Self {
        Self {
            account_name: account_name.into(),
            amount,
            currency: currency.into(),
            comment: None,
        }
    }
}

impl From<&Posting> for AccountEntry {
    fn from(posting: &Posting) -> Self {
        Self {
            account_name: posting.account_name.clone(),
            amount: posting.amount,
            currency: posting.currency.clone(),
            comment: posting.comment.clone(),
        }
    }
}

/// Result of [`calculate_balance`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceResult {
    /// Entries with a non-blank account, names trimmed, plug amounts filled in.
    pub lines: Vec<Posting>,
    /// Sum of the fixed amounts per currency, before any plug.
    pub balance_per_currency: BTreeMap<String, Decimal>,
    pub is_balanced: bool,
}

#[derive(Default)]
struct CurrencyGroup {
    balance: Decimal,
    receivers: Vec<usize>,
}

impl CurrencyGroup {
    /// Posting that absorbs the balance, if exactly one can.
    fn plug_target(&self) -> Option<usize> {
        match self.receivers.as_slice() {
            [only] if !is_effectively_zero(self.balance) => Some(*only),
            _ => None,
        }
    }

    fn is_balanced(&self) -> bool {
        is_effectively_zero(self.balance) || self.receivers.len() == 1
    }
}

fn to_lines(entries: &[AccountEntry]) -> Vec<Posting> {
    entries
        .iter()
        .filter(|e| !e.account_name.trim().is_empty())
        .map(|e| Posting {
            account_name: e.account_name.trim().to_string(),
            amount: e.amount,
            currency: e.currency.clone(),
            comment: e.comment.clone().filter(|c| !c.trim().is_empty()),
        })
        .collect()
}

fn group_by_currency(lines: &[Posting]) -> BTreeMap<String, CurrencyGroup> {
    let mut groups: BTreeMap<String, CurrencyGroup> = BTreeMap::new();
    for (index, line) in lines.iter().enumerate() {
        let group = groups.entry(line.currency.clone()).or_default();
        match line.amount {
            Some(amount) => group.balance += amount,
            None => group.receivers.push(index),
        }
    }
    groups
}

/// Balances the entries, filling in at most one plug amount per currency.
pub fn calculate_balance(entries: &[AccountEntry]) -> BalanceResult {
    let mut lines = to_lines(entries);
    let groups = group_by_currency(&lines);

    for group in groups.values() {
        if let Some(index) = group.plug_target() {
            lines[index].amount = Some(-group.balance);
        }
    }

    BalanceResult {
        is_balanced: groups.values().all(CurrencyGroup::is_balanced),
        balance_per_currency: groups.into_iter().map(|(c, g)| (c, g.balance)).collect(),
        lines,
    }
}

/// True when [`calculate_balance`] would produce a balanced transaction.
///
/// An empty entry list is balanceable.
pub fn is_balanceable(entries: &[AccountEntry]) -> bool {
    let lines = to_lines(entries);
    group_by_currency(&lines).values().all(CurrencyGroup::is_balanced)
}

/// Placeholder text for each entry left without an amount.
///
/// Entries with an amount get `None`. Blank entries take part, so hints
/// follow what the user sees rather than the filtered lines.
pub fn amount_hints(entries: &[AccountEntry]) -> Vec<Option<String>> {
    let mut balances: BTreeMap<&str, Decimal> = BTreeMap::new();
    for entry in entries {
        let balance = balances.entry(entry.currency.as_str()).or_default();
        if let Some(amount) = entry.amount {
            *balance += amount;
        }
    }

    entries
        .iter()
        .map(|entry| {
            if entry.amount.is_some() {
                return None;
            }
            let balance = balances.get(entry.currency.as_str()).copied().unwrap_or_default();
            Some(if is_effectively_zero(balance) {
                "0".to_string()
            } else {
                (-balance).to_string()
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn near_zero_balance_leaves_receivers_open() {
        let entries = [
            AccountEntry::new("Assets", Some(dec!(100)), "USD"),
            AccountEntry::new("Expenses", Some(dec!(-100.00005)), "USD"),
            AccountEntry::new("Other", None, "USD"),
        ];
        let result = calculate_balance(&entries);
        assert!(result.is_balanced);
        assert_eq!(result.lines[2].amount, None);
    }

    #[test]
    fn blank_comment_is_dropped() {
        let mut entry = AccountEntry::new("A", Some(dec!(0)), "");
        entry.comment = Some("  ".into());
        assert_eq!(calculate_balance(&[entry]).lines[0].comment, None);
    }
}
