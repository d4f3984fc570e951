//! Offline transaction entry helpers for ledgerlink.
//!
//! - [`find_match`] / [`extract_transaction`]: turn scanned or pasted text
//!   into a transaction skeleton using user-defined regex templates
//! - [`calculate_balance`] / [`is_balanceable`]: fill in the one missing
//!   amount per currency so postings sum to zero
//!
//! Everything here is pure and synchronous.

mod balance;
mod template;

pub use balance::{AccountEntry, BalanceResult, amount_hints, calculate_balance, is_balanceable};
pub use template::{
    ExtractedLine, ExtractedTransaction, FieldSource, MatchedTemplate, PatternTest, Template,
    TemplateLine, extract_transaction, extract_transaction_on, find_match, test_pattern,
    validate_pattern,
};
