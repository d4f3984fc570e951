//! Core type definitions for ledgerlink.
//!
//! This crate defines the data model shared by the sync engine, the local
//! store and the entry helpers:
//! - Profile, row and generation identifiers
//! - Accounts and their colon-delimited hierarchy
//! - Transactions, postings and the transaction content hash
//! - Decimal amounts and per-commodity display styles
//! - Server versions and the JSON API ladder

mod account;
mod amount;
mod ids;
mod profile;
mod transaction;
mod version;

pub use account::{ACCOUNT_SEPARATOR, Account, ensure_parent_accounts, level, parent_name};
pub use amount::{
    AccountAmount, AmountStyle, BALANCE_EPSILON, CommodityPosition, decimal_from_mantissa,
    decimal_to_mantissa, is_effectively_zero,
};
pub use ids::{Generation, ProfileId, RowId};
pub use profile::{Credentials, Profile};
pub use transaction::{Posting, Transaction, newest_first, parse_ledger_date};
pub use version::{ApiVersion, DetectedVersion, ServerVersion};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid version: {0}")]
    InvalidVersion(String),

    #[error("invalid date: {0}")]
    InvalidDate(String),
}
