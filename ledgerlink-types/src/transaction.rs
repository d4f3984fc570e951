//! Transactions, postings and the transaction content hash.

use crate::ids::ProfileId;
use crate::{Error, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;

/// Prefix mixed into every content hash so the format can be versioned.
const HASH_VERSION: &str = "ver2";

/// One line of a double-entry transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    /// Full account name.
    pub account_name: String,
    /// Signed amount; `None` while it still has to be computed.
    pub amount: Option<Decimal>,
    /// Commodity; empty for the default commodity.
    pub currency: String,
    /// Free-form posting comment.
    pub comment: Option<String>,
}

impl Posting {
    /// Creates a posting with an amount.
    pub fn new(account_name: impl Into<String>, amount: Decimal, currency: impl Into<String>) -> Self {
        Self {
            account_name: account_name.into(),
            amount: Some(amount),
            currency: currency.into(),
            comment: None,
        }
    }

    /// Creates a posting whose amount is still open.
    pub fn open(account_name: impl Into<String>, currency: impl Into<String>) -> Self {
        Self {
            account_name: account_name.into(),
            amount: None,
            currency: currency.into(),
            comment: None,
        }
    }

    /// Sets the comment.
    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// A ledger transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Index of the transaction in the server's journal.
    pub ledger_id: i64,
    /// Primary date (the secondary date when the server reports one in its place).
    pub date: NaiveDate,
    /// Payee / description line.
    pub description: String,
    /// Transaction comment.
    pub comment: Option<String>,
    /// Ordered postings.
    pub postings: Vec<Posting>,
}

impl Transaction {
    /// Creates a transaction without postings.
    pub fn new(ledger_id: i64, date: NaiveDate, description: impl Into<String>) -> Self {
        Self {
            ledger_id,
            date,
            description: description.into(),
            comment: None,
            postings: Vec::new(),
        }
    }

    /// Sets the comment.
    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Appends a posting.
    #[must_use]
    pub fn with_posting(mut self, posting: Posting) -> Self {
        self.postings.push(posting);
        self
    }

    /// Stable digest of the semantic content of this transaction within a profile.
    ///
    /// Equal hashes mean a re-fetched transaction needs no rewrite.
    #[must_use]
    pub fn content_hash(&self, profile_id: ProfileId) -> String {
        let mut data = String::new();
        data.push_str(HASH_VERSION);
        data.push('\0');
        data.push_str(&profile_id.to_string());
        data.push('\0');
        data.push_str(&self.ledger_id.to_string());
        data.push('\0');
        data.push_str(&self.description);
        data.push('\0');
        data.push_str(self.comment.as_deref().unwrap_or_default());
        data.push('\0');
        data.push_str(&self.date.format("%Y-%m-%d").to_string());
        data.push('\0');
        for posting in &self.postings {
            data.push_str(&posting.account_name);
            data.push('\0');
            data.push_str(&posting.currency);
            data.push('\0');
            if let Some(amount) = posting.amount {
                data.push_str(&amount.normalize().to_string());
            }
            data.push('\0');
            data.push_str(posting.comment.as_deref().unwrap_or_default());
            data.push('\0');
        }

        let mut hasher = Sha256::new();
        hasher.update(data.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Parses a ledger date written `YYYY-MM-DD`, `YYYY/MM/DD` or `YYYY.MM.DD`.
pub fn parse_ledger_date(text: &str) -> Result<NaiveDate> {
    let text = text.trim();
    let mut parts = text.split(['-', '/', '.']);
    let mut next = || parts.next().and_then(|p| p.parse::<u32>().ok());
    let (Some(year), Some(month), Some(day)) = (next(), next(), next()) else {
        return Err(Error::InvalidDate(text.to_string()));
    };
    if parts.next().is_some() {
        return Err(Error::InvalidDate(text.to_string()));
    }
    i32::try_from(year)
        .ok()
        .and_then(|y| NaiveDate::from_ymd_opt(y, month, day))
        .ok_or_else(|| Error::InvalidDate(text.to_string()))
}

/// Orders transactions newest first: date descending, then ledger id descending.
pub fn newest_first(a: &Transaction, b: &Transaction) -> Ordering {
    b.date.cmp(&a.date).then_with(|| b.ledger_id.cmp(&a.ledger_id))
}
