//! Scraper for the HTML journal page of hledger-web releases without a JSON API.
//!
//! The page lists accounts with their balances, then a `General Journal`
//! table. It is read line by line with a small state machine; a line that
//! looks like a posting but cannot be understood fails the whole parse.

use crate::cancel::CancelToken;
use crate::client::HledgerClient;
use crate::error::{FetchError, FetchResult};
use ledgerlink_types::{
    Account, AccountAmount, Posting, Profile, Transaction, ensure_parent_accounts,
    parse_ledger_date,
};
use regex_lite::Regex;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::OnceLock;
use tracing::{debug, info};

const JOURNAL_HEADING: &str = "<h2>General Journal</h2>";

fn comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*;").expect("invalid comment regex"))
}

fn account_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"/register\?q=inacct%3A([a-zA-Z0-9%]+)""#).expect("invalid account regex")
    })
}

fn account_value_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"<span class="[^"]*\bamount\b[^"]*">\s*([-+]?[\d.,]+)(?:\s+(\S+))?</span>"#)
            .expect("invalid amount regex")
    })
}

fn decimal_comma_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",\d\d?$").expect("invalid decimal comma regex"))
}

fn decimal_point_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\.\d\d?$").expect("invalid decimal point regex"))
}

fn transaction_start_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"<tr class="title" id="transaction-(\d+)"><td class="date"[^"]*>([\d.-]+)</td>"#)
            .expect("invalid transaction start regex")
    })
}

fn transaction_description_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"<tr class="posting" title="(\S+)\s(.+)"#)
            .expect("invalid transaction description regex")
    })
}

fn transaction_details_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^\s+([!*]\s+)?(\S[\S\s]+\S)\s\s+(?:([^\d\s+\-]+)\s*)?([-+]?\d[\d,.]*)(?:\s*([^\d\s+\-]+)\s*$)?",
        )
        .expect("invalid transaction details regex")
    })
}

fn end_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"\bid="addmodal""#).expect("invalid end regex"))
}

/// Everything scraped from one journal page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegacyParseResult {
    pub accounts: Vec<Account>,
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState {
    ExpectingAccount,
    ExpectingAccountAmount,
    ExpectingTransaction,
    ExpectingTransactionDescription,
    ExpectingTransactionDetails,
}

/// Fetches and parses `GET journal`.
#[derive(Debug, Clone, Copy)]
pub struct LegacyHtmlParser<'a> {
    client: &'a HledgerClient,
}

impl<'a> LegacyHtmlParser<'a> {
    pub fn new(client: &'a HledgerClient) -> Self {
        Self { client }
    }

    /// Downloads the journal page and parses it.
    ///
    /// `on_progress(parsed, expected)` is called once per transaction,
    /// and not at all when `expected` is 0.
    pub async fn parse(
        &self,
        profile: &Profile,
        expected: usize,
        on_progress: impl FnMut(usize, usize),
        cancel: &CancelToken,
    ) -> FetchResult<LegacyParseResult> {
        let body = self.client.get_text(profile, "journal", cancel).await?;
        let result = parse_journal(&body, expected, on_progress, || cancel.is_cancelled())?;
        info!(
            profile = %profile.id,
            accounts = result.accounts.len(),
            transactions = result.transactions.len(),
            "parsed legacy journal"
        );
        Ok(result)
    }
}

/// Parses a journal page already in memory.
pub fn parse_journal(
    body: &str,
    expected: usize,
    mut on_progress: impl FnMut(usize, usize),
    is_cancelled: impl Fn() -> bool,
) -> FetchResult<LegacyParseResult> {
    let mut accounts: Vec<Account> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut amounts: HashMap<String, Vec<AccountAmount>> = HashMap::new();
    let mut last_account: Option<String> = None;

    let mut transactions = Vec::new();
    let mut current: Option<Transaction> = None;
    let mut transaction_id = 0_i64;
    let mut processed = 0_usize;
    let mut state = ParserState::ExpectingAccount;

    for line in body.lines() {
        if is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        if comment_re().is_match(line) {
            continue;
        }

        match state {
            ParserState::ExpectingAccount => {
                if line == JOURNAL_HEADING {
                    state = ParserState::ExpectingTransaction;
                    continue;
                }
                let Some(encoded) = account_name_re().captures(line).and_then(|c| c.get(1)) else {
                    continue;
                };
                let name = urlencoding::decode(encoded.as_str())
                    .map_err(|e| FetchError::Decode(format!("account name {}: {e}", encoded.as_str())))?
                    .replace('"', "");
                if !seen.insert(name.clone()) {
                    continue;
                }
                accounts.push(Account::new(name.clone()));
                last_account = Some(name);
                state = ParserState::ExpectingAccountAmount;
            }

            ParserState::ExpectingAccountAmount => {
                let mut found = false;
                for caps in account_value_re().captures_iter(line) {
                    found = true;
                    let Some(value) = caps.get(1) else { continue };
                    let currency = caps.get(2).map(|c| c.as_str()).unwrap_or_default();
                    let amount = parse_balance(value.as_str())?;
                    if let Some(name) = &last_account {
                        amounts
                            .entry(name.clone())
                            .or_default()
                            .push(AccountAmount::new(currency, amount));
                    }
                }
                if found {
                    state = ParserState::ExpectingAccount;
                }
            }

            ParserState::ExpectingTransaction => {
                if line.starts_with(' ') {
                    continue;
                }
                if let Some(id) = transaction_start_re().captures(line).and_then(|c| c.get(1)) {
                    transaction_id = id
                        .as_str()
                        .parse()
                        .map_err(|e| FetchError::Decode(format!("transaction id {}: {e}", id.as_str())))?;
                    processed += 1;
                    if expected > 0 {
                        on_progress(processed, expected);
                    }
                    state = ParserState::ExpectingTransactionDescription;
                }
                if end_re().is_match(line) {
                    break;
                }
            }

            ParserState::ExpectingTransactionDescription => {
                if line.starts_with(' ') {
                    continue;
                }
                let Some(caps) = transaction_description_re().captures(line) else {
                    continue;
                };
                if transaction_id == 0 {
                    return Err(FetchError::Decode(
                        "transaction description without a transaction id".into(),
                    ));
                }
                let raw_date = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                let date_text = raw_date.split_once('=').map_or(raw_date, |(_, secondary)| secondary);
                let date = parse_ledger_date(date_text)
                    .map_err(|e| FetchError::Decode(format!("transaction {transaction_id}: {e}")))?;
                let description = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
                current = Some(Transaction::new(transaction_id, date, description));
                state = ParserState::ExpectingTransactionDetails;
            }

            ParserState::ExpectingTransactionDetails => {
                let Some(transaction) = current.as_mut() else {
                    state = ParserState::ExpectingTransaction;
                    continue;
                };
                if line.is_empty() {
                    transactions.extend(current.take());
                    state = ParserState::ExpectingTransaction;
                } else {
                    let posting = parse_posting_line(line).ok_or_else(|| {
                        FetchError::Decode(format!(
                            "can't parse transaction {transaction_id} details: {line}"
                        ))
                    })??;
                    transaction.postings.push(posting);
                }
            }
        }
    }
    transactions.extend(current);

    for account in &mut accounts {
        if let Some(list) = amounts.remove(&account.name) {
            account.amounts = list;
        }
    }
    ensure_parent_accounts(&mut accounts);
    debug!(accounts = accounts.len(), transactions = transactions.len(), "journal scan complete");

    Ok(LegacyParseResult {
        accounts,
        transactions,
    })
}

/// Rewrites a number as printed by the server into `Decimal` syntax.
///
/// `1.234,56` and `1,234.56` both become `1234.56`. The decimal mark is
/// only recognized before a one or two digit fraction; otherwise just the
/// spaces are dropped.
fn normalize_number(text: &str) -> String {
    if decimal_comma_re().is_match(text) {
        text.replace(['.', ' '], "").replace(',', ".")
    } else if decimal_point_re().is_match(text) {
        text.replace([',', ' '], "")
    } else {
        text.replace(' ', "")
    }
}

fn parse_balance(text: &str) -> FetchResult<Decimal> {
    Decimal::from_str(&normalize_number(text))
        .map_err(|e| FetchError::Decode(format!("amount {text}: {e}")))
}

/// Parses an indented `account  [cur]amount[cur]` line.
///
/// `None` when the line does not have that shape; an inner error when it
/// does but the amount is malformed.
fn parse_posting_line(line: &str) -> Option<FetchResult<Posting>> {
    let caps = transaction_details_re().captures(line)?;
    let account = caps.get(2)?.as_str();
    let amount_text = caps.get(4)?.as_str();
    let before = caps.get(3).map(|m| m.as_str()).filter(|s| !s.is_empty());
    let after = caps.get(5).map(|m| m.as_str()).filter(|s| !s.is_empty());

    let currency = match (before, after) {
        (Some(_), Some(_)) => return None,
        (Some(c), None) | (None, Some(c)) => c,
        (None, None) => "",
    };

    Some(
        Decimal::from_str(&normalize_number(amount_text))
            .map(|amount| Posting::new(account, amount, currency))
            .map_err(|e| FetchError::Decode(format!("amount {amount_text}: {e}"))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn patterns_compile() {
        let _ = (comment_re(), account_name_re(), account_value_re());
        let _ = (transaction_start_re(), transaction_description_re());
        let _ = (transaction_details_re(), end_re());
    }

    #[test]
    fn posting_amounts_accept_grouping_with_either_mark() {
        let point = parse_posting_line("    Assets:Bank    1,234.56 USD").unwrap().unwrap();
        assert_eq!(point.amount, Some(dec!(1234.56)));
        let comma = parse_posting_line("    Assets:Bank    -1.234,5 EUR").unwrap().unwrap();
        assert_eq!(comma.amount, Some(dec!(-1234.5)));
    }

    #[test]
    fn balances_normalize_both_decimal_marks() {
        assert_eq!(parse_balance("1.234,56").unwrap(), dec!(1234.56));
        assert_eq!(parse_balance("1,234.56").unwrap(), dec!(1234.56));
        assert_eq!(parse_balance("-12").unwrap(), dec!(-12));
        assert_eq!(parse_balance("1 234").unwrap(), dec!(1234));
        assert_eq!(parse_balance("0.125").unwrap(), dec!(0.125));
    }

    #[test]
    fn posting_line_with_leading_currency() {
        let posting = parse_posting_line("    Assets:Cash    $-12.50").unwrap().unwrap();
        assert_eq!(posting.account_name, "Assets:Cash");
        assert_eq!(posting.currency, "$");
        assert_eq!(posting.amount, Some(dec!(-12.50)));
    }

    #[test]
    fn posting_line_with_trailing_currency_and_comma() {
        let posting = parse_posting_line("  * Expenses:Food  3,20 EUR").unwrap().unwrap();
        assert_eq!(posting.account_name, "Expenses:Food");
        assert_eq!(posting.currency, "EUR");
        assert_eq!(posting.amount, Some(dec!(3.20)));
    }

    #[test]
    fn currency_on_both_sides_is_rejected() {
        assert!(parse_posting_line("  Expenses:Food  EUR 3.20 USD").is_none());
    }

    #[test]
    fn unindented_line_is_not_a_posting() {
        assert!(parse_posting_line("Expenses:Food  3.20").is_none());
    }
}
