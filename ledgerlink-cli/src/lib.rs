//! Shared helpers for the ledgerlink command-line tool.

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use ledgerlink_entry::{AccountEntry, Template, calculate_balance};
use ledgerlink_sync::SyncProgress;
use ledgerlink_types::{AccountAmount, AmountStyle, Posting, Profile, Transaction};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Reads a profile from a JSON file.
pub fn load_profile(path: &Path) -> Result<Profile> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read profile {}", path.display()))?;
    let profile: Profile = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse profile {}", path.display()))?;
    if profile.url.trim().is_empty() {
        bail!("Profile {} has no server URL", path.display());
    }
    Ok(profile)
}

/// Reads a JSON array of templates.
pub fn load_templates(path: &Path) -> Result<Vec<Template>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read templates {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse templates {}", path.display()))
}

/// Parses `ACCOUNT[=AMOUNT[ CURRENCY]]`.
///
/// An entry without `=AMOUNT` is left open for the balancer to fill.
pub fn parse_entry(arg: &str, default_currency: &str) -> Result<AccountEntry> {
    let (account, rest) = match arg.split_once('=') {
        Some((account, rest)) => (account.trim(), Some(rest.trim())),
        None => (arg.trim(), None),
    };
    if account.is_empty() {
        bail!("Entry '{arg}' has no account");
    }

    let mut currency = default_currency.to_string();
    let amount = match rest {
        None | Some("") => None,
        Some(rest) => {
            let mut parts = rest.split_whitespace();
            let amount_text = parts.next().unwrap_or_default();
            if let Some(c) = parts.next() {
                currency = c.to_string();
            }
            if parts.next().is_some() {
                bail!("Entry '{arg}' has trailing text");
            }
            let amount = Decimal::from_str(&amount_text.replace(',', ""))
                .with_context(|| format!("Invalid amount '{amount_text}' in '{arg}'"))?;
            Some(amount)
        }
    };

    Ok(AccountEntry::new(account, amount, currency))
}

/// Balances `entries` into a transaction ready to append or send.
///
/// Fails when the amounts do not balance in every currency.
pub fn build_transaction(
    date: NaiveDate,
    description: &str,
    comment: Option<&str>,
    entries: &[AccountEntry],
) -> Result<Transaction> {
    let balance = calculate_balance(entries);
    if !balance.is_balanced {
        let open: Vec<String> = balance
            .balance_per_currency
            .iter()
            .filter(|(_, amount)| !amount.is_zero())
            .map(|(currency, amount)| format!("{amount} {currency}"))
            .collect();
        if open.is_empty() {
            bail!("Transaction has more than one open posting per currency");
        }
        bail!("Transaction does not balance ({})", open.join(", "));
    }
    if balance.lines.len() < 2 {
        bail!("A transaction needs at least two postings");
    }

    let mut transaction = Transaction::new(0, date, description.trim());
    if let Some(comment) = comment.map(str::trim).filter(|c| !c.is_empty()) {
        transaction = transaction.with_comment(comment);
    }
    transaction.postings = balance.lines;
    Ok(transaction)
}

/// Display style per commodity, taken from the first styled balance seen.
pub fn commodity_styles<'a>(
    amounts: impl IntoIterator<Item = &'a AccountAmount>,
) -> HashMap<String, AmountStyle> {
    let mut styles = HashMap::new();
    for amount in amounts {
        if let Some(style) = &amount.style {
            styles
                .entry(amount.currency.clone())
                .or_insert_with(|| style.clone());
        }
    }
    styles
}

fn render_amount(posting: &Posting, styles: &HashMap<String, AmountStyle>) -> Option<String> {
    posting.amount.map(|amount| {
        let mut plain = AccountAmount::new(posting.currency.clone(), amount);
        plain.style = styles.get(&posting.currency).cloned();
        plain.render()
    })
}

/// Renders a transaction in journal syntax.
///
/// Amounts use the commodity's style from `styles` when it has one.
pub fn render_transaction(transaction: &Transaction, styles: &HashMap<String, AmountStyle>) -> String {
    let mut out = format!("{} {}", transaction.date.format("%Y-%m-%d"), transaction.description);
    if let Some(comment) = &transaction.comment {
        out.push_str(&format!("  ; {comment}"));
    }
    for posting in &transaction.postings {
        out.push_str("\n    ");
        out.push_str(&posting.account_name);
        if let Some(amount) = render_amount(posting, styles) {
            out.push_str("    ");
            out.push_str(&amount);
        }
        if let Some(comment) = &posting.comment {
            out.push_str(&format!("  ; {comment}"));
        }
    }
    out
}

/// One-line description of a progress event.
pub fn render_progress(event: &SyncProgress) -> String {
    match event {
        SyncProgress::Starting(message) | SyncProgress::Indeterminate(message) => message.clone(),
        SyncProgress::Running {
            current,
            total: 0,
            message,
        } => format!("{message}: {current}"),
        SyncProgress::Running {
            current,
            total,
            message,
        } => format!("{message}: {current}/{total}"),
    }
}
