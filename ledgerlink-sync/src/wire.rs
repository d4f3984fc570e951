//! hledger-web JSON shapes for every schema on the API ladder.
//!
//! Decoding is tolerant: one set of structs accepts every rung, and the
//! fields that moved between releases are read according to the rung in use.
//! Encoding produces exactly the shape a given rung expects.

use crate::error::{FetchError, FetchResult, SyncError, SyncResult};
use ledgerlink_types::{
    Account, AccountAmount, AmountStyle, ApiVersion, CommodityPosition, Posting, Transaction,
    decimal_from_mantissa, decimal_to_mantissa, parse_ledger_date,
};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use serde_json::{Value, json};

// ── Decoding ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct WireAccount {
    aname: String,
    #[serde(default)]
    anumpostings: u64,
    #[serde(default)]
    aibalance: Option<Vec<WireAmount>>,
    #[serde(default)]
    adata: Option<WireAccountData>,
}

#[derive(Debug, Deserialize)]
struct WireAccountData {
    #[serde(default)]
    pdperiods: Vec<(String, WireBalanceData)>,
}

#[derive(Debug, Deserialize)]
struct WireBalanceData {
    #[serde(default)]
    bdincludingsubs: Vec<WireAmount>,
    #[serde(default)]
    bdnumpostings: u64,
}

#[derive(Debug, Deserialize)]
struct WireAmount {
    #[serde(default)]
    acommodity: String,
    aquantity: WireQuantity,
    #[serde(default)]
    astyle: Option<WireStyle>,
}

#[derive(Debug, Deserialize)]
struct WireQuantity {
    #[serde(rename = "decimalMantissa")]
    mantissa: i64,
    #[serde(rename = "decimalPlaces")]
    places: u32,
}

#[derive(Debug, Deserialize)]
struct WireStyle {
    #[serde(default)]
    ascommodityside: Option<String>,
    #[serde(default)]
    ascommodityspaced: bool,
    #[serde(default)]
    asprecision: Option<WirePrecision>,
    #[serde(default)]
    asdecimalpoint: Option<String>,
    #[serde(default)]
    asdecimalmark: Option<String>,
}

/// Plain digit count, or the 1.19 tagged form.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WirePrecision {
    Digits(u32),
    Tagged {
        tag: String,
        #[serde(default)]
        contents: Option<u32>,
    },
}

#[derive(Debug, Deserialize)]
struct WireTransaction {
    tindex: i64,
    tdate: String,
    #[serde(default)]
    tdescription: String,
    #[serde(default)]
    tcomment: String,
    #[serde(default)]
    tpostings: Vec<WirePosting>,
}

#[derive(Debug, Deserialize)]
struct WirePosting {
    paccount: String,
    #[serde(default)]
    pamount: Vec<WireAmount>,
    #[serde(default)]
    pcomment: String,
}

/// Accounts decoded from `GET accounts`.
#[derive(Debug)]
pub(crate) struct DecodedAccounts {
    pub accounts: Vec<Account>,
    /// Sum of the postings the server reports for the accounts.
    pub posting_count: u64,
}

impl WireQuantity {
    fn to_decimal(&self) -> FetchResult<Decimal> {
        decimal_from_mantissa(i128::from(self.mantissa), self.places).ok_or_else(|| {
            FetchError::Decode(format!(
                "quantity {}e-{} out of range",
                self.mantissa, self.places
            ))
        })
    }
}

impl WireStyle {
    fn to_style(&self, commodity: &str, api: ApiVersion) -> AmountStyle {
        let position = match self.ascommodityside.as_deref() {
            _ if commodity.is_empty() => CommodityPosition::None,
            Some("L") => CommodityPosition::Before,
            Some("R") => CommodityPosition::After,
            _ => CommodityPosition::None,
        };
        let precision = match &self.asprecision {
            Some(WirePrecision::Digits(n)) => Some(*n),
            Some(WirePrecision::Tagged { tag, contents }) if tag == "Precision" => *contents,
            _ => None,
        };
        let (preferred, fallback) = if api >= ApiVersion::V1_32 {
            (&self.asdecimalmark, &self.asdecimalpoint)
        } else {
            (&self.asdecimalpoint, &self.asdecimalmark)
        };
        let decimal_mark = preferred
            .as_deref()
            .or(fallback.as_deref())
            .and_then(|mark| mark.chars().next())
            .unwrap_or('.');

        AmountStyle {
            position,
            spaced: self.ascommodityspaced,
            precision,
            decimal_mark,
        }
    }
}

impl WireAmount {
    fn to_account_amount(&self, api: ApiVersion) -> FetchResult<AccountAmount> {
        let mut amount = AccountAmount::new(self.acommodity.clone(), self.aquantity.to_decimal()?);
        if let Some(style) = &self.astyle {
            amount = amount.with_style(style.to_style(&self.acommodity, api));
        }
        Ok(amount)
    }
}

/// Sums balances per commodity, keeping the first style seen.
fn merge_balances(amounts: Vec<AccountAmount>) -> Vec<AccountAmount> {
    let mut merged: Vec<AccountAmount> = Vec::new();
    for amount in amounts {
        match merged.iter_mut().find(|m| m.currency == amount.currency) {
            Some(existing) => existing.amount += amount.amount,
            None => merged.push(amount),
        }
    }
    merged
}

/// Synthetic top of the tree that hledger reports alongside real accounts.
const ROOT_ACCOUNT: &str = "root";

/// Decodes the `GET accounts` body with the field layout of `api`.
pub(crate) fn decode_accounts(body: &str, api: ApiVersion) -> FetchResult<DecodedAccounts> {
    let wire: Vec<WireAccount> =
        serde_json::from_str(body).map_err(|e| FetchError::Decode(format!("accounts: {e}")))?;

    let mut accounts = Vec::with_capacity(wire.len());
    let mut posting_count = 0;
    for account in wire {
        if account.aname.eq_ignore_ascii_case(ROOT_ACCOUNT) {
            continue;
        }
        let period = account
            .adata
            .as_ref()
            .and_then(|data| data.pdperiods.first())
            .map(|(_, balance)| balance);

        let (balances, postings) = match (api.uses_period_balances(), period) {
            (true, Some(period)) => (period.bdincludingsubs.as_slice(), period.bdnumpostings),
            (true, None) if account.aibalance.is_none() => {
                return Err(FetchError::Decode(format!(
                    "account {} has neither adata nor aibalance",
                    account.aname
                )));
            }
            _ => (
                account.aibalance.as_deref().unwrap_or_default(),
                account.anumpostings,
            ),
        };

        let amounts = balances
            .iter()
            .map(|b| b.to_account_amount(api))
            .collect::<FetchResult<Vec<_>>>()?;
        posting_count += postings;
        accounts.push(Account::new(account.aname).with_amounts(merge_balances(amounts)));
    }

    Ok(DecodedAccounts {
        accounts,
        posting_count,
    })
}

fn non_empty(text: String) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Decodes the `GET transactions` body.
///
/// The posting back-reference is the only field whose type changed across
/// rungs, and it is not read.
pub(crate) fn decode_transactions(body: &str) -> FetchResult<Vec<Transaction>> {
    let wire: Vec<WireTransaction> =
        serde_json::from_str(body).map_err(|e| FetchError::Decode(format!("transactions: {e}")))?;

    wire.into_iter()
        .map(|t| {
            let date = parse_ledger_date(&t.tdate)
                .map_err(|e| FetchError::Decode(format!("transaction {}: {e}", t.tindex)))?;
            let mut transaction = Transaction::new(t.tindex, date, t.tdescription);
            transaction.comment = non_empty(t.tcomment);
            for p in t.tpostings {
                let first = p.pamount.first();
                let amount = first.map(|a| a.aquantity.to_decimal()).transpose()?;
                let currency = first.map(|a| a.acommodity.clone()).unwrap_or_default();
                transaction.postings.push(Posting {
                    account_name: p.paccount,
                    amount,
                    currency,
                    comment: non_empty(p.pcomment),
                });
            }
            Ok(transaction)
        })
        .collect()
}

// ── Encoding ─────────────────────────────────────────────────────

/// Precision used for amounts entered locally.
const SEND_PRECISION: u32 = 2;

fn encode_style(api: ApiVersion) -> Value {
    let precision = if api == ApiVersion::V1_19 {
        json!({ "tag": "Precision", "contents": SEND_PRECISION })
    } else {
        json!(SEND_PRECISION)
    };
    let mut style = json!({
        "ascommodityside": "L",
        "ascommodityspaced": false,
        "digitgroups": null,
        "asprecision": precision,
    });
    if api >= ApiVersion::V1_32 {
        style["asdecimalmark"] = json!(".");
        style["asrounding"] = json!("NoRounding");
    } else {
        style["asdecimalpoint"] = json!(".");
    }
    style
}

fn encode_amount(posting: &Posting, api: ApiVersion) -> SyncResult<Value> {
    let mut amount = posting.amount.unwrap_or_default();
    amount.rescale(SEND_PRECISION);
    let (mantissa, places) = decimal_to_mantissa(amount);
    let mantissa = i64::try_from(mantissa).map_err(|_| {
        SyncError::Validation(format!(
            "amount {amount} of {} is too large to send",
            posting.account_name
        ))
    })?;
    Ok(json!({
        "acommodity": posting.currency,
        "aismultiplier": false,
        "aprice": null,
        "aquantity": {
            "decimalMantissa": mantissa,
            "decimalPlaces": places,
            "floatingPoint": amount.to_f64().unwrap_or_default(),
        },
        "astyle": encode_style(api),
    }))
}

fn encode_source_pos(api: ApiVersion) -> Value {
    let pos = json!({ "sourceName": "", "sourceLine": 1, "sourceColumn": 1 });
    if api >= ApiVersion::V1_50 {
        json!([pos.clone(), pos])
    } else if api >= ApiVersion::V1_32 {
        pos
    } else {
        json!({ "tag": "GenericSourcePos", "contents": ["", 1, 1] })
    }
}

/// Builds the `PUT add` body for `transaction` in the shape of `api`.
///
/// Fails when an amount does not fit the wire's 64-bit mantissa.
pub(crate) fn encode_transaction(transaction: &Transaction, api: ApiVersion) -> SyncResult<Value> {
    let transaction_ref = if api.uses_string_transaction_ids() {
        json!("1")
    } else {
        json!(1)
    };

    let postings: Vec<Value> = transaction
        .postings
        .iter()
        .filter(|p| !p.account_name.is_empty())
        .map(|p| -> SyncResult<Value> {
            Ok(json!({
                "paccount": p.account_name,
                "pamount": [encode_amount(p, api)?],
                "pcomment": p.comment.as_deref().unwrap_or_default(),
                "pstatus": "Unmarked",
                "ptype": "RegularPosting",
                "ptags": [],
                "pdate": null,
                "pdate2": null,
                "pbalanceassertion": null,
                "poriginal": null,
                "ptransaction_": transaction_ref,
            }))
        })
        .collect::<SyncResult<_>>()?;

    Ok(json!({
        "tindex": 1,
        "tdate": transaction.date.format("%Y-%m-%d").to_string(),
        "tdate2": null,
        "tdescription": transaction.description,
        "tcomment": transaction.comment.as_deref().unwrap_or_default(),
        "tcode": "",
        "tstatus": "Unmarked",
        "tprecedingcomment": "",
        "ttags": [],
        "tsourcepos": encode_source_pos(api),
        "tpostings": postings,
    }))
}
