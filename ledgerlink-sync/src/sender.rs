//! Submits a locally composed transaction to the server with `PUT add`.

use crate::cancel::CancelToken;
use crate::client::HledgerClient;
use crate::error::{FetchError, SyncError, SyncResult};
use crate::version::candidate_apis;
use crate::wire;
use ledgerlink_entry::{AccountEntry, calculate_balance};
use ledgerlink_types::{ApiVersion, Profile, Transaction};
use tracing::{debug, info, warn};

/// Sends transactions, trying each candidate schema until one is accepted.
#[derive(Debug, Clone, Copy)]
pub struct TransactionSender<'a> {
    client: &'a HledgerClient,
}

impl<'a> TransactionSender<'a> {
    pub fn new(client: &'a HledgerClient) -> Self {
        Self { client }
    }

    /// Balances `transaction` and submits it.
    ///
    /// Returns the rung the server accepted. A transaction that cannot be
    /// balanced is refused before anything is sent.
    pub async fn send(
        &self,
        profile: &Profile,
        transaction: &Transaction,
        cancel: &CancelToken,
    ) -> SyncResult<ApiVersion> {
        let resolved = resolve(transaction)?;

        let candidates = candidate_apis(self.client, profile, cancel).await?;
        if candidates.is_empty() {
            return Err(SyncError::ApiVersion(
                "server is too old to accept JSON transactions".into(),
            ));
        }

        let mut last_rejection = None;
        for api in candidates {
            let body = wire::encode_transaction(&resolved, api)?;
            match self.client.put_json(profile, "add", &body, cancel).await {
                Ok(()) => {
                    info!(profile = %profile.id, %api, "transaction sent");
                    return Ok(api);
                }
                Err(e @ FetchError::Rejected { .. }) => {
                    debug!(%api, "server rejected transaction shape: {e}");
                    last_rejection = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!(profile = %profile.id, "every API version was rejected");
        Err(last_rejection.map_or_else(
            || SyncError::ApiVersion("no API version accepted the transaction".into()),
            SyncError::from,
        ))
    }
}

/// Fills in the plug amount and refuses anything still unbalanced.
fn resolve(transaction: &Transaction) -> SyncResult<Transaction> {
    let entries: Vec<AccountEntry> = transaction.postings.iter().map(AccountEntry::from).collect();
    let balance = calculate_balance(&entries);
    if !balance.is_balanced {
        return Err(SyncError::Validation(format!(
            "transaction '{}' does not balance",
            transaction.description
        )));
    }
    if balance.lines.len() < 2 {
        return Err(SyncError::Validation(
            "a transaction needs at least two postings".into(),
        ));
    }

    let mut resolved = transaction.clone();
    resolved.postings = balance.lines;
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ledgerlink_types::Posting;
    use rust_decimal_macros::dec;

    fn tx() -> Transaction {
        Transaction::new(0, NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(), "Lunch")
    }

    #[test]
    fn resolve_fills_plug() {
        let t = tx()
            .with_posting(Posting::new("Expenses:Food", dec!(8.40), "EUR"))
            .with_posting(Posting::open("Assets:Cash", "EUR"));
        let resolved = resolve(&t).unwrap();
        assert_eq!(resolved.postings[1].amount, Some(dec!(-8.40)));
    }

    #[test]
    fn resolve_refuses_unbalanced() {
        let t = tx()
            .with_posting(Posting::new("Expenses:Food", dec!(8.40), "EUR"))
            .with_posting(Posting::new("Assets:Cash", dec!(-8), "EUR"));
        assert!(matches!(resolve(&t), Err(SyncError::Validation(_))));
    }
}
