//! JSON fetchers for the account and transaction lists.
//!
//! Both return `Ok(None)` when the server does not offer the endpoint (or is
//! too old for any known schema). That is a signal to fall back to the HTML
//! journal, not an error.

use crate::cancel::CancelToken;
use crate::client::HledgerClient;
use crate::error::{FetchError, FetchResult};
use crate::version::candidate_apis;
use crate::wire;
use ledgerlink_types::{Account, ApiVersion, Profile, Transaction, ensure_parent_accounts, newest_first};
use tracing::{debug, info, warn};

/// Transactions processed between two progress reports.
const PROGRESS_BATCH: usize = 100;

/// Accounts plus what was learnt about the server while fetching them.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountFetchResult {
    pub accounts: Vec<Account>,
    /// Postings the server says exist; sizes the transaction progress bar.
    pub expected_postings: usize,
    /// Rung whose schema decoded the response.
    pub api: ApiVersion,
}

/// `GET accounts`.
#[derive(Debug, Clone, Copy)]
pub struct AccountListFetcher<'a> {
    client: &'a HledgerClient,
}

impl<'a> AccountListFetcher<'a> {
    pub fn new(client: &'a HledgerClient) -> Self {
        Self { client }
    }

    /// Fetches the account list, trying each candidate rung's schema in turn.
    pub async fn fetch(
        &self,
        profile: &Profile,
        cancel: &CancelToken,
    ) -> FetchResult<Option<AccountFetchResult>> {
        let candidates = candidate_apis(self.client, profile, cancel).await?;
        if candidates.is_empty() {
            info!(profile = %profile.id, "server too old for the JSON API");
            return Ok(None);
        }

        let body = match self.client.get_text(profile, "accounts", cancel).await {
            Ok(body) => body,
            Err(FetchError::NotFound) => return Ok(None),
            Err(e) => return Err(e),
        };

        let mut last_error = None;
        for api in candidates {
            cancel.check()?;
            match wire::decode_accounts(&body, api) {
                Ok(decoded) => {
                    let mut accounts = decoded.accounts;
                    ensure_parent_accounts(&mut accounts);
                    info!(profile = %profile.id, %api, accounts = accounts.len(), "fetched accounts");
                    return Ok(Some(AccountFetchResult {
                        accounts,
                        expected_postings: usize::try_from(decoded.posting_count)
                            .unwrap_or(usize::MAX),
                        api,
                    }));
                }
                Err(e) => {
                    debug!(%api, "accounts did not decode: {e}");
                    last_error = Some(e);
                }
            }
        }

        warn!(profile = %profile.id, "no API version could decode the account list");
        Err(last_error.unwrap_or_else(|| FetchError::Decode("accounts".into())))
    }
}

/// `GET transactions`.
#[derive(Debug, Clone, Copy)]
pub struct TransactionListFetcher<'a> {
    client: &'a HledgerClient,
}

impl<'a> TransactionListFetcher<'a> {
    pub fn new(client: &'a HledgerClient) -> Self {
        Self { client }
    }

    /// Fetches every transaction, newest first.
    ///
    /// `on_progress(postings_seen, expected_postings)` fires once per batch
    /// of decoded transactions. The total never drops below the count seen.
    pub async fn fetch(
        &self,
        profile: &Profile,
        api: ApiVersion,
        expected_postings: usize,
        mut on_progress: impl FnMut(usize, usize),
        cancel: &CancelToken,
    ) -> FetchResult<Option<Vec<Transaction>>> {
        let body = match self.client.get_text(profile, "transactions", cancel).await {
            Ok(body) => body,
            Err(FetchError::NotFound) => return Ok(None),
            Err(e) => return Err(e),
        };

        let mut transactions = wire::decode_transactions(&body)?;

        let mut seen = 0;
        for batch in transactions.chunks(PROGRESS_BATCH) {
            cancel.check()?;
            seen += batch.iter().map(|t| t.postings.len()).sum::<usize>();
            on_progress(seen, expected_postings.max(seen));
        }

        transactions.sort_by(newest_first);
        info!(profile = %profile.id, %api, transactions = transactions.len(), "fetched transactions");
        Ok(Some(transactions))
    }
}
