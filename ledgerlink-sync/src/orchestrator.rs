//! Drives a full sync of one profile: fetch, fall back, persist.
//!
//! Each call to [`SyncOrchestrator::sync`] spawns a task and hands back a
//! [`SyncHandle`] carrying a progress channel, a cancel token and the join
//! handle. Only one sync per profile may be in flight.

use crate::cancel::CancelToken;
use crate::client::HledgerClient;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::fetch::{AccountListFetcher, TransactionListFetcher};
use crate::legacy::{LegacyHtmlParser, LegacyParseResult};
use ledgerlink_storage::LedgerStore;
use ledgerlink_types::{Account, Generation, Profile, ProfileId, Transaction};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Progress reported while a sync runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncProgress {
    Starting(String),
    /// Working, with no measurable total.
    Indeterminate(String),
    Running {
        current: usize,
        /// 0 when the total is unknown.
        total: usize,
        message: String,
    },
}

/// Outcome of a successful sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSummary {
    pub transaction_count: usize,
    pub account_count: usize,
    pub duration_ms: u64,
    /// Generation written by this sync.
    pub generation: Generation,
    /// True when the HTML journal had to be scraped.
    pub used_legacy: bool,
}

/// A sync in progress.
#[derive(Debug)]
pub struct SyncHandle {
    progress: mpsc::Receiver<SyncProgress>,
    cancel: CancelToken,
    task: JoinHandle<SyncResult<SyncSummary>>,
}

impl SyncHandle {
    /// Next progress event; `None` once the sync has finished.
    ///
    /// Events are dropped rather than queued when the receiver lags.
    pub async fn next_progress(&mut self) -> Option<SyncProgress> {
        self.progress.recv().await
    }

    /// Asks the sync to stop. The cache is left as it was.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Waits for the sync to finish.
    pub async fn join(self) -> SyncResult<SyncSummary> {
        self.task
            .await
            .map_err(|e| SyncError::Unknown(format!("sync task failed: {e}")))?
    }
}

struct Inner {
    client: HledgerClient,
    store: LedgerStore,
    config: SyncConfig,
    in_flight: Mutex<HashSet<ProfileId>>,
    last_results: Mutex<HashMap<ProfileId, SyncResult<SyncSummary>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes the profile from the in-flight set however the task ends.
struct InFlight {
    inner: Arc<Inner>,
    profile_id: ProfileId,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        lock(&self.inner.in_flight).remove(&self.profile_id);
    }
}

/// Lossy progress sender; a full channel drops the event.
#[derive(Clone)]
struct Progress(mpsc::Sender<SyncProgress>);

impl Progress {
    fn emit(&self, event: SyncProgress) {
        if self.0.try_send(event).is_err() {
            debug!("progress event dropped");
        }
    }

    fn indeterminate(&self, message: &str) {
        self.emit(SyncProgress::Indeterminate(message.to_string()));
    }

    fn running(&self, current: usize, total: usize, message: &str) {
        self.emit(SyncProgress::Running {
            current,
            total,
            message: message.to_string(),
        });
    }
}

/// Entry point for syncing profiles against their servers.
#[derive(Clone)]
pub struct SyncOrchestrator {
    inner: Arc<Inner>,
}

impl SyncOrchestrator {
    pub fn new(store: LedgerStore, config: SyncConfig) -> SyncResult<Self> {
        let client = HledgerClient::new(&config)?;
        Ok(Self::with_client(client, store, config))
    }

    pub fn with_client(client: HledgerClient, store: LedgerStore, config: SyncConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                store,
                config,
                in_flight: Mutex::new(HashSet::new()),
                last_results: Mutex::new(HashMap::new()),
            }),
        }
    }

    #[must_use]
    pub fn client(&self) -> &HledgerClient {
        &self.inner.client
    }

    #[must_use]
    pub fn store(&self) -> &LedgerStore {
        &self.inner.store
    }

    /// True while a sync for `profile_id` is running.
    #[must_use]
    pub fn is_running(&self, profile_id: ProfileId) -> bool {
        lock(&self.inner.in_flight).contains(&profile_id)
    }

    /// Result of the most recent finished sync of `profile_id`.
    #[must_use]
    pub fn last_result(&self, profile_id: ProfileId) -> Option<SyncResult<SyncSummary>> {
        lock(&self.inner.last_results).get(&profile_id).cloned()
    }

    /// Starts syncing `profile` on the current tokio runtime.
    ///
    /// Fails with [`SyncError::AlreadyRunning`] if the profile is already
    /// being synced.
    pub fn sync(&self, profile: Profile) -> SyncResult<SyncHandle> {
        if !lock(&self.inner.in_flight).insert(profile.id) {
            return Err(SyncError::AlreadyRunning(profile.id));
        }
        let guard = InFlight {
            inner: Arc::clone(&self.inner),
            profile_id: profile.id,
        };

        let (tx, rx) = mpsc::channel(self.inner.config.progress_buffer.max(1));
        let cancel = CancelToken::new(self.inner.config.cancel_poll_interval());
        let inner = Arc::clone(&self.inner);
        let task_cancel = cancel.clone();

        let task = tokio::spawn(async move {
            let result = run(&inner, &profile, &Progress(tx), &task_cancel).await;
            match &result {
                Ok(summary) => info!(
                    profile = %profile.id,
                    accounts = summary.account_count,
                    transactions = summary.transaction_count,
                    duration_ms = summary.duration_ms,
                    "sync complete"
                ),
                Err(e) => warn!(profile = %profile.id, kind = ?e.kind(), "sync failed: {e}"),
            }
            lock(&inner.last_results).insert(profile.id, result.clone());
            drop(guard);
            result
        });

        Ok(SyncHandle {
            progress: rx,
            cancel,
            task,
        })
    }
}

async fn run(
    inner: &Inner,
    profile: &Profile,
    progress: &Progress,
    cancel: &CancelToken,
) -> SyncResult<SyncSummary> {
    let started = Instant::now();
    progress.emit(SyncProgress::Starting(format!("Connecting to {}", profile.url)));

    progress.indeterminate("Fetching accounts");
    let fetched = AccountListFetcher::new(&inner.client).fetch(profile, cancel).await?;
    let expected = fetched.as_ref().map_or(0, |f| f.expected_postings);

    let json = match fetched {
        Some(fetched) => {
            cancel.check()?;
            progress.indeterminate("Fetching transactions");
            TransactionListFetcher::new(&inner.client)
                .fetch(
                    profile,
                    fetched.api,
                    fetched.expected_postings,
                    |current, total| progress.running(current, total, "Processing transactions"),
                    cancel,
                )
                .await?
                .map(|transactions| (fetched.accounts, transactions))
        }
        None => None,
    };

    let used_legacy = json.is_none();
    let (accounts, transactions) = match json {
        Some(lists) => lists,
        None => {
            info!(profile = %profile.id, "JSON API unavailable, scraping the HTML journal");
            progress.indeterminate("Fetching journal page");
            let LegacyParseResult {
                accounts,
                transactions,
            } = LegacyHtmlParser::new(&inner.client)
                .parse(
                    profile,
                    expected,
                    |current, total| progress.running(current, total, "Processing transactions"),
                    cancel,
                )
                .await?;
            (accounts, transactions)
        }
    };

    cancel.check()?;
    progress.indeterminate("Saving");
    let account_count = accounts.len();
    let transaction_count = transactions.len();
    let generation = persist(inner.store.clone(), profile.id, accounts, transactions, cancel.clone()).await?;

    Ok(SyncSummary {
        transaction_count,
        account_count,
        duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        generation,
        used_legacy,
    })
}

/// Saves on the blocking pool and returns the generation written.
async fn persist(
    store: LedgerStore,
    profile_id: ProfileId,
    accounts: Vec<Account>,
    transactions: Vec<Transaction>,
    cancel: CancelToken,
) -> SyncResult<Generation> {
    let summary = tokio::task::spawn_blocking(move || {
        store.save(profile_id, &accounts, &transactions, || cancel.is_cancelled())
    })
    .await
    .map_err(|e| SyncError::Unknown(format!("storage task failed: {e}")))??;

    debug!(
        inserted = summary.transactions_inserted,
        updated = summary.transactions_updated,
        unchanged = summary.transactions_unchanged,
        purged = summary.purged.total(),
        "cache updated"
    );
    Ok(summary.generation)
}
