//! Server sync engine for ledgerlink.
//!
//! Mirrors the accounts and transactions of an hledger-web server into the
//! local [`LedgerStore`](ledgerlink_storage::LedgerStore).
//!
//! # Architecture
//!
//! - **Client**: thin `reqwest` wrapper with basic auth and cancellation
//! - **Version**: queries `GET /version` and picks the JSON schema to speak
//! - **Fetch**: account and transaction lists over the JSON API
//! - **Legacy**: HTML journal scraper for servers without a JSON API
//! - **Orchestrator**: runs one cancellable sync per profile and persists the
//!   result as a new cache generation
//! - **Sender**: submits locally composed transactions with `PUT /add`
//!
//! ## Sync Process
//!
//! 1. **Detect**: choose candidate API versions for the profile
//! 2. **Accounts**: fetch the account list; "unsupported" means fall back
//! 3. **Transactions**: fetch the transaction list, or scrape the journal
//! 4. **Persist**: write everything as the next generation, purge the rest
//!
//! # Example
//!
//! ```no_run
//! use ledgerlink_storage::LedgerStore;
//! use ledgerlink_sync::{SyncConfig, SyncOrchestrator, SyncProgress};
//! use ledgerlink_types::{Profile, ProfileId};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let store = LedgerStore::open("ledger.db")?;
//! let orchestrator = SyncOrchestrator::new(store, SyncConfig::default())?;
//!
//! let profile = Profile::new(ProfileId::new(1), "home", "https://ledger.example.org");
//! let mut handle = orchestrator.sync(profile)?;
//! while let Some(event) = handle.next_progress().await {
//!     if let SyncProgress::Running { current, total, .. } = event {
//!         println!("{current}/{total}");
//!     }
//! }
//! let summary = handle.join().await?;
//! println!("{} transactions", summary.transaction_count);
//! # Ok(())
//! # }
//! ```

mod cancel;
mod client;
mod config;
mod error;
mod fetch;
mod legacy;
mod orchestrator;
mod sender;
mod version;
mod wire;

pub use cancel::CancelToken;
pub use client::HledgerClient;
pub use config::SyncConfig;
pub use error::{FetchError, FetchResult, SyncError, SyncErrorKind, SyncResult};
pub use fetch::{AccountFetchResult, AccountListFetcher, TransactionListFetcher};
pub use legacy::{LegacyHtmlParser, LegacyParseResult, parse_journal};
pub use orchestrator::{SyncHandle, SyncOrchestrator, SyncProgress, SyncSummary};
pub use sender::TransactionSender;
pub use version::{candidate_apis, detect_version};
