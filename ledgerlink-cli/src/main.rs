//! ledgerlink command-line client
//!
//! Mirrors an hledger-web server into a local SQLite cache and composes new
//! transactions from text templates.
//!
//! Usage:
//!   ledgerlink --profile home.json sync
//!   ledgerlink --profile home.json match --templates templates.json "Paid 12.50 at Cafe"
//!   ledgerlink --profile home.json add "Lunch" Expenses:Food=12.50 Assets:Cash --send

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use ledgerlink_cli::{
    build_transaction, commodity_styles, load_profile, load_templates, parse_entry, render_progress,
    render_transaction,
};
use ledgerlink_entry::{amount_hints, calculate_balance, extract_transaction, find_match};
use ledgerlink_storage::LedgerStore;
use ledgerlink_sync::{
    CancelToken, HledgerClient, SyncConfig, SyncOrchestrator, TransactionSender, candidate_apis,
    detect_version,
};
use ledgerlink_types::{AccountAmount, AmountStyle, Profile};
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "ledgerlink")]
#[command(about = "Offline mirror and entry client for hledger-web")]
struct Args {
    /// Server profile (JSON)
    #[arg(short, long)]
    profile: PathBuf,

    /// Path to the local cache database
    #[arg(long, default_value = "ledgerlink.db")]
    db: PathBuf,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download accounts and transactions into the cache
    Sync,
    /// Query the server release and list the API shapes that would be tried
    DetectVersion,
    /// List cached accounts with their balances
    Accounts,
    /// List cached transactions, newest first
    Transactions {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Match text against templates and show the extracted transaction
    Match {
        /// Template definitions (JSON array)
        #[arg(short, long)]
        templates: PathBuf,
        text: String,
    },
    /// Balance postings given as ACCOUNT[=AMOUNT[ CURRENCY]]
    Balance {
        #[arg(required = true)]
        entries: Vec<String>,
    },
    /// Record a new transaction in the cache, optionally sending it
    Add {
        description: String,
        #[arg(required = true)]
        entries: Vec<String>,
        /// Defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        comment: Option<String>,
        /// Submit to the server before recording it
        #[arg(long)]
        send: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    let profile = load_profile(&args.profile)?;
    match args.command {
        Command::Sync => sync(profile, &args.db).await,
        Command::DetectVersion => show_version(&profile).await,
        Command::Accounts => list_accounts(&profile, &args.db),
        Command::Transactions { limit } => list_transactions(&profile, &args.db, limit),
        Command::Match { templates, text } => match_text(&profile, &templates, &text),
        Command::Balance { entries } => balance(&profile, &entries),
        Command::Add {
            description,
            entries,
            date,
            comment,
            send,
        } => {
            let date = date.unwrap_or_else(|| Local::now().date_naive());
            add(&profile, &args.db, date, &description, comment.as_deref(), &entries, send).await
        }
    }
}

fn open_store(db: &Path) -> Result<LedgerStore> {
    LedgerStore::open(db).with_context(|| format!("Failed to open cache {}", db.display()))
}

async fn sync(profile: Profile, db: &Path) -> Result<()> {
    let orchestrator = SyncOrchestrator::new(open_store(db)?, SyncConfig::default())?;
    info!("Syncing profile '{}' from {}", profile.name, profile.url);
    let mut handle = orchestrator.sync(profile)?;

    let cancel = handle.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling sync");
            cancel.cancel();
        }
    });

    while let Some(event) = handle.next_progress().await {
        info!("{}", render_progress(&event));
    }
    let summary = handle.join().await?;

    info!(
        "Synced {} accounts and {} transactions in {} ms{}",
        summary.account_count,
        summary.transaction_count,
        summary.duration_ms,
        if summary.used_legacy { " (journal page)" } else { "" }
    );
    Ok(())
}

async fn show_version(profile: &Profile) -> Result<()> {
    let client = HledgerClient::new(&SyncConfig::default())?;
    let cancel = CancelToken::default();

    match detect_version(&client, profile, &cancel).await? {
        Some(version) => println!("Server version: {version}"),
        None => println!("Server version: unknown"),
    }
    let candidates = candidate_apis(&client, profile, &cancel).await?;
    if candidates.is_empty() {
        println!("No supported JSON API; the journal page would be scraped");
    } else {
        let list: Vec<String> = candidates.iter().map(ToString::to_string).collect();
        println!("API shapes to try: {}", list.join(", "));
    }
    Ok(())
}

fn list_accounts(profile: &Profile, db: &Path) -> Result<()> {
    let store = open_store(db)?;
    for account in store.accounts(profile.id)? {
        let amounts: Vec<String> = account.amounts.iter().map(AccountAmount::render).collect();
        println!(
            "{}{:<40} {}",
            "  ".repeat(account.level),
            account.name,
            amounts.join(", ")
        );
    }
    Ok(())
}

fn cached_styles(store: &LedgerStore, profile: &Profile) -> Result<HashMap<String, AmountStyle>> {
    let accounts = store.accounts(profile.id)?;
    Ok(commodity_styles(accounts.iter().flat_map(|a| &a.amounts)))
}

fn list_transactions(profile: &Profile, db: &Path, limit: usize) -> Result<()> {
    let store = open_store(db)?;
    let styles = cached_styles(&store, profile)?;
    for stored in store.transactions(profile.id)?.iter().take(limit) {
        println!("{}\n", render_transaction(&stored.transaction, &styles));
    }
    Ok(())
}

fn match_text(profile: &Profile, templates: &Path, text: &str) -> Result<()> {
    let templates = load_templates(templates)?;
    let Some(matched) = find_match(text, &templates) else {
        bail!("No template matches the given text");
    };
    println!("Template: {}", matched.template.name);

    let extracted = extract_transaction(&matched, &profile.default_currency);
    let date = extracted
        .date
        .map_or_else(|| "(no date)".to_string(), |d| d.format("%Y-%m-%d").to_string());
    println!("{date} {}", extracted.description);

    let entries = extracted.entries();
    let result = calculate_balance(&entries);
    for line in &result.lines {
        match line.amount {
            Some(amount) => println!("    {}    {} {}", line.account_name, amount, line.currency),
            None => println!("    {}", line.account_name),
        }
    }
    if !result.is_balanced {
        warn!("Extracted postings do not balance");
    }
    Ok(())
}

fn balance(profile: &Profile, args: &[String]) -> Result<()> {
    let entries = args
        .iter()
        .map(|arg| parse_entry(arg, &profile.default_currency))
        .collect::<Result<Vec<_>>>()?;

    let result = calculate_balance(&entries);
    let hints = amount_hints(&entries);
    for (entry, hint) in entries.iter().zip(hints) {
        match (entry.amount, hint) {
            (Some(amount), _) => println!("    {}    {} {}", entry.account_name, amount, entry.currency),
            (None, Some(hint)) => println!("    {}    ({hint})", entry.account_name),
            (None, None) => println!("    {}", entry.account_name),
        }
    }
    println!("Balanced: {}", if result.is_balanced { "yes" } else { "no" });
    Ok(())
}

async fn add(
    profile: &Profile,
    db: &Path,
    date: NaiveDate,
    description: &str,
    comment: Option<&str>,
    args: &[String],
    send: bool,
) -> Result<()> {
    let entries = args
        .iter()
        .map(|arg| parse_entry(arg, &profile.default_currency))
        .collect::<Result<Vec<_>>>()?;
    let transaction = build_transaction(date, description, comment, &entries)?;

    if send {
        let client = HledgerClient::new(&SyncConfig::default())?;
        let api = TransactionSender::new(&client)
            .send(profile, &transaction, &CancelToken::default())
            .await?;
        info!("Server accepted the transaction (API {api})");
    }

    let store = open_store(db)?;
    let stored = store.append_transaction(profile.id, &transaction)?;
    let styles = cached_styles(&store, profile)?;
    println!("{}", render_transaction(&stored.transaction, &styles));
    Ok(())
}
