use chrono::NaiveDate;
use ledgerlink_cli::{
    build_transaction, commodity_styles, load_profile, load_templates, parse_entry, render_progress,
    render_transaction,
};
use ledgerlink_storage::LedgerStore;
use ledgerlink_sync::SyncProgress;
use ledgerlink_types::{Account, AccountAmount, AmountStyle, ApiVersion, CommodityPosition, ProfileId};
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::fs;
use tempfile::TempDir;

fn write(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

// ── Profile & template files ─────────────────────────────────────

#[test]
fn profile_file_loads_with_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "home.json",
        r#"{"id": 7, "name": "home", "url": "https://ledger.example.org/",
            "credentials": {"user": "alice", "password": "s3cret"}, "api_version": "1.32"}"#,
    );

    let profile = load_profile(&path).unwrap();
    assert_eq!(profile.id, ProfileId::new(7));
    assert_eq!(profile.api_version, ApiVersion::V1_32);
    assert_eq!(profile.credentials.unwrap().user, "alice");
    assert_eq!(profile.default_currency, "");
}

#[test]
fn profile_without_url_is_refused() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "bad.json", r#"{"id": 1, "name": "x", "url": "  "}"#);
    assert!(load_profile(&path).is_err());
}

#[test]
fn missing_profile_file_names_the_path() {
    let err = load_profile(std::path::Path::new("/nonexistent/profile.json")).unwrap_err();
    assert!(format!("{err:#}").contains("/nonexistent/profile.json"));
}

#[test]
fn templates_load_from_json_array() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "templates.json",
        r#"[{"name": "card", "pattern": "Paid (\\d+\\.\\d\\d) at (.+)",
             "description": {"match_group": 2},
             "date_year": {"literal": 2026}, "date_month": {"literal": 1}, "date_day": {"literal": 2},
             "lines": [{"account": {"literal": "Expenses:Food"}, "amount": {"match_group": 1}},
                       {"account": {"literal": "Assets:Card"}}]}]"#,
    );

    let templates = load_templates(&path).unwrap();
    assert_eq!(templates.len(), 1);
    assert_eq!(templates[0].lines.len(), 2);
}

// ── Entry parsing ────────────────────────────────────────────────

#[test]
fn entry_with_amount_and_currency() {
    let entry = parse_entry("Expenses:Food=12.50 USD", "EUR").unwrap();
    assert_eq!(entry.account_name, "Expenses:Food");
    assert_eq!(entry.amount, Some(dec!(12.50)));
    assert_eq!(entry.currency, "USD");
}

#[test]
fn entry_defaults_currency_and_strips_grouping() {
    let entry = parse_entry("Assets:Bank=-1,234.00", "EUR").unwrap();
    assert_eq!(entry.amount, Some(dec!(-1234.00)));
    assert_eq!(entry.currency, "EUR");
}

#[test]
fn entry_without_amount_is_open() {
    let entry = parse_entry("Assets:Cash", "EUR").unwrap();
    assert_eq!(entry.amount, None);
    assert_eq!(parse_entry("Assets:Cash=", "EUR").unwrap().amount, None);
}

#[test]
fn malformed_entries_are_errors() {
    assert!(parse_entry("=12", "EUR").is_err());
    assert!(parse_entry("Assets=abc", "EUR").is_err());
    assert!(parse_entry("Assets=1 EUR extra", "EUR").is_err());
}

// ── Building & rendering ─────────────────────────────────────────

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
}

#[test]
fn open_posting_takes_the_remainder() {
    let entries = vec![
        parse_entry("Expenses:Food=12.50", "EUR").unwrap(),
        parse_entry("Assets:Cash", "EUR").unwrap(),
    ];
    let tx = build_transaction(day(), " Lunch ", Some("team"), &entries).unwrap();

    assert_eq!(tx.description, "Lunch");
    assert_eq!(tx.comment.as_deref(), Some("team"));
    assert_eq!(tx.postings[1].amount, Some(dec!(-12.50)));
    assert_eq!(
        render_transaction(&tx, &HashMap::new()),
        "2026-10-19 Lunch  ; team\n    Expenses:Food    12.50 EUR\n    Assets:Cash    -12.50 EUR"
    );
}

#[test]
fn unbalanced_entries_are_refused() {
    let entries = vec![
        parse_entry("Expenses:Food=12.50", "EUR").unwrap(),
        parse_entry("Assets:Cash=-10", "EUR").unwrap(),
    ];
    let err = build_transaction(day(), "Lunch", None, &entries).unwrap_err();
    assert!(err.to_string().contains("2.50 EUR"), "got {err}");
}

#[test]
fn two_open_postings_are_ambiguous() {
    let entries = vec![
        parse_entry("Expenses:Food=12.50", "EUR").unwrap(),
        parse_entry("Assets:Cash", "EUR").unwrap(),
        parse_entry("Assets:Card", "EUR").unwrap(),
    ];
    assert!(build_transaction(day(), "Lunch", None, &entries).is_err());
}

#[test]
fn built_transaction_appends_to_an_on_disk_cache() {
    let dir = TempDir::new().unwrap();
    let pid = ProfileId::new(1);
    let entries = vec![
        parse_entry("Expenses:Food=4", "EUR").unwrap(),
        parse_entry("Assets:Cash", "EUR").unwrap(),
    ];
    let tx = build_transaction(day(), "Coffee", None, &entries).unwrap();

    let path = dir.path().join("cache.db");
    LedgerStore::open(&path).unwrap().append_transaction(pid, &tx).unwrap();

    let reopened = LedgerStore::open(&path).unwrap();
    let stored = reopened.transactions(pid).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].transaction.ledger_id, 1);
    let cash = reopened.account_by_name(pid, "Assets:Cash").unwrap().unwrap();
    assert_eq!(cash.amounts[0].amount, dec!(-4));
}

#[test]
fn cached_commodity_styles_shape_the_listing() {
    let dir = TempDir::new().unwrap();
    let pid = ProfileId::new(1);
    let euro = AmountStyle {
        position: CommodityPosition::After,
        spaced: true,
        precision: Some(2),
        decimal_mark: ',',
    };
    let dollar = AmountStyle {
        position: CommodityPosition::Before,
        spaced: false,
        precision: Some(2),
        decimal_mark: '.',
    };
    let accounts = vec![
        Account::new("Assets").with_amounts(vec![
            AccountAmount::new("EUR", dec!(-4)).with_style(euro),
            AccountAmount::new("$", dec!(10)).with_style(dollar),
        ]),
        Account::new("Expenses").with_amounts(vec![AccountAmount::new("CHF", dec!(3))]),
    ];
    let path = dir.path().join("cache.db");
    LedgerStore::open(&path).unwrap().save(pid, &accounts, &[], || false).unwrap();

    let store = LedgerStore::open(&path).unwrap();
    let cached = store.accounts(pid).unwrap();
    let assets = cached.iter().find(|a| a.name == "Assets").unwrap();
    let rendered: Vec<String> = assets.amounts.iter().map(AccountAmount::render).collect();
    assert!(rendered.contains(&"-4,00 EUR".to_string()), "got {rendered:?}");
    assert!(rendered.contains(&"$10.00".to_string()), "got {rendered:?}");

    let styles = commodity_styles(cached.iter().flat_map(|a| &a.amounts));
    assert_eq!(styles.len(), 2);
    let entries = vec![
        parse_entry("Expenses:Food=4.5", "EUR").unwrap(),
        parse_entry("Expenses:Fees=1 CHF", "EUR").unwrap(),
        parse_entry("Assets:Cash", "EUR").unwrap(),
        parse_entry("Assets:Wallet", "CHF").unwrap(),
    ];
    let tx = build_transaction(day(), "Lunch", None, &entries).unwrap();
    assert_eq!(
        render_transaction(&tx, &styles),
        "2026-10-19 Lunch\n    Expenses:Food    4,50 EUR\n    Expenses:Fees    1 CHF\n    Assets:Cash    -4,50 EUR\n    Assets:Wallet    -1 CHF"
    );
}

#[test]
fn progress_lines() {
    assert_eq!(render_progress(&SyncProgress::Starting("Connecting".into())), "Connecting");
    let running = SyncProgress::Running {
        current: 3,
        total: 10,
        message: "Transactions".into(),
    };
    assert_eq!(render_progress(&running), "Transactions: 3/10");
    let unbounded = SyncProgress::Running {
        current: 3,
        total: 0,
        message: "Journal".into(),
    };
    assert_eq!(render_progress(&unbounded), "Journal: 3");
}
