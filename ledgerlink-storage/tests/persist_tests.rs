use chrono::NaiveDate;
use ledgerlink_storage::{LedgerStore, StorageConfig, StorageError};
use ledgerlink_types::{
    Account, AccountAmount, AmountStyle, CommodityPosition, Generation, Posting, ProfileId, Transaction,
};
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;
use std::cell::Cell;

const PROFILE: ProfileId = ProfileId::new(1);

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
}

fn tx(ledger_id: i64, description: &str) -> Transaction {
    Transaction::new(ledger_id, date(ledger_id as u32), description)
        .with_posting(Posting::new("Expenses:Food", dec!(10), "USD"))
        .with_posting(Posting::new("Assets:Cash", dec!(-10), "USD"))
}

fn accounts() -> Vec<Account> {
    vec![
        Account::new("Assets"),
        Account::new("Assets:Cash").with_amounts(vec![AccountAmount::new("USD", dec!(-30))]),
        Account::new("Expenses"),
        Account::new("Expenses:Food").with_amounts(vec![AccountAmount::new("USD", dec!(30))]),
    ]
}

fn never() -> bool {
    false
}

// ── Generations ──────────────────────────────────────────────────

#[test]
fn first_save_starts_at_generation_one() {
    let store = LedgerStore::open_in_memory().unwrap();
    assert_eq!(store.current_generation(PROFILE).unwrap(), Generation::ZERO);

    let summary = store.save(PROFILE, &accounts(), &[tx(1, "a")], never).unwrap();
    assert_eq!(summary.generation, Generation::new(1));
    assert_eq!(summary.transactions_inserted, 1);
    assert_eq!(store.current_generation(PROFILE).unwrap(), Generation::new(1));
}

#[test]
fn identical_saves_are_idempotent() {
    let store = LedgerStore::open_in_memory().unwrap();
    let txs = vec![tx(1, "a"), tx(2, "b")];

    store.save(PROFILE, &accounts(), &txs, never).unwrap();
    let first_accounts = store.accounts(PROFILE).unwrap();
    let first_txs = store.transactions(PROFILE).unwrap();

    let summary = store.save(PROFILE, &accounts(), &txs, never).unwrap();
    assert_eq!(summary.generation, Generation::new(2));
    assert_eq!(summary.transactions_unchanged, 2);
    assert_eq!(summary.purged.total(), 0);

    let second_accounts = store.accounts(PROFILE).unwrap();
    let second_txs = store.transactions(PROFILE).unwrap();
    assert_eq!(first_accounts.len(), second_accounts.len());
    assert_eq!(first_txs.len(), second_txs.len());
    for (a, b) in first_txs.iter().zip(&second_txs) {
        assert_eq!(a.id, b.id);
        assert_eq!(a.transaction, b.transaction);
        assert_eq!(b.generation, Generation::new(2));
    }
    for (a, b) in first_accounts.iter().zip(&second_accounts) {
        assert_eq!(a.id, b.id);
        assert_eq!(a.amounts, b.amounts);
    }
}

// ── Reconciliation ───────────────────────────────────────────────

#[test]
fn stale_transactions_are_purged_and_survivors_keep_row_ids() {
    let store = LedgerStore::open_in_memory().unwrap();
    store
        .save(PROFILE, &accounts(), &[tx(1, "a"), tx(2, "b"), tx(3, "c")], never)
        .unwrap();
    let id1 = store.transaction_by_ledger_id(PROFILE, 1).unwrap().unwrap().id;
    let id2 = store.transaction_by_ledger_id(PROFILE, 2).unwrap().unwrap().id;

    let summary = store
        .save(PROFILE, &accounts(), &[tx(1, "a"), tx(2, "b")], never)
        .unwrap();
    assert_eq!(summary.purged.transactions, 1);
    assert_eq!(summary.purged.postings, 2);

    assert!(store.transaction_by_ledger_id(PROFILE, 3).unwrap().is_none());
    assert_eq!(store.transaction_by_ledger_id(PROFILE, 1).unwrap().unwrap().id, id1);
    assert_eq!(store.transaction_by_ledger_id(PROFILE, 2).unwrap().unwrap().id, id2);
}

#[test]
fn changed_transaction_is_rewritten_in_place() {
    let store = LedgerStore::open_in_memory().unwrap();
    store.save(PROFILE, &[], &[tx(5, "before")], never).unwrap();
    let before = store.transaction_by_ledger_id(PROFILE, 5).unwrap().unwrap();

    let changed = Transaction::new(5, date(5), "after")
        .with_comment("edited")
        .with_posting(Posting::new("Expenses:Rent", dec!(700), "EUR"));
    let summary = store.save(PROFILE, &[], &[changed.clone()], never).unwrap();
    assert_eq!(summary.transactions_updated, 1);
    assert_eq!(summary.purged.postings, 1);

    let after = store.transaction_by_ledger_id(PROFILE, 5).unwrap().unwrap();
    assert_eq!(after.id, before.id);
    assert_ne!(after.data_hash, before.data_hash);
    assert_eq!(after.transaction, changed);
}

#[test]
fn accounts_keep_local_ui_state_across_syncs() {
    let store = LedgerStore::open_in_memory().unwrap();
    store.save(PROFILE, &accounts(), &[], never).unwrap();
    assert!(store.set_account_expanded(PROFILE, "Assets", true).unwrap());
    assert!(store.set_amounts_expanded(PROFILE, "Assets:Cash", true).unwrap());
    assert!(!store.set_account_expanded(PROFILE, "Nope", true).unwrap());

    store.save(PROFILE, &accounts(), &[], never).unwrap();
    assert!(store.account_by_name(PROFILE, "Assets").unwrap().unwrap().expanded);
    assert!(store.account_by_name(PROFILE, "Assets:Cash").unwrap().unwrap().amounts_expanded);
}

#[test]
fn dropped_currency_balance_is_purged() {
    let store = LedgerStore::open_in_memory().unwrap();
    let both = vec![Account::new("Assets").with_amounts(vec![
        AccountAmount::new("USD", dec!(1)),
        AccountAmount::new("EUR", dec!(2)),
    ])];
    store.save(PROFILE, &both, &[], never).unwrap();

    let only_usd = vec![Account::new("Assets").with_amounts(vec![AccountAmount::new("USD", dec!(3))])];
    let summary = store.save(PROFILE, &only_usd, &[], never).unwrap();
    assert_eq!(summary.purged.account_values, 1);

    let stored = store.account_by_name(PROFILE, "Assets").unwrap().unwrap();
    assert_eq!(stored.amounts, vec![AccountAmount::new("USD", dec!(3))]);
}

#[test]
fn amount_style_round_trips_through_store() {
    let store = LedgerStore::open_in_memory().unwrap();
    let style = AmountStyle {
        position: CommodityPosition::Before,
        spaced: false,
        precision: Some(2),
        decimal_mark: ',',
    };
    let accounts = vec![
        Account::new("Assets").with_amounts(vec![AccountAmount::new("$", dec!(12.5)).with_style(style.clone())]),
    ];
    store.save(PROFILE, &accounts, &[], never).unwrap();
    let stored = store.account_by_name(PROFILE, "Assets").unwrap().unwrap();
    assert_eq!(stored.amounts[0].style, Some(style));
}

#[test]
fn profiles_are_isolated() {
    let store = LedgerStore::open_in_memory().unwrap();
    let other = ProfileId::new(2);
    store.save(PROFILE, &accounts(), &[tx(1, "a")], never).unwrap();
    store.save(other, &[], &[], never).unwrap();

    assert_eq!(store.transactions(PROFILE).unwrap().len(), 1);
    assert_eq!(store.accounts(PROFILE).unwrap().len(), 4);
    assert!(store.transactions(other).unwrap().is_empty());
}

// ── Cancellation ─────────────────────────────────────────────────

#[test]
fn cancelled_save_leaves_cache_untouched() {
    let store = LedgerStore::open_with_config(":memory:", StorageConfig { batch_size: 2 }).unwrap();
    store.save(PROFILE, &accounts(), &[tx(1, "a"), tx(2, "b")], never).unwrap();
    let before = store.transactions(PROFILE).unwrap();

    let polls = Cell::new(0);
    let cancel_on_second_poll = || {
        polls.set(polls.get() + 1);
        polls.get() > 1
    };
    let result = store.save(PROFILE, &accounts(), &[tx(9, "new")], cancel_on_second_poll);
    assert!(matches!(result, Err(StorageError::Cancelled)));

    assert_eq!(store.current_generation(PROFILE).unwrap(), Generation::new(1));
    assert_eq!(store.transactions(PROFILE).unwrap(), before);
}

#[test]
fn save_cancelled_up_front_writes_nothing() {
    let store = LedgerStore::open_in_memory().unwrap();
    let result = store.save(PROFILE, &accounts(), &[tx(1, "a")], || true);
    assert!(matches!(result, Err(StorageError::Cancelled)));
    assert!(store.accounts(PROFILE).unwrap().is_empty());
}

// ── Local append ─────────────────────────────────────────────────

#[test]
fn append_assigns_next_ledger_id_and_updates_balances() {
    let store = LedgerStore::open_in_memory().unwrap();
    store.save(PROFILE, &accounts(), &[tx(1, "a"), tx(4, "b")], never).unwrap();

    let local = Transaction::new(0, date(20), "Coffee")
        .with_posting(Posting::new("Expenses:Food:Coffee", dec!(3.50), "USD"))
        .with_posting(Posting::new("Assets:Cash", dec!(-3.50), "USD"));
    let stored = store.append_transaction(PROFILE, &local).unwrap();

    assert_eq!(stored.transaction.ledger_id, 5);
    assert_eq!(stored.generation, Generation::new(1));
    assert_eq!(store.max_ledger_id(PROFILE).unwrap(), 5);

    let coffee = store.account_by_name(PROFILE, "Expenses:Food:Coffee").unwrap().unwrap();
    assert_eq!(coffee.level, 2);
    assert_eq!(coffee.parent_name.as_deref(), Some("Expenses:Food"));
    assert_eq!(coffee.amounts, vec![AccountAmount::new("USD", dec!(3.50))]);

    let food = store.account_by_name(PROFILE, "Expenses:Food").unwrap().unwrap();
    assert_eq!(food.amounts[0].amount, dec!(33.50));
    let cash = store.account_by_name(PROFILE, "Assets:Cash").unwrap().unwrap();
    assert_eq!(cash.amounts[0].amount, dec!(-33.50));
}

#[test]
fn appended_transaction_is_replaced_by_next_sync() {
    let store = LedgerStore::open_in_memory().unwrap();
    store.save(PROFILE, &accounts(), &[tx(1, "a")], never).unwrap();
    store.append_transaction(PROFILE, &tx(7, "local")).unwrap();
    assert_eq!(store.transactions(PROFILE).unwrap().len(), 2);

    store.save(PROFILE, &accounts(), &[tx(1, "a")], never).unwrap();
    assert_eq!(store.transactions(PROFILE).unwrap().len(), 1);
}

#[test]
fn explicit_purge_removes_older_rows() {
    let store = LedgerStore::open_in_memory().unwrap();
    store.save(PROFILE, &accounts(), &[tx(1, "a")], never).unwrap();
    let stats = store.purge_older_than(PROFILE, Generation::new(2)).unwrap();
    assert_eq!(stats.transactions, 1);
    assert_eq!(stats.accounts, 4);
    assert!(store.accounts(PROFILE).unwrap().is_empty());
}
