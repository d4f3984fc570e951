use chrono::NaiveDate;
use ledgerlink_storage::{LedgerStore, StorageConfig};
use ledgerlink_types::{Account, AccountAmount, Generation, Posting, ProfileId, Transaction};
use rust_decimal_macros::dec;

const PROFILE: ProfileId = ProfileId::new(7);

#[test]
fn empty_store_queries() {
    let store = LedgerStore::open_in_memory().unwrap();
    assert!(store.accounts(PROFILE).unwrap().is_empty());
    assert!(store.transactions(PROFILE).unwrap().is_empty());
    assert!(store.account_by_name(PROFILE, "Assets").unwrap().is_none());
    assert!(store.transaction_by_ledger_id(PROFILE, 1).unwrap().is_none());
    assert_eq!(store.max_ledger_id(PROFILE).unwrap(), 0);
    assert_eq!(store.current_generation(PROFILE).unwrap(), Generation::ZERO);
}

#[test]
fn default_config_batches_a_hundred_rows() {
    let store = LedgerStore::open_in_memory().unwrap();
    assert_eq!(store.config().batch_size, 100);
    let parsed: StorageConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(parsed, StorageConfig::default());
}

#[test]
fn transactions_come_back_newest_first() {
    let store = LedgerStore::open_in_memory().unwrap();
    let d = |m, day| NaiveDate::from_ymd_opt(2023, m, day).unwrap();
    let txs = vec![
        Transaction::new(1, d(1, 5), "old"),
        Transaction::new(2, d(3, 1), "new"),
        Transaction::new(3, d(1, 5), "old, later id"),
    ];
    store.save(PROFILE, &[], &txs, || false).unwrap();

    let ids: Vec<i64> = store
        .transactions(PROFILE)
        .unwrap()
        .iter()
        .map(|t| t.transaction.ledger_id)
        .collect();
    assert_eq!(ids, vec![2, 3, 1]);
}

#[test]
fn open_postings_are_preserved() {
    let store = LedgerStore::open_in_memory().unwrap();
    let tx = Transaction::new(1, NaiveDate::from_ymd_opt(2023, 6, 1).unwrap(), "split")
        .with_posting(Posting::new("Expenses:A", dec!(1.25), "EUR").with_comment("note"))
        .with_posting(Posting::open("Assets:Bank", "EUR"));
    store.save(PROFILE, &[], &[tx.clone()], || false).unwrap();

    let stored = store.transaction_by_ledger_id(PROFILE, 1).unwrap().unwrap();
    assert_eq!(stored.transaction, tx);
    assert_eq!(stored.data_hash, tx.content_hash(PROFILE));
}

#[test]
fn on_disk_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");

    {
        let store = LedgerStore::open(&path).unwrap();
        let accounts = vec![Account::new("Assets:Bank").with_amounts(vec![AccountAmount::new("USD", dec!(100))])];
        store.save(PROFILE, &accounts, &[], || false).unwrap();
        store.set_account_expanded(PROFILE, "Assets:Bank", true).unwrap();
    }

    let store = LedgerStore::open(&path).unwrap();
    let bank = store.account_by_name(PROFILE, "Assets:Bank").unwrap().unwrap();
    assert!(bank.expanded);
    assert_eq!(bank.amounts[0].amount, dec!(100));
    assert_eq!(store.current_generation(PROFILE).unwrap(), Generation::new(1));
}

#[test]
fn clones_share_one_connection() {
    let store = LedgerStore::open_in_memory().unwrap();
    let clone = store.clone();
    clone.save(PROFILE, &[Account::new("Income")], &[], || false).unwrap();
    assert!(store.account_by_name(PROFILE, "Income").unwrap().is_some());
}
