//! SQLite-backed ledger cache: connection handling, schema and read queries.

use crate::error::{StorageError, StorageResult};
use crate::records::{StoredAccount, StoredTransaction};
use chrono::NaiveDate;
use ledgerlink_types::{AccountAmount, AmountStyle, Generation, Posting, ProfileId, RowId, Transaction};
use rusqlite::{Connection, OptionalExtension, params};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

/// Tuning for the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Rows written between two cancellation checks during a save.
    pub batch_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { batch_size: 100 }
    }
}

/// Persistent cache of one or more profiles' accounts and transactions.
///
/// Cloning is cheap; clones share the same connection.
#[derive(Clone)]
pub struct LedgerStore {
    conn: Arc<Mutex<Connection>>,
    config: StorageConfig,
}

impl LedgerStore {
    /// Opens (or creates) a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        Self::open_with_config(path, StorageConfig::default())
    }

    /// Opens (or creates) a store at the given path with explicit tuning.
    pub fn open_with_config(path: impl AsRef<Path>, config: StorageConfig) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn, config)
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::from_connection(Connection::open_in_memory()?, StorageConfig::default())
    }

    fn from_connection(conn: Connection, config: StorageConfig) -> StorageResult<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            config,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Store tuning in effect.
    #[must_use]
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub(crate) fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::InvalidData("store connection lock poisoned".into()))
    }

    fn init_schema(&self) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                profile_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                name_upper TEXT NOT NULL,
                parent_name TEXT,
                level INTEGER NOT NULL,
                expanded INTEGER NOT NULL DEFAULT 0,
                amounts_expanded INTEGER NOT NULL DEFAULT 0,
                generation INTEGER NOT NULL,
                UNIQUE(profile_id, name)
            );

            CREATE TABLE IF NOT EXISTS account_values (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
                currency TEXT NOT NULL,
                value TEXT NOT NULL,
                style TEXT,
                generation INTEGER NOT NULL,
                UNIQUE(account_id, currency)
            );

            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                profile_id INTEGER NOT NULL,
                ledger_id INTEGER NOT NULL,
                description TEXT NOT NULL,
                description_upper TEXT NOT NULL,
                comment TEXT,
                year INTEGER NOT NULL,
                month INTEGER NOT NULL,
                day INTEGER NOT NULL,
                data_hash TEXT NOT NULL,
                generation INTEGER NOT NULL,
                UNIQUE(profile_id, ledger_id)
            );

            CREATE TABLE IF NOT EXISTS transaction_accounts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                transaction_id INTEGER NOT NULL REFERENCES transactions(id) ON DELETE CASCADE,
                order_no INTEGER NOT NULL,
                account_name TEXT NOT NULL,
                amount TEXT,
                currency TEXT NOT NULL,
                comment TEXT,
                generation INTEGER NOT NULL,
                UNIQUE(transaction_id, order_no)
            );

            CREATE INDEX IF NOT EXISTS idx_transactions_date
                ON transactions(profile_id, year, month, day);
            CREATE INDEX IF NOT EXISTS idx_accounts_name_upper
                ON accounts(profile_id, name_upper);
            ",
        )?;
        Ok(())
    }

    // ── Generations ──────────────────────────────────────────────

    /// Highest generation stored for the profile; zero when nothing is cached.
    pub fn current_generation(&self, profile_id: ProfileId) -> StorageResult<Generation> {
        let conn = self.lock()?;
        max_generation(&conn, profile_id)
    }

    /// Highest ledger id stored for the profile; zero when nothing is cached.
    pub fn max_ledger_id(&self, profile_id: ProfileId) -> StorageResult<i64> {
        let conn = self.lock()?;
        max_ledger_id(&conn, profile_id)
    }

    // ── Accounts ─────────────────────────────────────────────────

    /// All cached accounts of the profile, ordered by name.
    pub fn accounts(&self, profile_id: ProfileId) -> StorageResult<Vec<StoredAccount>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, parent_name, level, expanded, amounts_expanded, generation
             FROM accounts WHERE profile_id = ?1 ORDER BY name",
        )?;
        let rows = stmt
            .query_map(params![profile_id.get()], |row| account_from_row(profile_id, row))?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|mut account| -> StorageResult<StoredAccount> {
                account.amounts = account_amounts(&conn, account.id)?;
                Ok(account)
            })
            .collect()
    }

    /// Looks up one account by its full name.
    pub fn account_by_name(&self, profile_id: ProfileId, name: &str) -> StorageResult<Option<StoredAccount>> {
        let conn = self.lock()?;
        let account = conn
            .query_row(
                "SELECT id, name, parent_name, level, expanded, amounts_expanded, generation
                 FROM accounts WHERE profile_id = ?1 AND name = ?2",
                params![profile_id.get(), name],
                |row| account_from_row(profile_id, row),
            )
            .optional()?;

        match account {
            Some(mut account) => {
                account.amounts = account_amounts(&conn, account.id)?;
                Ok(Some(account))
            }
            None => Ok(None),
        }
    }

    /// Sets the tree expansion flag of an account. Returns false when the
    /// account is not cached.
    pub fn set_account_expanded(&self, profile_id: ProfileId, name: &str, expanded: bool) -> StorageResult<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE accounts SET expanded = ?1 WHERE profile_id = ?2 AND name = ?3",
            params![expanded, profile_id.get(), name],
        )?;
        Ok(changed > 0)
    }

    /// Sets whether all commodities of an account are shown.
    pub fn set_amounts_expanded(&self, profile_id: ProfileId, name: &str, expanded: bool) -> StorageResult<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE accounts SET amounts_expanded = ?1 WHERE profile_id = ?2 AND name = ?3",
            params![expanded, profile_id.get(), name],
        )?;
        Ok(changed > 0)
    }

    // ── Transactions ─────────────────────────────────────────────

    /// All cached transactions of the profile, newest first.
    pub fn transactions(&self, profile_id: ProfileId) -> StorageResult<Vec<StoredTransaction>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, ledger_id, description, comment, year, month, day, data_hash, generation
             FROM transactions WHERE profile_id = ?1
             ORDER BY year DESC, month DESC, day DESC, ledger_id DESC",
        )?;
        let rows = stmt
            .query_map(params![profile_id.get()], transaction_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|row| row.into_stored(&conn, profile_id))
            .collect()
    }

    /// Looks up one transaction by its server-side index.
    pub fn transaction_by_ledger_id(
        &self,
        profile_id: ProfileId,
        ledger_id: i64,
    ) -> StorageResult<Option<StoredTransaction>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT id, ledger_id, description, comment, year, month, day, data_hash, generation
                 FROM transactions WHERE profile_id = ?1 AND ledger_id = ?2",
                params![profile_id.get(), ledger_id],
                transaction_row,
            )
            .optional()?;

        row.map(|row| row.into_stored(&conn, profile_id)).transpose()
    }
}

// ── Row helpers shared with the persistence code ─────────────────

pub(crate) fn max_generation(conn: &Connection, profile_id: ProfileId) -> StorageResult<Generation> {
    let raw: i64 = conn.query_row(
        "SELECT MAX(g) FROM (
             SELECT COALESCE(MAX(generation), 0) AS g FROM accounts WHERE profile_id = ?1
             UNION ALL
             SELECT COALESCE(MAX(generation), 0) AS g FROM transactions WHERE profile_id = ?1
         )",
        params![profile_id.get()],
        |row| row.get(0),
    )?;
    Ok(Generation::new(raw))
}

pub(crate) fn max_ledger_id(conn: &Connection, profile_id: ProfileId) -> StorageResult<i64> {
    let raw: i64 = conn.query_row(
        "SELECT COALESCE(MAX(ledger_id), 0) FROM transactions WHERE profile_id = ?1",
        params![profile_id.get()],
        |row| row.get(0),
    )?;
    Ok(raw)
}

pub(crate) fn parse_decimal(text: &str) -> StorageResult<Decimal> {
    Decimal::from_str(text).map_err(|e| StorageError::InvalidData(format!("bad amount {text:?}: {e}")))
}

fn account_from_row(profile_id: ProfileId, row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredAccount> {
    let level: i64 = row.get(3)?;
    Ok(StoredAccount {
        id: RowId::new(row.get(0)?),
        profile_id,
        name: row.get(1)?,
        parent_name: row.get(2)?,
        level: level as usize,
        expanded: row.get(4)?,
        amounts_expanded: row.get(5)?,
        generation: Generation::new(row.get(6)?),
        amounts: Vec::new(),
    })
}

fn account_amounts(conn: &Connection, account_id: RowId) -> StorageResult<Vec<AccountAmount>> {
    let mut stmt = conn.prepare_cached(
        "SELECT currency, value, style FROM account_values WHERE account_id = ?1 ORDER BY currency",
    )?;
    let rows = stmt
        .query_map(params![account_id.get()], |row| {
            let currency: String = row.get(0)?;
            let value: String = row.get(1)?;
            let style: Option<String> = row.get(2)?;
            Ok((currency, value, style))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(currency, value, style)| -> StorageResult<AccountAmount> {
            let style = style
                .as_deref()
                .map(serde_json::from_str::<AmountStyle>)
                .transpose()?;
            Ok(AccountAmount {
                currency,
                amount: parse_decimal(&value)?,
                style,
            })
        })
        .collect()
}

struct TransactionRow {
    id: i64,
    ledger_id: i64,
    description: String,
    comment: Option<String>,
    year: i32,
    month: u32,
    day: u32,
    data_hash: String,
    generation: i64,
}

fn transaction_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TransactionRow> {
    Ok(TransactionRow {
        id: row.get(0)?,
        ledger_id: row.get(1)?,
        description: row.get(2)?,
        comment: row.get(3)?,
        year: row.get(4)?,
        month: row.get(5)?,
        day: row.get(6)?,
        data_hash: row.get(7)?,
        generation: row.get(8)?,
    })
}

impl TransactionRow {
    fn into_stored(self, conn: &Connection, profile_id: ProfileId) -> StorageResult<StoredTransaction> {
        let date = NaiveDate::from_ymd_opt(self.year, self.month, self.day).ok_or_else(|| {
            StorageError::InvalidData(format!(
                "bad date {}-{}-{} on transaction {}",
                self.year, self.month, self.day, self.ledger_id
            ))
        })?;
        let mut transaction = Transaction::new(self.ledger_id, date, self.description);
        transaction.comment = self.comment;
        transaction.postings = postings(conn, self.id)?;

        Ok(StoredTransaction {
            id: RowId::new(self.id),
            profile_id,
            data_hash: self.data_hash,
            generation: Generation::new(self.generation),
            transaction,
        })
    }
}

fn postings(conn: &Connection, transaction_id: i64) -> StorageResult<Vec<Posting>> {
    let mut stmt = conn.prepare_cached(
        "SELECT account_name, amount, currency, comment FROM transaction_accounts
         WHERE transaction_id = ?1 ORDER BY order_no",
    )?;
    let rows = stmt
        .query_map(params![transaction_id], |row| {
            let account_name: String = row.get(0)?;
            let amount: Option<String> = row.get(1)?;
            let currency: String = row.get(2)?;
            let comment: Option<String> = row.get(3)?;
            Ok((account_name, amount, currency, comment))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(account_name, amount, currency, comment)| -> StorageResult<Posting> {
            Ok(Posting {
                account_name,
                amount: amount.as_deref().map(parse_decimal).transpose()?,
                currency,
                comment,
            })
        })
        .collect()
}
