//! Generational writes: sync saves, local appends and stale-row purges.
//!
//! A sync stamps every row it confirms with the next generation and, only
//! once everything was written, deletes whatever still carries an older one.

use crate::error::{StorageError, StorageResult};
use crate::records::{PurgeStats, SaveSummary, StoredTransaction};
use crate::store::{LedgerStore, max_generation, max_ledger_id, parse_decimal};
use chrono::Datelike;
use ledgerlink_types::{Account, AccountAmount, Generation, Posting, ProfileId, RowId, Transaction, level, parent_name};
use rusqlite::{Connection, OptionalExtension, params};
use rust_decimal::Decimal;
use tracing::{debug, info};

enum Outcome {
    Inserted,
    Updated,
    Unchanged,
}

impl LedgerStore {
    /// Replaces the cached state of a profile with a freshly fetched one.
    ///
    /// Rows are matched by natural key so their row ids survive. `is_cancelled`
    /// is polled between batches of [`StorageConfig::batch_size`] rows; a
    /// cancelled or failed save is rolled back completely.
    ///
    /// [`StorageConfig::batch_size`]: crate::StorageConfig::batch_size
    pub fn save(
        &self,
        profile_id: ProfileId,
        accounts: &[Account],
        transactions: &[Transaction],
        is_cancelled: impl Fn() -> bool,
    ) -> StorageResult<SaveSummary> {
        let batch_size = self.config().batch_size.max(1);
        if is_cancelled() {
            return Err(StorageError::Cancelled);
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let generation = max_generation(&tx, profile_id)?.next();
        debug!(
            profile = %profile_id,
            %generation,
            accounts = accounts.len(),
            transactions = transactions.len(),
            "saving fetched ledger"
        );

        let mut summary = SaveSummary {
            generation,
            ..SaveSummary::default()
        };
        let mut written = 0usize;

        for account in accounts {
            upsert_account(&tx, profile_id, account, generation)?;
            summary.accounts += 1;
            written += 1;
            checkpoint(written, batch_size, &is_cancelled)?;
        }

        for transaction in transactions {
            match store_transaction(&tx, profile_id, transaction, generation)? {
                Outcome::Inserted => summary.transactions_inserted += 1,
                Outcome::Updated => summary.transactions_updated += 1,
                Outcome::Unchanged => summary.transactions_unchanged += 1,
            }
            written += 1;
            checkpoint(written, batch_size, &is_cancelled)?;
        }

        if is_cancelled() {
            return Err(StorageError::Cancelled);
        }

        summary.purged = purge(&tx, profile_id, generation)?;
        tx.commit()?;

        info!(
            profile = %profile_id,
            %generation,
            accounts = summary.accounts,
            inserted = summary.transactions_inserted,
            updated = summary.transactions_updated,
            unchanged = summary.transactions_unchanged,
            purged = summary.purged.total(),
            "ledger saved"
        );
        Ok(summary)
    }

    /// Deletes every row of the profile tagged older than `generation`.
    pub fn purge_older_than(&self, profile_id: ProfileId, generation: Generation) -> StorageResult<PurgeStats> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let stats = purge(&tx, profile_id, generation)?;
        tx.commit()?;
        Ok(stats)
    }

    /// Appends a locally entered transaction.
    ///
    /// The transaction gets the next free ledger id and the current
    /// generation. Its accounts and their ancestors are created when missing
    /// and each posting amount is added to their balances.
    pub fn append_transaction(
        &self,
        profile_id: ProfileId,
        transaction: &Transaction,
    ) -> StorageResult<StoredTransaction> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let generation = max_generation(&tx, profile_id)?;

        let mut appended = transaction.clone();
        appended.ledger_id = max_ledger_id(&tx, profile_id)? + 1;
        let data_hash = appended.content_hash(profile_id);
        let id = insert_transaction(&tx, profile_id, &appended, &data_hash, generation)?;

        for posting in &appended.postings {
            let mut name = Some(posting.account_name.as_str());
            while let Some(current) = name {
                let account_id = ensure_account(&tx, profile_id, current, generation)?;
                if let Some(amount) = posting.amount {
                    add_to_balance(&tx, account_id, &posting.currency, amount, generation)?;
                }
                name = parent_name(current);
            }
        }
        tx.commit()?;

        debug!(profile = %profile_id, ledger_id = appended.ledger_id, "transaction appended");
        Ok(StoredTransaction {
            id: RowId::new(id),
            profile_id,
            data_hash,
            generation,
            transaction: appended,
        })
    }
}

fn checkpoint(written: usize, batch_size: usize, is_cancelled: &impl Fn() -> bool) -> StorageResult<()> {
    if written % batch_size == 0 {
        if is_cancelled() {
            debug!(written, "save cancelled, rolling back");
            return Err(StorageError::Cancelled);
        }
        debug!(written, "batch written");
    }
    Ok(())
}

// ── Accounts ─────────────────────────────────────────────────────

fn upsert_account(
    conn: &Connection,
    profile_id: ProfileId,
    account: &Account,
    generation: Generation,
) -> StorageResult<i64> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM accounts WHERE profile_id = ?1 AND name = ?2",
            params![profile_id.get(), account.name],
            |row| row.get(0),
        )
        .optional()?;

    // expanded / amounts_expanded are local state and are left alone
    let id = match existing {
        Some(id) => {
            conn.execute(
                "UPDATE accounts SET name_upper = ?1, parent_name = ?2, level = ?3, generation = ?4
                 WHERE id = ?5",
                params![
                    account.name.to_uppercase(),
                    account.parent_name(),
                    account.level() as i64,
                    generation.get(),
                    id
                ],
            )?;
            id
        }
        None => insert_account(conn, profile_id, &account.name, generation)?,
    };

    for amount in &account.amounts {
        upsert_balance(conn, id, amount, generation)?;
    }
    Ok(id)
}

fn insert_account(conn: &Connection, profile_id: ProfileId, name: &str, generation: Generation) -> StorageResult<i64> {
    conn.execute(
        "INSERT INTO accounts (profile_id, name, name_upper, parent_name, level, generation)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            profile_id.get(),
            name,
            name.to_uppercase(),
            parent_name(name),
            level(name) as i64,
            generation.get()
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn ensure_account(conn: &Connection, profile_id: ProfileId, name: &str, generation: Generation) -> StorageResult<i64> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM accounts WHERE profile_id = ?1 AND name = ?2",
            params![profile_id.get(), name],
            |row| row.get(0),
        )
        .optional()?;
    match existing {
        Some(id) => Ok(id),
        None => insert_account(conn, profile_id, name, generation),
    }
}

fn upsert_balance(conn: &Connection, account_id: i64, amount: &AccountAmount, generation: Generation) -> StorageResult<()> {
    let style = amount.style.as_ref().map(serde_json::to_string).transpose()?;
    conn.execute(
        "INSERT INTO account_values (account_id, currency, value, style, generation)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(account_id, currency) DO UPDATE SET
             value = excluded.value, style = excluded.style, generation = excluded.generation",
        params![
            account_id,
            amount.currency,
            amount.amount.to_string(),
            style,
            generation.get()
        ],
    )?;
    Ok(())
}

fn add_to_balance(
    conn: &Connection,
    account_id: i64,
    currency: &str,
    amount: Decimal,
    generation: Generation,
) -> StorageResult<()> {
    let existing: Option<(i64, String)> = conn
        .query_row(
            "SELECT id, value FROM account_values WHERE account_id = ?1 AND currency = ?2",
            params![account_id, currency],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match existing {
        Some((id, value)) => {
            let total = parse_decimal(&value)? + amount;
            conn.execute(
                "UPDATE account_values SET value = ?1 WHERE id = ?2",
                params![total.to_string(), id],
            )?;
        }
        None => {
            conn.execute(
                "INSERT INTO account_values (account_id, currency, value, generation) VALUES (?1, ?2, ?3, ?4)",
                params![account_id, currency, amount.to_string(), generation.get()],
            )?;
        }
    }
    Ok(())
}

// ── Transactions ─────────────────────────────────────────────────

fn store_transaction(
    conn: &Connection,
    profile_id: ProfileId,
    transaction: &Transaction,
    generation: Generation,
) -> StorageResult<Outcome> {
    let data_hash = transaction.content_hash(profile_id);
    let existing: Option<(i64, String)> = conn
        .query_row(
            "SELECT id, data_hash FROM transactions WHERE profile_id = ?1 AND ledger_id = ?2",
            params![profile_id.get(), transaction.ledger_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match existing {
        Some((id, stored_hash)) if stored_hash == data_hash => {
            conn.execute(
                "UPDATE transactions SET generation = ?1 WHERE id = ?2",
                params![generation.get(), id],
            )?;
            conn.execute(
                "UPDATE transaction_accounts SET generation = ?1 WHERE transaction_id = ?2",
                params![generation.get(), id],
            )?;
            Ok(Outcome::Unchanged)
        }
        Some((id, _)) => {
            conn.execute(
                "UPDATE transactions SET description = ?1, description_upper = ?2, comment = ?3,
                     year = ?4, month = ?5, day = ?6, data_hash = ?7, generation = ?8
                 WHERE id = ?9",
                params![
                    transaction.description,
                    transaction.description.to_uppercase(),
                    transaction.comment,
                    transaction.date.year(),
                    transaction.date.month(),
                    transaction.date.day(),
                    data_hash,
                    generation.get(),
                    id
                ],
            )?;
            write_postings(conn, id, &transaction.postings, generation)?;
            Ok(Outcome::Updated)
        }
        None => {
            insert_transaction(conn, profile_id, transaction, &data_hash, generation)?;
            Ok(Outcome::Inserted)
        }
    }
}

fn insert_transaction(
    conn: &Connection,
    profile_id: ProfileId,
    transaction: &Transaction,
    data_hash: &str,
    generation: Generation,
) -> StorageResult<i64> {
    conn.execute(
        "INSERT INTO transactions (profile_id, ledger_id, description, description_upper, comment,
             year, month, day, data_hash, generation)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            profile_id.get(),
            transaction.ledger_id,
            transaction.description,
            transaction.description.to_uppercase(),
            transaction.comment,
            transaction.date.year(),
            transaction.date.month(),
            transaction.date.day(),
            data_hash,
            generation.get()
        ],
    )?;
    let id = conn.last_insert_rowid();
    write_postings(conn, id, &transaction.postings, generation)?;
    Ok(id)
}

/// Writes postings by position; surplus old postings keep their stale
/// generation and go away with the purge.
fn write_postings(conn: &Connection, transaction_id: i64, postings: &[Posting], generation: Generation) -> StorageResult<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO transaction_accounts
             (transaction_id, order_no, account_name, amount, currency, comment, generation)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(transaction_id, order_no) DO UPDATE SET
             account_name = excluded.account_name, amount = excluded.amount,
             currency = excluded.currency, comment = excluded.comment,
             generation = excluded.generation",
    )?;
    for (index, posting) in postings.iter().enumerate() {
        stmt.execute(params![
            transaction_id,
            index as i64 + 1,
            posting.account_name,
            posting.amount.map(|a| a.to_string()),
            posting.currency,
            posting.comment,
            generation.get()
        ])?;
    }
    Ok(())
}

// ── Purge ────────────────────────────────────────────────────────

fn purge(conn: &Connection, profile_id: ProfileId, generation: Generation) -> StorageResult<PurgeStats> {
    let p = profile_id.get();
    let g = generation.get();

    let postings = conn.execute(
        "DELETE FROM transaction_accounts WHERE generation < ?2
         AND transaction_id IN (SELECT id FROM transactions WHERE profile_id = ?1)",
        params![p, g],
    )?;
    let transactions = conn.execute(
        "DELETE FROM transactions WHERE profile_id = ?1 AND generation < ?2",
        params![p, g],
    )?;
    let account_values = conn.execute(
        "DELETE FROM account_values WHERE generation < ?2
         AND account_id IN (SELECT id FROM accounts WHERE profile_id = ?1)",
        params![p, g],
    )?;
    let accounts = conn.execute(
        "DELETE FROM accounts WHERE profile_id = ?1 AND generation < ?2",
        params![p, g],
    )?;

    let stats = PurgeStats {
        accounts,
        account_values,
        transactions,
        postings,
    };
    if stats.total() > 0 {
        debug!(profile = %profile_id, %generation, ?stats, "purged stale rows");
    }
    Ok(stats)
}
