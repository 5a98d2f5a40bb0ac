use rusqlite::{Connection, OptionalExtension, Row};

use crate::error::{BudgieError, Result};
use crate::models::{Account, AccountType, NewTransaction, Transaction, TransactionKind};

const TXN_COLUMNS: &str =
    "id, account_id, date, description, amount_cents, kind, transfer_account_id, import_id";

pub(crate) fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: row.get(0)?,
        account_id: row.get(1)?,
        date: row.get(2)?,
        description: row.get(3)?,
        amount_cents: row.get(4)?,
        kind: row.get(5)?,
        transfer_account_id: row.get(6)?,
        import_id: row.get(7)?,
    })
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        name: row.get(1)?,
        account_type: row.get(2)?,
        institution: row.get(3)?,
    })
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

pub fn add_account(
    conn: &Connection,
    name: &str,
    account_type: AccountType,
    institution: Option<&str>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO accounts (name, account_type, institution) VALUES (?1, ?2, ?3)",
        rusqlite::params![name, account_type, institution],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn list_accounts(conn: &Connection) -> Result<Vec<Account>> {
    let mut stmt =
        conn.prepare("SELECT id, name, account_type, institution FROM accounts ORDER BY name")?;
    let rows = stmt
        .query_map([], account_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_account(conn: &Connection, id: i64) -> Result<Option<Account>> {
    let account = conn
        .query_row(
            "SELECT id, name, account_type, institution FROM accounts WHERE id = ?1",
            [id],
            account_from_row,
        )
        .optional()?;
    Ok(account)
}

pub fn find_account_by_name(conn: &Connection, name: &str) -> Result<Account> {
    conn.query_row(
        "SELECT id, name, account_type, institution FROM accounts WHERE name = ?1",
        [name],
        account_from_row,
    )
    .optional()?
    .ok_or_else(|| BudgieError::UnknownAccount(name.to_string()))
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

/// Inserts a transaction as `normal`. Callers notify the ingestion port
/// afterwards; nothing here triggers matching.
pub fn insert_transaction(conn: &Connection, txn: &NewTransaction) -> Result<i64> {
    conn.execute(
        "INSERT INTO transactions (account_id, date, description, amount_cents, kind, import_id) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            txn.account_id,
            txn.date,
            txn.description,
            txn.amount_cents,
            TransactionKind::Normal,
            txn.import_id,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_transaction(conn: &Connection, id: i64) -> Result<Option<Transaction>> {
    let txn = conn
        .query_row(
            &format!("SELECT {TXN_COLUMNS} FROM transactions WHERE id = ?1"),
            [id],
            transaction_from_row,
        )
        .optional()?;
    Ok(txn)
}

pub fn require_transaction(conn: &Connection, id: i64) -> Result<Transaction> {
    get_transaction(conn, id)?
        .ok_or_else(|| BudgieError::NotFound(format!("transaction {id}")))
}

pub fn list_transactions(conn: &Connection, account_id: Option<i64>) -> Result<Vec<Transaction>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TXN_COLUMNS} FROM transactions \
         WHERE ?1 IS NULL OR account_id = ?1 ORDER BY date, id"
    ))?;
    let rows = stmt
        .query_map([account_id], transaction_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Deletes a `normal` transaction. A linked transfer leg is refused so its
/// counterpart never points at a missing partner.
pub fn delete_transaction(conn: &Connection, id: i64) -> Result<()> {
    let deleted = conn.execute(
        "DELETE FROM transactions WHERE id = ?1 AND kind = 'normal'",
        [id],
    )?;
    if deleted == 0 {
        require_transaction(conn, id)?;
        return Err(BudgieError::InvalidState(format!(
            "transaction {id} is linked as a transfer and cannot be deleted"
        )));
    }
    Ok(())
}

/// Promotes a `normal` transaction to `transfer`. Returns `false` when the
/// row was not `normal` anymore, leaving it untouched.
pub fn mark_transfer(conn: &Connection, id: i64, counterpart_account_id: i64) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE transactions SET kind = 'transfer', transfer_account_id = ?1 \
         WHERE id = ?2 AND kind = 'normal'",
        rusqlite::params![counterpart_account_id, id],
    )?;
    Ok(updated == 1)
}
