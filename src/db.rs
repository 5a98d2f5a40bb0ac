use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS accounts (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    account_type TEXT NOT NULL CHECK (account_type IN ('checking', 'savings', 'cash', 'credit')),
    institution TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS imports (
    id INTEGER PRIMARY KEY,
    account_id INTEGER NOT NULL REFERENCES accounts(id),
    filename TEXT NOT NULL,
    checksum TEXT NOT NULL,
    row_count INTEGER NOT NULL,
    first_date TEXT,
    last_date TEXT,
    imported_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (account_id, checksum)
);

CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY,
    account_id INTEGER NOT NULL REFERENCES accounts(id),
    date TEXT NOT NULL,
    description TEXT NOT NULL,
    amount_cents INTEGER NOT NULL,
    kind TEXT NOT NULL DEFAULT 'normal' CHECK (kind IN ('normal', 'transfer')),
    transfer_account_id INTEGER REFERENCES accounts(id),
    import_id INTEGER REFERENCES imports(id),
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    CHECK ((kind = 'normal' AND transfer_account_id IS NULL)
        OR (kind = 'transfer' AND transfer_account_id IS NOT NULL))
);

CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(date);
CREATE INDEX IF NOT EXISTS idx_transactions_account ON transactions(account_id);

CREATE TABLE IF NOT EXISTS transfer_match_suggestions (
    id INTEGER PRIMARY KEY,
    transaction_a_id INTEGER NOT NULL,
    transaction_b_id INTEGER NOT NULL,
    confidence TEXT NOT NULL CHECK (confidence IN ('low', 'medium', 'high')),
    score INTEGER NOT NULL,
    is_credit_payment INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'accepted', 'rejected')),
    created_at TEXT NOT NULL,
    reviewed_at TEXT,
    CHECK (transaction_a_id < transaction_b_id),
    UNIQUE (transaction_a_id, transaction_b_id),
    FOREIGN KEY (transaction_a_id) REFERENCES transactions(id) ON DELETE CASCADE,
    FOREIGN KEY (transaction_b_id) REFERENCES transactions(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_suggestions_b ON transfer_match_suggestions(transaction_b_id);
CREATE INDEX IF NOT EXISTS idx_suggestions_status ON transfer_match_suggestions(status);
";

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    let _mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |r| r.get(0))?;
    conn.pragma_update(None, "foreign_keys", true)?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}
