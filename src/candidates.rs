use chrono::Duration;
use rusqlite::Connection;

use crate::error::Result;
use crate::models::Transaction;
use crate::store::transaction_from_row;

/// Counterparts are searched this many calendar days either side, inclusive.
pub const DATE_WINDOW_DAYS: i64 = 3;

/// Finds `normal` transactions in other accounts that could be the other
/// leg of `txn`: opposite sign, within the date window, and not already
/// paired with `txn` by any suggestion. Closest dates come first.
pub fn find_candidates(conn: &Connection, txn: &Transaction) -> Result<Vec<Transaction>> {
    let sign = txn.amount_cents.signum();
    if sign == 0 {
        return Ok(Vec::new());
    }

    let from = txn.date - Duration::days(DATE_WINDOW_DAYS);
    let to = txn.date + Duration::days(DATE_WINDOW_DAYS);

    let mut stmt = conn.prepare_cached(
        "SELECT t.id, t.account_id, t.date, t.description, t.amount_cents, t.kind, \
                t.transfer_account_id, t.import_id \
         FROM transactions t \
         WHERE t.kind = 'normal' \
           AND t.account_id != ?1 \
           AND ((?2 > 0 AND t.amount_cents < 0) OR (?2 < 0 AND t.amount_cents > 0)) \
           AND t.date BETWEEN ?3 AND ?4 \
           AND NOT EXISTS ( \
               SELECT 1 FROM transfer_match_suggestions s \
               WHERE s.transaction_a_id = min(t.id, ?5) AND s.transaction_b_id = max(t.id, ?5)) \
         ORDER BY abs(julianday(t.date) - julianday(?6)), t.id",
    )?;
    let rows = stmt
        .query_map(
            rusqlite::params![txn.account_id, sign, from, to, txn.id, txn.date],
            transaction_from_row,
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
