use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row};
use serde::Serialize;

use crate::error::{BudgieError, Result};
use crate::models::{
    Account, Confidence, SuggestionStatus, Transaction, TransferMatchSuggestion,
};
use crate::scorer::MatchScore;
use crate::store::{get_account, require_transaction};

const SUGGESTION_COLUMNS: &str = "id, transaction_a_id, transaction_b_id, confidence, score, \
     is_credit_payment, status, created_at, reviewed_at";

/// Orders a pair of transaction ids so `(x, y)` and `(y, x)` share one key.
pub fn canonical_pair(x: i64, y: i64) -> (i64, i64) {
    if x <= y {
        (x, y)
    } else {
        (y, x)
    }
}

fn suggestion_from_row(row: &Row<'_>) -> rusqlite::Result<TransferMatchSuggestion> {
    Ok(TransferMatchSuggestion {
        id: row.get(0)?,
        transaction_a_id: row.get(1)?,
        transaction_b_id: row.get(2)?,
        confidence: row.get(3)?,
        score: row.get(4)?,
        is_credit_payment: row.get(5)?,
        status: row.get(6)?,
        created_at: row.get(7)?,
        reviewed_at: row.get(8)?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::ConstraintViolation
                && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Inserts a pending suggestion for the pair. Returns `None` when the
/// canonical pair already has a row; the unique constraint decides, so two
/// racing importers both succeed and only one row survives.
pub fn insert_pending(
    conn: &Connection,
    txn_x: i64,
    txn_y: i64,
    score: MatchScore,
    now: DateTime<Utc>,
) -> Result<Option<i64>> {
    let (a, b) = canonical_pair(txn_x, txn_y);
    let inserted = conn.execute(
        "INSERT INTO transfer_match_suggestions \
         (transaction_a_id, transaction_b_id, confidence, score, is_credit_payment, status, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            a,
            b,
            score.confidence(),
            score.score,
            score.is_credit_payment,
            SuggestionStatus::Pending,
            now,
        ],
    );
    match inserted {
        Ok(_) => Ok(Some(conn.last_insert_rowid())),
        Err(e) if is_unique_violation(&e) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_suggestion(conn: &Connection, id: i64) -> Result<Option<TransferMatchSuggestion>> {
    let suggestion = conn
        .query_row(
            &format!("SELECT {SUGGESTION_COLUMNS} FROM transfer_match_suggestions WHERE id = ?1"),
            [id],
            suggestion_from_row,
        )
        .optional()?;
    Ok(suggestion)
}

pub fn require_suggestion(conn: &Connection, id: i64) -> Result<TransferMatchSuggestion> {
    get_suggestion(conn, id)?.ok_or_else(|| BudgieError::NotFound(format!("suggestion {id}")))
}

pub fn find_by_pair(
    conn: &Connection,
    txn_x: i64,
    txn_y: i64,
) -> Result<Option<TransferMatchSuggestion>> {
    let (a, b) = canonical_pair(txn_x, txn_y);
    let suggestion = conn
        .query_row(
            &format!(
                "SELECT {SUGGESTION_COLUMNS} FROM transfer_match_suggestions \
                 WHERE transaction_a_id = ?1 AND transaction_b_id = ?2"
            ),
            [a, b],
            suggestion_from_row,
        )
        .optional()?;
    Ok(suggestion)
}

/// Newest first, optionally restricted to one status.
pub fn list_suggestions(
    conn: &Connection,
    status: Option<SuggestionStatus>,
) -> Result<Vec<TransferMatchSuggestion>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SUGGESTION_COLUMNS} FROM transfer_match_suggestions \
         WHERE ?1 IS NULL OR status = ?1 ORDER BY created_at DESC, id DESC"
    ))?;
    let rows = stmt
        .query_map([status], suggestion_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Moves a suggestion out of `pending`. The update is guarded on the current
/// status, so of two concurrent reviewers exactly one wins; the other gets
/// `InvalidState`.
pub fn transition_from_pending(
    conn: &Connection,
    id: i64,
    to: SuggestionStatus,
    now: DateTime<Utc>,
) -> Result<()> {
    let target = match to {
        SuggestionStatus::Accepted | SuggestionStatus::Rejected => to,
        SuggestionStatus::Pending => {
            return Err(BudgieError::InvalidState(format!(
                "suggestion {id} cannot be moved back to pending"
            )))
        }
    };
    let updated = conn.execute(
        "UPDATE transfer_match_suggestions SET status = ?1, reviewed_at = ?2 \
         WHERE id = ?3 AND status = ?4",
        rusqlite::params![target, now, id, SuggestionStatus::Pending],
    )?;
    if updated == 1 {
        return Ok(());
    }
    let current = require_suggestion(conn, id)?;
    Err(BudgieError::InvalidState(format!(
        "suggestion {id} is already {}",
        current.status
    )))
}

/// Deletes every pending suggestion that references one of `txn_ids`,
/// except `keep`. Returns how many rows went away.
pub fn delete_pending_touching(conn: &Connection, txn_ids: &[i64], keep: Option<i64>) -> Result<usize> {
    let mut stmt = conn.prepare_cached(
        "DELETE FROM transfer_match_suggestions \
         WHERE status = 'pending' \
           AND (transaction_a_id = ?1 OR transaction_b_id = ?1) \
           AND (?2 IS NULL OR id != ?2)",
    )?;
    let mut deleted = 0;
    for txn_id in txn_ids {
        deleted += stmt.execute(rusqlite::params![txn_id, keep])?;
    }
    Ok(deleted)
}

pub fn count_by_status(conn: &Connection) -> Result<Vec<(SuggestionStatus, i64)>> {
    let mut counts = Vec::with_capacity(SuggestionStatus::ALL.len());
    for status in SuggestionStatus::ALL {
        let n: i64 = conn.query_row(
            "SELECT count(*) FROM transfer_match_suggestions WHERE status = ?1",
            [status],
            |r| r.get(0),
        )?;
        counts.push((*status, n));
    }
    Ok(counts)
}

// ---------------------------------------------------------------------------
// Enriched view for listing and review
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct SuggestionSide {
    pub transaction: Transaction,
    pub account: Account,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuggestionDetail {
    #[serde(flatten)]
    pub suggestion: TransferMatchSuggestion,
    pub side_a: SuggestionSide,
    pub side_b: SuggestionSide,
}

impl SuggestionDetail {
    pub fn confidence(&self) -> Confidence {
        self.suggestion.confidence
    }
}

fn load_side(conn: &Connection, txn_id: i64) -> Result<SuggestionSide> {
    let transaction = require_transaction(conn, txn_id)?;
    let account = get_account(conn, transaction.account_id)?.ok_or_else(|| {
        BudgieError::NotFound(format!("account {}", transaction.account_id))
    })?;
    Ok(SuggestionSide {
        transaction,
        account,
    })
}

pub fn load_detail(conn: &Connection, suggestion: TransferMatchSuggestion) -> Result<SuggestionDetail> {
    let side_a = load_side(conn, suggestion.transaction_a_id)?;
    let side_b = load_side(conn, suggestion.transaction_b_id)?;
    Ok(SuggestionDetail {
        suggestion,
        side_a,
        side_b,
    })
}

pub fn list_details(conn: &Connection, status: Option<SuggestionStatus>) -> Result<Vec<SuggestionDetail>> {
    list_suggestions(conn, status)?
        .into_iter()
        .map(|s| load_detail(conn, s))
        .collect()
}
