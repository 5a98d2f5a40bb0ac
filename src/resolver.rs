use chrono::Utc;
use rusqlite::{Connection, TransactionBehavior};
use tracing::info;

use crate::error::{BudgieError, Result};
use crate::models::{SuggestionStatus, Transaction, TransferMatchSuggestion};
use crate::store::{mark_transfer, require_transaction};
use crate::suggestions::{delete_pending_touching, require_suggestion, transition_from_pending};

/// Both legs of a transfer after linking.
#[derive(Debug, Clone)]
pub struct LinkOutcome {
    pub transaction_a: Transaction,
    pub transaction_b: Transaction,
    /// Pending suggestions dropped because they referenced a linked leg.
    pub removed_suggestions: usize,
}

/// Write transactions take the lock up front so two reviewers serialize on
/// the status check instead of failing mid-way with `SQLITE_BUSY`.
fn begin(conn: &Connection) -> Result<rusqlite::Transaction<'_>> {
    Ok(rusqlite::Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?)
}

/// Promotes both transactions to `transfer`, each pointing at the other's
/// account. Must run inside a transaction owned by the caller.
fn link_pair(conn: &Connection, a_id: i64, b_id: i64) -> Result<(Transaction, Transaction)> {
    let a = require_transaction(conn, a_id)?;
    let b = require_transaction(conn, b_id)?;

    if a.id == b.id {
        return Err(BudgieError::InvalidRequest(
            "cannot link a transaction to itself".into(),
        ));
    }
    if a.account_id == b.account_id {
        return Err(BudgieError::InvalidRequest(format!(
            "transactions {} and {} belong to the same account",
            a.id, b.id
        )));
    }
    for txn in [&a, &b] {
        if txn.is_transfer() {
            return Err(BudgieError::InvalidState(format!(
                "transaction {} is already linked as a transfer",
                txn.id
            )));
        }
    }

    if !mark_transfer(conn, a.id, b.account_id)? || !mark_transfer(conn, b.id, a.account_id)? {
        return Err(BudgieError::InvalidState(
            "transaction changed while linking".into(),
        ));
    }

    Ok((require_transaction(conn, a.id)?, require_transaction(conn, b.id)?))
}

pub fn accept(conn: &Connection, suggestion_id: i64) -> Result<LinkOutcome> {
    let tx = begin(conn)?;
    let suggestion = require_suggestion(&tx, suggestion_id)?;
    transition_from_pending(&tx, suggestion_id, SuggestionStatus::Accepted, Utc::now())?;
    let (a, b) = link_pair(&tx, suggestion.transaction_a_id, suggestion.transaction_b_id)?;
    let removed = delete_pending_touching(&tx, &[a.id, b.id], Some(suggestion_id))?;
    tx.commit()?;

    info!(
        suggestion = suggestion_id,
        transaction_a = a.id,
        transaction_b = b.id,
        removed,
        "transfer suggestion accepted"
    );
    Ok(LinkOutcome {
        transaction_a: a,
        transaction_b: b,
        removed_suggestions: removed,
    })
}

pub fn reject(conn: &Connection, suggestion_id: i64) -> Result<TransferMatchSuggestion> {
    let tx = begin(conn)?;
    transition_from_pending(&tx, suggestion_id, SuggestionStatus::Rejected, Utc::now())?;
    let suggestion = require_suggestion(&tx, suggestion_id)?;
    tx.commit()?;

    info!(suggestion = suggestion_id, "transfer suggestion rejected");
    Ok(suggestion)
}

/// Links two transactions chosen by the caller, with no suggestion needed.
pub fn manual_link(conn: &Connection, transaction_a_id: i64, transaction_b_id: i64) -> Result<LinkOutcome> {
    let tx = begin(conn)?;
    let (a, b) = link_pair(&tx, transaction_a_id, transaction_b_id)?;
    let removed = delete_pending_touching(&tx, &[a.id, b.id], None)?;
    tx.commit()?;

    info!(transaction_a = a.id, transaction_b = b.id, removed, "transactions linked manually");
    Ok(LinkOutcome {
        transaction_a: a,
        transaction_b: b,
        removed_suggestions: removed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::get_connection;
    use crate::db::tests::{add_account, add_txn, test_db};
    use crate::models::TransactionKind;
    use crate::scorer::MatchScore;
    use crate::suggestions::{get_suggestion, insert_pending};

    fn suggest(conn: &Connection, x: i64, y: i64) -> i64 {
        let score = MatchScore {
            score: 15,
            is_credit_payment: false,
        };
        insert_pending(conn, x, y, score, Utc::now()).unwrap().unwrap()
    }

    fn kind(conn: &Connection, id: i64) -> (TransactionKind, Option<i64>) {
        let t = require_transaction(conn, id).unwrap();
        (t.kind, t.transfer_account_id)
    }

    struct Fixture {
        checking: i64,
        savings: i64,
        t: i64,
        t_prime: i64,
    }

    fn fixture(conn: &Connection) -> Fixture {
        let checking = add_account(conn, "Checking", "checking");
        let savings = add_account(conn, "Savings", "savings");
        let t = add_txn(conn, checking, "2025-01-15", "Transfer to savings", -100_000);
        let t_prime = add_txn(conn, savings, "2025-01-15", "Transfer received", 100_000);
        Fixture {
            checking,
            savings,
            t,
            t_prime,
        }
    }

    #[test]
    fn test_accept_links_both_sides() {
        let (_dir, conn) = test_db();
        let f = fixture(&conn);
        let s = suggest(&conn, f.t, f.t_prime);

        let outcome = accept(&conn, s).unwrap();
        assert_eq!(outcome.removed_suggestions, 0);
        assert_eq!(kind(&conn, f.t), (TransactionKind::Transfer, Some(f.savings)));
        assert_eq!(kind(&conn, f.t_prime), (TransactionKind::Transfer, Some(f.checking)));

        let s = get_suggestion(&conn, s).unwrap().unwrap();
        assert_eq!(s.status, SuggestionStatus::Accepted);
        assert!(s.reviewed_at.is_some());
    }

    #[test]
    fn test_accept_twice_is_invalid_state_without_mutation() {
        let (_dir, conn) = test_db();
        let f = fixture(&conn);
        let s = suggest(&conn, f.t, f.t_prime);
        accept(&conn, s).unwrap();
        let reviewed_at = get_suggestion(&conn, s).unwrap().unwrap().reviewed_at;

        assert!(matches!(accept(&conn, s), Err(BudgieError::InvalidState(_))));
        assert!(matches!(reject(&conn, s), Err(BudgieError::InvalidState(_))));
        let after = get_suggestion(&conn, s).unwrap().unwrap();
        assert_eq!(after.status, SuggestionStatus::Accepted);
        assert_eq!(after.reviewed_at, reviewed_at);
    }

    #[test]
    fn test_accept_rejected_is_invalid_state() {
        let (_dir, conn) = test_db();
        let f = fixture(&conn);
        let s = suggest(&conn, f.t, f.t_prime);
        reject(&conn, s).unwrap();

        assert!(matches!(accept(&conn, s), Err(BudgieError::InvalidState(_))));
        assert_eq!(kind(&conn, f.t), (TransactionKind::Normal, None));
        assert_eq!(kind(&conn, f.t_prime), (TransactionKind::Normal, None));
    }

    #[test]
    fn test_missing_suggestion_is_not_found() {
        let (_dir, conn) = test_db();
        assert!(matches!(accept(&conn, 5), Err(BudgieError::NotFound(_))));
        assert!(matches!(reject(&conn, 5), Err(BudgieError::NotFound(_))));
    }

    #[test]
    fn test_reject_leaves_transactions_and_others_alone() {
        let (_dir, conn) = test_db();
        let f = fixture(&conn);
        let other = add_txn(&conn, f.savings, "2025-01-16", "Deposit", 100_000);
        let s1 = suggest(&conn, f.t, f.t_prime);
        let s2 = suggest(&conn, f.t, other);

        let rejected = reject(&conn, s1).unwrap();
        assert_eq!(rejected.status, SuggestionStatus::Rejected);
        assert!(rejected.reviewed_at.is_some());
        assert_eq!(kind(&conn, f.t), (TransactionKind::Normal, None));
        assert_eq!(
            get_suggestion(&conn, s2).unwrap().unwrap().status,
            SuggestionStatus::Pending
        );

        // A rejection does not block accepting a rival suggestion.
        accept(&conn, s2).unwrap();
        assert_eq!(kind(&conn, f.t), (TransactionKind::Transfer, Some(f.savings)));
        assert_eq!(
            get_suggestion(&conn, s1).unwrap().unwrap().status,
            SuggestionStatus::Rejected
        );
    }

    #[test]
    fn test_accept_deletes_conflicting_pending_suggestions() {
        let (_dir, conn) = test_db();
        let f = fixture(&conn);
        let cash = add_account(&conn, "Cash", "cash");
        let card = add_account(&conn, "Visa", "credit");
        let t2 = add_txn(&conn, cash, "2025-01-15", "ATM deposit", 100_000);
        let t3 = add_txn(&conn, card, "2025-01-15", "Refund", -100_000);
        let u1 = add_txn(&conn, cash, "2025-01-20", "Unrelated out", -2_000);
        let u2 = add_txn(&conn, card, "2025-01-20", "Unrelated in", 2_000);

        let s1 = suggest(&conn, f.t, f.t_prime);
        let s2 = suggest(&conn, f.t, t2);
        let s3 = suggest(&conn, f.t_prime, t3);
        let s4 = suggest(&conn, u1, u2);

        let outcome = accept(&conn, s1).unwrap();
        assert_eq!(outcome.removed_suggestions, 2);
        assert!(get_suggestion(&conn, s2).unwrap().is_none());
        assert!(get_suggestion(&conn, s3).unwrap().is_none());
        assert_eq!(
            get_suggestion(&conn, s4).unwrap().unwrap().status,
            SuggestionStatus::Pending
        );
        assert_eq!(
            get_suggestion(&conn, s1).unwrap().unwrap().status,
            SuggestionStatus::Accepted
        );
    }

    #[test]
    fn test_accept_keeps_reviewed_conflicts() {
        let (_dir, conn) = test_db();
        let f = fixture(&conn);
        let other = add_txn(&conn, f.savings, "2025-01-16", "Deposit", 100_000);
        let s1 = suggest(&conn, f.t, f.t_prime);
        let s2 = suggest(&conn, f.t, other);
        reject(&conn, s2).unwrap();

        assert_eq!(accept(&conn, s1).unwrap().removed_suggestions, 0);
        assert!(get_suggestion(&conn, s2).unwrap().is_some());
    }

    #[test]
    fn test_accept_is_atomic_under_injected_failure() {
        let (_dir, conn) = test_db();
        let f = fixture(&conn);
        let other = add_txn(&conn, f.savings, "2025-01-16", "Deposit", 100_000);
        let s1 = suggest(&conn, f.t, f.t_prime);
        let s2 = suggest(&conn, f.t, other);
        // The second leg's update fails after the first leg was written.
        conn.execute_batch(&format!(
            "CREATE TRIGGER fail_second_leg BEFORE UPDATE ON transactions WHEN NEW.id = {} \
             BEGIN SELECT RAISE(ABORT, 'injected failure'); END;",
            f.t_prime
        ))
        .unwrap();

        assert!(matches!(accept(&conn, s1), Err(BudgieError::Db(_))));
        assert_eq!(kind(&conn, f.t), (TransactionKind::Normal, None));
        assert_eq!(kind(&conn, f.t_prime), (TransactionKind::Normal, None));
        assert_eq!(
            get_suggestion(&conn, s1).unwrap().unwrap().status,
            SuggestionStatus::Pending
        );
        assert!(get_suggestion(&conn, s2).unwrap().is_some());

        conn.execute_batch("DROP TRIGGER fail_second_leg;").unwrap();
        accept(&conn, s1).unwrap();
        assert_eq!(kind(&conn, f.t_prime), (TransactionKind::Transfer, Some(f.checking)));
    }

    #[test]
    fn test_accept_when_leg_already_linked_elsewhere() {
        let (_dir, conn) = test_db();
        let f = fixture(&conn);
        let cash = add_account(&conn, "Cash", "cash");
        let t2 = add_txn(&conn, cash, "2025-01-15", "ATM deposit", 100_000);
        let s1 = suggest(&conn, f.t, f.t_prime);
        // Linked behind the resolver's back, so the suggestion survived.
        conn.execute(
            "UPDATE transactions SET kind = 'transfer', transfer_account_id = ?1 WHERE id = ?2",
            rusqlite::params![cash, f.t],
        )
        .unwrap();

        assert!(matches!(accept(&conn, s1), Err(BudgieError::InvalidState(_))));
        assert_eq!(
            get_suggestion(&conn, s1).unwrap().unwrap().status,
            SuggestionStatus::Pending
        );
        assert_eq!(kind(&conn, f.t_prime), (TransactionKind::Normal, None));
        assert_eq!(kind(&conn, t2), (TransactionKind::Normal, None));
    }

    #[test]
    fn test_manual_link() {
        let (_dir, conn) = test_db();
        let f = fixture(&conn);
        let cash = add_account(&conn, "Cash", "cash");
        let t2 = add_txn(&conn, cash, "2025-01-15", "ATM deposit", 100_000);
        let s1 = suggest(&conn, f.t, t2);
        let s2 = suggest(&conn, f.t, f.t_prime);
        reject(&conn, s2).unwrap();

        let outcome = manual_link(&conn, f.t_prime, f.t).unwrap();
        assert_eq!(outcome.transaction_a.id, f.t_prime);
        assert_eq!(outcome.removed_suggestions, 1);
        assert_eq!(kind(&conn, f.t), (TransactionKind::Transfer, Some(f.savings)));
        assert_eq!(kind(&conn, f.t_prime), (TransactionKind::Transfer, Some(f.checking)));
        assert!(get_suggestion(&conn, s1).unwrap().is_none());
        assert!(get_suggestion(&conn, s2).unwrap().is_some());
    }

    #[test]
    fn test_manual_link_rejections() {
        let (_dir, conn) = test_db();
        let f = fixture(&conn);
        let same_account = add_txn(&conn, f.checking, "2025-01-15", "Deposit", 100_000);

        assert!(matches!(manual_link(&conn, f.t, 999), Err(BudgieError::NotFound(_))));
        assert!(matches!(manual_link(&conn, 999, f.t), Err(BudgieError::NotFound(_))));
        assert!(matches!(manual_link(&conn, f.t, f.t), Err(BudgieError::InvalidRequest(_))));
        let err = manual_link(&conn, f.t, same_account).unwrap_err();
        assert!(matches!(err, BudgieError::InvalidRequest(_)));
        assert_eq!(err.status_code(), 400);

        manual_link(&conn, f.t, f.t_prime).unwrap();
        let cash = add_account(&conn, "Cash", "cash");
        let t2 = add_txn(&conn, cash, "2025-01-15", "ATM deposit", 100_000);
        let err = manual_link(&conn, f.t, t2).unwrap_err();
        assert!(matches!(err, BudgieError::InvalidState(_)));
        assert_eq!(kind(&conn, t2), (TransactionKind::Normal, None));
        assert_eq!(kind(&conn, f.t), (TransactionKind::Transfer, Some(f.savings)));
    }

    #[test]
    fn test_concurrent_accept_and_reject_have_one_winner() {
        use std::sync::{Arc, Barrier};
        use std::thread;

        for _ in 0..10 {
            let (dir, conn) = test_db();
            let f = fixture(&conn);
            let s = suggest(&conn, f.t, f.t_prime);
            let db_path = dir.path().join("test.db");
            let barrier = Arc::new(Barrier::new(2));

            let racers: Vec<_> = [true, false]
                .into_iter()
                .map(|accepting| {
                    let barrier = Arc::clone(&barrier);
                    let db_path = db_path.clone();
                    thread::spawn(move || {
                        let conn = get_connection(&db_path).unwrap();
                        barrier.wait();
                        if accepting {
                            accept(&conn, s).map(|_| ())
                        } else {
                            reject(&conn, s).map(|_| ())
                        }
                    })
                })
                .collect();
            let results: Vec<Result<()>> = racers.into_iter().map(|h| h.join().unwrap()).collect();

            assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
            let loser = results.into_iter().find_map(|r| r.err()).unwrap();
            assert!(matches!(loser, BudgieError::InvalidState(_)), "{loser}");

            let status = get_suggestion(&conn, s).unwrap().unwrap().status;
            let linked = status == SuggestionStatus::Accepted;
            assert!(linked || status == SuggestionStatus::Rejected);
            let expected = if linked { TransactionKind::Transfer } else { TransactionKind::Normal };
            assert_eq!(kind(&conn, f.t).0, expected);
            assert_eq!(kind(&conn, f.t_prime).0, expected);
        }
    }
}
