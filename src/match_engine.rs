use std::collections::HashMap;

use chrono::Utc;
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::candidates::find_candidates;
use crate::error::{BudgieError, Result};
use crate::models::AccountType;
use crate::scorer::Scorer;
use crate::settings::MatchSettings;
use crate::store::{get_account, list_transactions, require_transaction};
use crate::suggestions::{find_by_pair, insert_pending};

/// Port through which ingestion collaborators (importer, manual entry)
/// announce a transaction that has already been durably written.
///
/// Implementations must not fail the caller: the transaction is committed
/// by the time this runs.
pub trait IngestionListener {
    fn on_transaction_ingested(&self, conn: &Connection, transaction_id: i64) -> MatchReport;
}

/// Listener that ignores every transaction, for imports with matching off.
pub struct NoMatching;

impl IngestionListener for NoMatching {
    fn on_transaction_ingested(&self, _conn: &Connection, _transaction_id: i64) -> MatchReport {
        MatchReport::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchReport {
    pub candidates: usize,
    /// Ids of suggestions created by this run.
    pub created: Vec<i64>,
    /// Candidates whose pair already had a suggestion when we tried to insert.
    pub already_suggested: usize,
}

impl MatchReport {
    fn absorb(&mut self, other: MatchReport) {
        self.candidates += other.candidates;
        self.created.extend(other.created);
        self.already_suggested += other.already_suggested;
    }
}

pub struct MatchEngine {
    scorer: Scorer,
}

impl Default for MatchEngine {
    fn default() -> Self {
        Self::new(Scorer::default())
    }
}

impl MatchEngine {
    pub fn new(scorer: Scorer) -> Self {
        Self { scorer }
    }

    pub fn from_settings(settings: &MatchSettings) -> Result<Self> {
        let scorer = Scorer::new(&settings.transfer_keywords, &settings.payment_keywords)?;
        Ok(Self::new(scorer))
    }

    /// Scores every counterpart candidate of `transaction_id` and records a
    /// pending suggestion for each one worth reviewing. Safe to call any
    /// number of times for the same transaction.
    #[tracing::instrument(skip(self, conn))]
    pub fn match_transaction(&self, conn: &Connection, transaction_id: i64) -> Result<MatchReport> {
        let txn = require_transaction(conn, transaction_id)?;
        if txn.is_transfer() {
            debug!("already linked, skipping");
            return Ok(MatchReport::default());
        }

        let mut account_types: HashMap<i64, AccountType> = HashMap::new();
        let txn_type = account_type(conn, &mut account_types, txn.account_id)?;

        let candidates = find_candidates(conn, &txn)?;
        let mut report = MatchReport {
            candidates: candidates.len(),
            ..Default::default()
        };
        let now = Utc::now();

        for candidate in &candidates {
            let candidate_type = account_type(conn, &mut account_types, candidate.account_id)?;
            let score = self.scorer.score(&txn, candidate, txn_type, candidate_type);
            debug!(
                candidate = candidate.id,
                score = score.score,
                credit_payment = score.is_credit_payment,
                "scored candidate"
            );
            if !score.is_suggestion_worthy() {
                continue;
            }
            match insert_pending(conn, txn.id, candidate.id, score, now)? {
                Some(id) => {
                    info!(
                        suggestion = id,
                        counterpart = candidate.id,
                        confidence = %score.confidence(),
                        "transfer suggestion created"
                    );
                    report.created.push(id);
                }
                None => {
                    if let Some(existing) = find_by_pair(conn, txn.id, candidate.id)? {
                        debug!(
                            suggestion = existing.id,
                            status = %existing.status,
                            "pair already suggested"
                        );
                    }
                    report.already_suggested += 1;
                }
            }
        }
        Ok(report)
    }

    /// Runs matching for every `normal` transaction, oldest first.
    pub fn rematch_all(&self, conn: &Connection) -> Result<MatchReport> {
        let mut total = MatchReport::default();
        for txn in list_transactions(conn, None)? {
            if txn.is_transfer() {
                continue;
            }
            total.absorb(self.match_transaction(conn, txn.id)?);
        }
        Ok(total)
    }
}

impl IngestionListener for MatchEngine {
    fn on_transaction_ingested(&self, conn: &Connection, transaction_id: i64) -> MatchReport {
        match self.match_transaction(conn, transaction_id) {
            Ok(report) => report,
            Err(e) => {
                warn!(transaction = transaction_id, error = %e, "transfer matching failed");
                MatchReport::default()
            }
        }
    }
}

fn account_type(
    conn: &Connection,
    cache: &mut HashMap<i64, AccountType>,
    account_id: i64,
) -> Result<AccountType> {
    if let Some(t) = cache.get(&account_id) {
        return Ok(*t);
    }
    let account = get_account(conn, account_id)?
        .ok_or_else(|| BudgieError::NotFound(format!("account {account_id}")))?;
    cache.insert(account_id, account.account_type);
    Ok(account.account_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::{add_account, add_txn, test_db};
    use crate::models::{Confidence, SuggestionStatus};
    use crate::suggestions::list_suggestions;

    fn count(conn: &Connection) -> i64 {
        conn.query_row("SELECT count(*) FROM transfer_match_suggestions", [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn test_second_leg_triggers_suggestion() {
        let (_dir, conn) = test_db();
        let engine = MatchEngine::default();
        let checking = add_account(&conn, "Checking", "checking");
        let savings = add_account(&conn, "Savings", "savings");

        let out = add_txn(&conn, checking, "2025-01-15", "Transfer to savings", -100_000);
        let first = engine.on_transaction_ingested(&conn, out);
        assert!(first.created.is_empty());

        let inflow = add_txn(&conn, savings, "2025-01-15", "Transfer received", 100_000);
        let second = engine.on_transaction_ingested(&conn, inflow);
        assert_eq!(second.created.len(), 1);

        let s = find_by_pair(&conn, out, inflow).unwrap().unwrap();
        assert_eq!(s.status, SuggestionStatus::Pending);
        assert_eq!(s.confidence, Confidence::High);
        assert!(s.score >= 18);
        assert!(!s.is_credit_payment);
    }

    #[test]
    fn test_out_of_order_arrival_matches_the_same() {
        let (_dir, conn) = test_db();
        let engine = MatchEngine::default();
        let checking = add_account(&conn, "Checking", "checking");
        let card = add_account(&conn, "Visa", "credit");

        // Card side arrives first, days before the bank file.
        let card_leg = add_txn(&conn, card, "2025-02-03", "PAYMENT THANK YOU", 45_000);
        engine.on_transaction_ingested(&conn, card_leg);
        let bank_leg = add_txn(&conn, checking, "2025-02-01", "VISA AUTOPAY", -45_000);
        engine.on_transaction_ingested(&conn, bank_leg);

        let s = find_by_pair(&conn, card_leg, bank_leg).unwrap().unwrap();
        // 2 days + payment + round + credit
        assert_eq!(s.score, 2 + 3 + 3 + 5);
        assert!(s.is_credit_payment);
        assert_eq!(s.confidence, Confidence::Medium);
    }

    #[test]
    fn test_rerunning_never_duplicates() {
        let (_dir, conn) = test_db();
        let engine = MatchEngine::default();
        let checking = add_account(&conn, "Checking", "checking");
        let savings = add_account(&conn, "Savings", "savings");
        let out = add_txn(&conn, checking, "2025-01-15", "Transfer", -5_000);
        let inflow = add_txn(&conn, savings, "2025-01-16", "Transfer", 5_000);

        engine.on_transaction_ingested(&conn, out);
        engine.on_transaction_ingested(&conn, inflow);
        engine.on_transaction_ingested(&conn, out);
        let rerun = engine.rematch_all(&conn).unwrap();
        assert!(rerun.created.is_empty());
        assert_eq!(count(&conn), 1);
    }

    #[test]
    fn test_unique_constraint_is_the_idempotency_signal() {
        let (_dir, conn) = test_db();
        let engine = MatchEngine::default();
        let checking = add_account(&conn, "Checking", "checking");
        let savings = add_account(&conn, "Savings", "savings");
        let out = add_txn(&conn, checking, "2025-01-15", "Transfer", -5_000);
        let inflow = add_txn(&conn, savings, "2025-01-15", "Transfer", 5_000);

        // Simulate a racing importer that wrote the row between our
        // candidate query and our insert: the insert must be swallowed.
        let score = crate::scorer::MatchScore {
            score: 15,
            is_credit_payment: false,
        };
        insert_pending(&conn, out, inflow, score, Utc::now()).unwrap();
        assert_eq!(insert_pending(&conn, inflow, out, score, Utc::now()).unwrap(), None);
        assert!(engine.match_transaction(&conn, inflow).unwrap().created.is_empty());
        assert_eq!(count(&conn), 1);
    }

    #[test]
    fn test_more_than_three_days_never_suggested() {
        let (_dir, conn) = test_db();
        let engine = MatchEngine::default();
        let checking = add_account(&conn, "Checking", "checking");
        let card = add_account(&conn, "Visa", "credit");
        add_txn(&conn, checking, "2025-01-10", "Transfer payment autopay", -100_000);
        add_txn(&conn, card, "2025-01-14", "Transfer payment autopay", 100_000);

        engine.rematch_all(&conn).unwrap();
        assert_eq!(count(&conn), 0);
    }

    #[test]
    fn test_every_candidate_in_window_gets_a_suggestion() {
        let (_dir, conn) = test_db();
        let engine = MatchEngine::default();
        let checking = add_account(&conn, "Checking", "checking");
        let savings = add_account(&conn, "Savings", "savings");
        let brokerage = add_account(&conn, "Cash Box", "cash");
        add_txn(&conn, savings, "2025-01-15", "Deposit", 2_500);
        add_txn(&conn, brokerage, "2025-01-17", "Deposit", 2_500);
        let out = add_txn(&conn, checking, "2025-01-15", "Withdrawal", -2_500);

        let report = engine.on_transaction_ingested(&conn, out);
        assert_eq!(report.candidates, 2);
        assert_eq!(report.created.len(), 2);
        let pending = list_suggestions(&conn, Some(SuggestionStatus::Pending)).unwrap();
        let mut confidences: Vec<_> = pending.iter().map(|s| s.confidence).collect();
        confidences.sort();
        assert_eq!(confidences, vec![Confidence::Low, Confidence::Medium]);
    }

    #[test]
    fn test_linked_transaction_is_skipped() {
        let (_dir, conn) = test_db();
        let engine = MatchEngine::default();
        let checking = add_account(&conn, "Checking", "checking");
        let savings = add_account(&conn, "Savings", "savings");
        let out = add_txn(&conn, checking, "2025-01-15", "Transfer", -5_000);
        add_txn(&conn, savings, "2025-01-15", "Transfer", 5_000);
        conn.execute(
            "UPDATE transactions SET kind = 'transfer', transfer_account_id = ?1 WHERE id = ?2",
            rusqlite::params![savings, out],
        )
        .unwrap();
        assert_eq!(engine.match_transaction(&conn, out).unwrap(), MatchReport::default());
    }

    #[test]
    fn test_ingestion_swallows_matching_failure() {
        let (_dir, conn) = test_db();
        let engine = MatchEngine::default();
        // Unknown id makes matching fail; the port still returns normally.
        let report = engine.on_transaction_ingested(&conn, 404);
        assert_eq!(report, MatchReport::default());
        assert!(matches!(
            engine.match_transaction(&conn, 404),
            Err(BudgieError::NotFound(_))
        ));
    }

    #[test]
    fn test_storage_failure_during_matching_is_isolated() {
        let (_dir, conn) = test_db();
        let engine = MatchEngine::default();
        let checking = add_account(&conn, "Checking", "checking");
        let savings = add_account(&conn, "Savings", "savings");
        add_txn(&conn, savings, "2025-01-15", "Transfer", 5_000);
        let out = add_txn(&conn, checking, "2025-01-15", "Transfer", -5_000);
        conn.execute_batch(
            "CREATE TRIGGER block_suggestions BEFORE INSERT ON transfer_match_suggestions \
             BEGIN SELECT RAISE(ABORT, 'disk on fire'); END;",
        )
        .unwrap();

        assert!(matches!(engine.match_transaction(&conn, out), Err(BudgieError::Db(_))));
        assert_eq!(engine.on_transaction_ingested(&conn, out), MatchReport::default());
        // The ingested transaction itself is untouched.
        assert!(crate::store::get_transaction(&conn, out).unwrap().is_some());
    }

    #[test]
    fn test_no_matching_listener() {
        let (_dir, conn) = test_db();
        assert_eq!(NoMatching.on_transaction_ingested(&conn, 1), MatchReport::default());
    }
}
