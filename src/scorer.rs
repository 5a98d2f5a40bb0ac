use regex::Regex;

use crate::error::{BudgieError, Result};
use crate::models::{AccountType, Confidence, Transaction};

pub const DEFAULT_TRANSFER_KEYWORDS: &[&str] = &["transfer", "xfer"];
pub const DEFAULT_PAYMENT_KEYWORDS: &[&str] = &["payment", "autopay", "pmt"];

/// Lowest score a candidate pair needs before it is worth a suggestion.
pub const MIN_SUGGESTION_SCORE: i64 = 1;

const SAME_DAY_POINTS: i64 = 10;
const ONE_DAY_POINTS: i64 = 5;
const NEAR_DAY_POINTS: i64 = 2;
const TRANSFER_KEYWORD_POINTS: i64 = 5;
const PAYMENT_KEYWORD_POINTS: i64 = 3;
const ROUND_AMOUNT_POINTS: i64 = 3;
const CREDIT_ACCOUNT_POINTS: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchScore {
    pub score: i64,
    pub is_credit_payment: bool,
}

impl MatchScore {
    pub fn confidence(&self) -> Confidence {
        Confidence::from_score(self.score)
    }

    pub fn is_suggestion_worthy(&self) -> bool {
        self.score >= MIN_SUGGESTION_SCORE
    }
}

/// Additive point schedule over a candidate pair. Pure: the same pair and
/// account types always produce the same score.
#[derive(Debug, Clone)]
pub struct Scorer {
    transfer: Option<Regex>,
    payment: Option<Regex>,
}

impl Default for Scorer {
    fn default() -> Self {
        Self {
            transfer: keyword_regex(DEFAULT_TRANSFER_KEYWORDS).ok().flatten(),
            payment: keyword_regex(DEFAULT_PAYMENT_KEYWORDS).ok().flatten(),
        }
    }
}

impl Scorer {
    pub fn new<S: AsRef<str>>(transfer_keywords: &[S], payment_keywords: &[S]) -> Result<Self> {
        Ok(Self {
            transfer: keyword_regex(transfer_keywords)?,
            payment: keyword_regex(payment_keywords)?,
        })
    }

    pub fn score(
        &self,
        txn: &Transaction,
        other: &Transaction,
        txn_account: AccountType,
        other_account: AccountType,
    ) -> MatchScore {
        let mut score = match (txn.date - other.date).num_days().abs() {
            0 => SAME_DAY_POINTS,
            1 => ONE_DAY_POINTS,
            2 | 3 => NEAR_DAY_POINTS,
            _ => 0,
        };

        if mentions(&self.transfer, txn, other) {
            score += TRANSFER_KEYWORD_POINTS;
        }
        if mentions(&self.payment, txn, other) {
            score += PAYMENT_KEYWORD_POINTS;
        }
        if is_round(txn.amount_cents) && is_round(other.amount_cents) {
            score += ROUND_AMOUNT_POINTS;
        }

        let is_credit_payment =
            (txn_account == AccountType::Credit) != (other_account == AccountType::Credit);
        if is_credit_payment {
            score += CREDIT_ACCOUNT_POINTS;
        }

        MatchScore {
            score,
            is_credit_payment,
        }
    }
}

fn keyword_regex<S: AsRef<str>>(keywords: &[S]) -> Result<Option<Regex>> {
    let alternatives: Vec<String> = keywords
        .iter()
        .map(|k| k.as_ref().trim())
        .filter(|k| !k.is_empty())
        .map(regex::escape)
        .collect();
    if alternatives.is_empty() {
        return Ok(None);
    }
    let pattern = format!("(?i){}", alternatives.join("|"));
    Regex::new(&pattern)
        .map(Some)
        .map_err(|e| BudgieError::Settings(format!("bad matching keyword: {e}")))
}

fn mentions(re: &Option<Regex>, a: &Transaction, b: &Transaction) -> bool {
    re.as_ref()
        .is_some_and(|re| re.is_match(&a.description) || re.is_match(&b.description))
}

fn is_round(cents: i64) -> bool {
    cents != 0 && cents % 100 == 0
}
