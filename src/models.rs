use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::Serialize;

use crate::error::BudgieError;

/// Closed set of text values stored in a single SQL column.
///
/// Decoding is strict: a value outside the set is a conversion error, never
/// a silent default.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = BudgieError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => {
                        let expected: Vec<&str> = $name::ALL.iter().map(|v| v.as_str()).collect();
                        Err(BudgieError::InvalidRequest(format!(
                            "unknown {} '{other}' (expected one of: {})",
                            stringify!($name),
                            expected.join(", ")
                        )))
                    }
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let s = value.as_str()?;
                s.parse().map_err(|e: BudgieError| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Checking,
    Savings,
    Cash,
    Credit,
}

text_enum!(AccountType {
    Checking => "checking",
    Savings => "savings",
    Cash => "cash",
    Credit => "credit",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Normal,
    Transfer,
}

text_enum!(TransactionKind {
    Normal => "normal",
    Transfer => "transfer",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

text_enum!(Confidence {
    Low => "low",
    Medium => "medium",
    High => "high",
});

impl Confidence {
    pub fn from_score(score: i64) -> Self {
        if score >= 15 {
            Confidence::High
        } else if score >= 10 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionStatus {
    Pending,
    Accepted,
    Rejected,
}

text_enum!(SuggestionStatus {
    Pending => "pending",
    Accepted => "accepted",
    Rejected => "rejected",
});

#[derive(Debug, Clone, Serialize)]
pub struct Account {
    pub id: i64,
    pub name: String,
    pub account_type: AccountType,
    pub institution: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Transaction {
    pub id: i64,
    pub account_id: i64,
    pub date: NaiveDate,
    pub description: String,
    pub amount_cents: i64,
    pub kind: TransactionKind,
    /// Counterpart account; `Some` exactly when `kind` is `Transfer`.
    pub transfer_account_id: Option<i64>,
    pub import_id: Option<i64>,
}

impl Transaction {
    pub fn is_transfer(&self) -> bool {
        self.kind == TransactionKind::Transfer
    }
}

/// A transaction as handed over by an ingestion collaborator, before insert.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub account_id: i64,
    pub date: NaiveDate,
    pub description: String,
    pub amount_cents: i64,
    pub import_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferMatchSuggestion {
    pub id: i64,
    pub transaction_a_id: i64,
    pub transaction_b_id: i64,
    pub confidence: Confidence,
    pub score: i64,
    pub is_credit_payment: bool,
    pub status: SuggestionStatus,
    pub created_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

/// Intermediate representation from a CSV parser before DB insert.
#[derive(Debug, Clone)]
pub struct ParsedRow {
    pub date: NaiveDate,
    pub description: String,
    pub amount_cents: i64,
}
