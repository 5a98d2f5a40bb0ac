use std::path::Path;

use chrono::NaiveDate;
use csv::StringRecord;
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{BudgieError, Result};
use crate::match_engine::IngestionListener;
use crate::models::{Account, AccountType, NewTransaction, ParsedRow};
use crate::store::{find_account_by_name, insert_transaction};

/// Parses a bank amount into signed cents. Accepts thousands separators,
/// currency symbols, quotes and accounting-style `(negatives)`.
pub fn parse_cents(raw: &str) -> Option<i64> {
    let s = raw.replace([',', '"', '$'], "");
    let mut s = s.trim();
    let mut negative = false;
    if let Some(inner) = s.strip_prefix('(').and_then(|v| v.strip_suffix(')')) {
        negative = true;
        s = inner.trim();
    }
    if let Some(rest) = s.strip_prefix('-') {
        negative = !negative;
        s = rest.trim();
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest.trim();
    }

    let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
    let digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
    if (whole.is_empty() && frac.is_empty()) || !digits(whole) || !digits(frac) || frac.len() > 2 {
        return None;
    }
    let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let frac: i64 = format!("{frac:0<2}").parse().ok()?;
    let cents = whole.checked_mul(100)?.checked_add(frac)?;
    Some(if negative { -cents } else { cents })
}

pub fn parse_date_mdy(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%m/%d/%Y").ok()
}

/// ISO `YYYY-MM-DD` first, then US `MM/DD/YYYY`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .ok()
        .or_else(|| parse_date_mdy(raw))
}

fn records(content: &str) -> impl Iterator<Item = StringRecord> + '_ {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes())
        .into_records()
        .filter_map(|r| r.ok())
}

fn column(record: &StringRecord, name: &str) -> Option<usize> {
    record.iter().position(|f| f.trim().eq_ignore_ascii_case(name))
}

// ---------------------------------------------------------------------------
// Formats
// ---------------------------------------------------------------------------

/// Bank export layouts the importer understands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Format {
    /// Any CSV whose header names `Date`, `Description` and `Amount`.
    Generic,
    BofaChecking,
    BofaCreditCard,
}

/// Specific layouts come before `Generic` so auto-detection prefers them.
const FORMATS: [Format; 3] = [Format::BofaChecking, Format::BofaCreditCard, Format::Generic];

impl Format {
    pub fn key(self) -> &'static str {
        match self {
            Format::Generic => "generic",
            Format::BofaChecking => "bofa_checking",
            Format::BofaCreditCard => "bofa_credit_card",
        }
    }

    pub fn from_key(key: &str) -> Result<Self> {
        FORMATS
            .into_iter()
            .find(|f| f.key() == key)
            .ok_or_else(|| BudgieError::UnknownFormat(key.to_string()))
    }

    fn accepts(self, account_type: AccountType) -> bool {
        match self {
            Format::Generic => true,
            Format::BofaChecking => {
                matches!(account_type, AccountType::Checking | AccountType::Savings)
            }
            Format::BofaCreditCard => account_type == AccountType::Credit,
        }
    }

    fn recognizes(self, content: &str) -> bool {
        match self {
            Format::Generic => records(content).next().is_some_and(|r| generic_columns(&r).is_some()),
            Format::BofaChecking => records(content).any(|r| is_bofa_checking_header(&r)),
            Format::BofaCreditCard => content.contains("CardHolder Name"),
        }
    }

    /// First format that accepts the account type and recognizes the file.
    pub fn detect(account_type: AccountType, content: &str) -> Option<Self> {
        FORMATS
            .into_iter()
            .find(|f| f.accepts(account_type) && f.recognizes(content))
    }

    pub fn parse(self, content: &str) -> Vec<ParsedRow> {
        match self {
            Format::Generic => parse_generic(content),
            Format::BofaChecking => parse_bofa_checking(content),
            Format::BofaCreditCard => parse_bofa_credit_card(content),
        }
    }
}

fn generic_columns(header: &StringRecord) -> Option<(usize, usize, usize)> {
    Some((
        column(header, "date")?,
        column(header, "description")?,
        column(header, "amount")?,
    ))
}

fn parse_generic(content: &str) -> Vec<ParsedRow> {
    let mut rows = records(content);
    let Some((date_col, desc_col, amount_col)) = rows.next().as_ref().and_then(generic_columns) else {
        return Vec::new();
    };
    rows.filter_map(|r| {
        let date = parse_date(r.get(date_col)?)?;
        let amount_cents = parse_cents(r.get(amount_col)?)?;
        let description = r.get(desc_col)?.trim();
        (!description.is_empty()).then(|| ParsedRow {
            date,
            description: description.to_string(),
            amount_cents,
        })
    })
    .collect()
}

fn is_bofa_checking_header(record: &StringRecord) -> bool {
    record.len() >= 4
        && record.get(0).is_some_and(|f| f.trim() == "Date")
        && record.get(1).is_some_and(|f| f.contains("Description"))
}

/// Checking exports open with a summary block; transactions follow the
/// `Date,Description,Amount,Running Bal.` header.
fn parse_bofa_checking(content: &str) -> Vec<ParsedRow> {
    records(content)
        .skip_while(|r| !is_bofa_checking_header(r))
        .skip(1)
        .filter_map(|r| {
            let date = parse_date_mdy(r.get(0)?)?;
            let description = r.get(1)?.trim();
            if description.is_empty() || description.contains("Beginning balance") {
                return None;
            }
            Some(ParsedRow {
                date,
                description: description.to_string(),
                amount_cents: parse_cents(r.get(2)?)?,
            })
        })
        .collect()
}

/// Card exports list magnitudes; the `Type` column (`D` debit, `C` credit)
/// carries the sign.
fn parse_bofa_credit_card(content: &str) -> Vec<ParsedRow> {
    let mut rows = records(content).skip_while(|r| column(r, "Posting Date").is_none());
    let Some(header) = rows.next() else {
        return Vec::new();
    };
    let col = |name: &str, fallback: usize| column(&header, name).unwrap_or(fallback);
    let (date_col, desc_col, amount_col, type_col) =
        (col("Posting Date", 3), col("Payee", 5), col("Amount", 6), col("Type", 9));

    rows.filter_map(|r| {
        let date = parse_date_mdy(r.get(date_col)?)?;
        let magnitude = parse_cents(r.get(amount_col)?)?.abs();
        let amount_cents = if r.get(type_col)?.trim() == "D" { -magnitude } else { magnitude };
        Some(ParsedRow {
            date,
            description: r.get(desc_col)?.trim().to_string(),
            amount_cents,
        })
    })
    .collect()
}

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct ImportResult {
    pub imported: usize,
    pub skipped: usize,
    pub duplicate_file: bool,
    /// Transfer suggestions created while announcing the new rows.
    pub suggestions: usize,
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn already_imported(conn: &Connection, account_id: i64, checksum: &str) -> Result<bool> {
    let mut stmt = conn.prepare_cached("SELECT 1 FROM imports WHERE account_id = ?1 AND checksum = ?2")?;
    Ok(stmt.exists(rusqlite::params![account_id, checksum])?)
}

fn row_exists(conn: &Connection, account_id: i64, row: &ParsedRow) -> Result<bool> {
    let mut stmt = conn.prepare_cached(
        "SELECT 1 FROM transactions \
         WHERE account_id = ?1 AND date = ?2 AND amount_cents = ?3 AND description = ?4",
    )?;
    Ok(stmt.exists(rusqlite::params![account_id, row.date, row.amount_cents, row.description])?)
}

fn record_import(
    conn: &Connection,
    account: &Account,
    file_path: &Path,
    checksum: &str,
    rows: &[ParsedRow],
) -> Result<i64> {
    let filename = file_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    conn.execute(
        "INSERT INTO imports (account_id, filename, checksum, row_count, first_date, last_date) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            account.id,
            filename,
            checksum,
            rows.len() as i64,
            rows.iter().map(|r| r.date).min(),
            rows.iter().map(|r| r.date).max(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Imports a bank export into an account. The import record and every new
/// row commit together; only then is each row announced to `listener`.
pub fn import_file(
    conn: &Connection,
    file_path: &Path,
    account_name: &str,
    format_key: Option<&str>,
    listener: &dyn IngestionListener,
) -> Result<ImportResult> {
    let account = find_account_by_name(conn, account_name)?;
    let bytes = std::fs::read(file_path)?;
    let checksum = sha256_hex(&bytes);
    if already_imported(conn, account.id, &checksum)? {
        return Ok(ImportResult {
            duplicate_file: true,
            ..Default::default()
        });
    }

    let content = String::from_utf8_lossy(&bytes);
    let format = match format_key {
        Some(key) => Format::from_key(key)?,
        None => Format::detect(account.account_type, &content)
            .ok_or_else(|| BudgieError::NoImporter(account.account_type.to_string()))?,
    };
    let rows = format.parse(&content);
    debug!(format = format.key(), rows = rows.len(), "parsed export");

    let tx = conn.unchecked_transaction()?;
    let import_id = record_import(&tx, &account, file_path, &checksum, &rows)?;
    let mut inserted = Vec::with_capacity(rows.len());
    for row in &rows {
        if row_exists(&tx, account.id, row)? {
            continue;
        }
        inserted.push(insert_transaction(
            &tx,
            &NewTransaction {
                account_id: account.id,
                date: row.date,
                description: row.description.clone(),
                amount_cents: row.amount_cents,
                import_id: Some(import_id),
            },
        )?);
    }
    tx.commit()?;

    let skipped = rows.len() - inserted.len();
    info!(
        account = %account.name,
        format = format.key(),
        imported = inserted.len(),
        skipped,
        "import committed"
    );

    let suggestions: usize = inserted
        .iter()
        .map(|&id| listener.on_transaction_ingested(conn, id).created.len())
        .sum();

    Ok(ImportResult {
        imported: inserted.len(),
        skipped,
        duplicate_file: false,
        suggestions,
    })
}
