use colored::{ColoredString, Colorize};
use comfy_table::{Cell, Table};

use crate::cli::open_db;
use crate::error::Result;
use crate::fmt::money;
use crate::match_engine::MatchEngine;
use crate::models::{Confidence, SuggestionStatus};
use crate::resolver;
use crate::settings::Settings;
use crate::suggestions::{list_details, SuggestionSide};

pub(crate) fn confidence_label(confidence: Confidence) -> ColoredString {
    match confidence {
        Confidence::High => confidence.as_str().green(),
        Confidence::Medium => confidence.as_str().yellow(),
        Confidence::Low => confidence.as_str().dimmed(),
    }
}

fn side_cell(side: &SuggestionSide) -> String {
    format!(
        "{} {}\n{} {}",
        side.transaction.date,
        side.account.name,
        money(side.transaction.amount_cents),
        side.transaction.description
    )
}

pub fn list(status: Option<&str>, json: bool) -> Result<()> {
    let status: Option<SuggestionStatus> = status.map(str::parse).transpose()?;
    let conn = open_db()?;
    let details = list_details(&conn, status)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&details)?);
        return Ok(());
    }

    if details.is_empty() {
        println!("No transfer suggestions.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Status", "Confidence", "Score", "Side A", "Side B", "Card payment"]);
    for d in &details {
        table.add_row(vec![
            Cell::new(d.suggestion.id),
            Cell::new(d.suggestion.status),
            Cell::new(confidence_label(d.confidence())),
            Cell::new(d.suggestion.score),
            Cell::new(side_cell(&d.side_a)),
            Cell::new(side_cell(&d.side_b)),
            Cell::new(if d.suggestion.is_credit_payment { "yes" } else { "" }),
        ]);
    }
    println!("Transfer suggestions\n{table}");
    Ok(())
}

pub fn accept(id: i64) -> Result<()> {
    let conn = open_db()?;
    let outcome = resolver::accept(&conn, id)?;
    println!(
        "{}",
        format!(
            "Linked transactions {} and {} as a transfer.",
            outcome.transaction_a.id, outcome.transaction_b.id
        )
        .green()
    );
    if outcome.removed_suggestions > 0 {
        println!("Dropped {} conflicting suggestion(s).", outcome.removed_suggestions);
    }
    Ok(())
}

pub fn reject(id: i64) -> Result<()> {
    let conn = open_db()?;
    let suggestion = resolver::reject(&conn, id)?;
    println!(
        "Rejected suggestion {}; transactions {} and {} stay unlinked.",
        suggestion.id, suggestion.transaction_a_id, suggestion.transaction_b_id
    );
    Ok(())
}

pub fn rematch() -> Result<()> {
    let settings = Settings::load();
    if !settings.matching.enabled {
        println!("Transfer matching is disabled in settings.");
        return Ok(());
    }
    let conn = open_db()?;
    let engine = MatchEngine::from_settings(&settings.matching)?;
    let report = engine.rematch_all(&conn)?;
    println!(
        "{} new suggestion(s), {} already suggested, {} candidate(s) scored",
        report.created.len(),
        report.already_suggested,
        report.candidates
    );
    Ok(())
}
