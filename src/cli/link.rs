use colored::Colorize;

use crate::cli::open_db;
use crate::error::Result;
use crate::resolver::manual_link;

pub fn run(transaction_a: i64, transaction_b: i64) -> Result<()> {
    let conn = open_db()?;
    let outcome = manual_link(&conn, transaction_a, transaction_b)?;
    println!(
        "{}",
        format!(
            "\u{2192} Linked {} and {} as a transfer",
            outcome.transaction_a.id, outcome.transaction_b.id
        )
        .green()
    );
    if outcome.removed_suggestions > 0 {
        println!("Dropped {} pending suggestion(s).", outcome.removed_suggestions);
    }
    Ok(())
}
