use colored::Colorize;
use dialoguer::Input;

use crate::cli::open_db;
use crate::cli::suggestions::confidence_label;
use crate::error::{BudgieError, Result};
use crate::fmt::money;
use crate::models::SuggestionStatus;
use crate::resolver;
use crate::suggestions::{list_details, SuggestionSide};

fn print_side(label: &str, side: &SuggestionSide) {
    let amount = side.transaction.amount_cents;
    let amt_str = if amount < 0 {
        money(amount).red().to_string()
    } else {
        money(amount).green().to_string()
    };
    println!(
        "  {label}  {}  {:<24} {:>14}  {}",
        side.transaction.date, side.account.name, amt_str, side.transaction.description
    );
}

pub fn run() -> Result<()> {
    let conn = open_db()?;
    let pending = list_details(&conn, Some(SuggestionStatus::Pending))?;

    if pending.is_empty() {
        println!("{}", "No transfer suggestions to review.".green());
        return Ok(());
    }

    println!("\n{} suggestion(s) to review\n", pending.len());

    for detail in &pending {
        println!("{}", "\u{2500}".repeat(60));
        println!(
            "  Suggestion {}  confidence {}  score {}{}",
            detail.suggestion.id,
            confidence_label(detail.confidence()),
            detail.suggestion.score,
            if detail.suggestion.is_credit_payment {
                "  (card payment)"
            } else {
                ""
            }
        );
        print_side("A", &detail.side_a);
        print_side("B", &detail.side_b);
        println!();

        let choice: String = Input::new()
            .with_prompt("a=accept, r=reject, s=skip, q=quit")
            .interact_text()
            .unwrap_or_else(|_| "s".to_string());

        match choice.trim().to_lowercase().as_str() {
            "q" => {
                println!("{}", "Review paused.".yellow());
                return Ok(());
            }
            "a" => match resolver::accept(&conn, detail.suggestion.id) {
                Ok(outcome) => {
                    println!("{}", "\u{2192} Linked as transfer".green());
                    if outcome.removed_suggestions > 0 {
                        println!(
                            "  dropped {} conflicting suggestion(s)",
                            outcome.removed_suggestions
                        );
                    }
                }
                // An earlier accept in this session may have resolved or removed it.
                Err(e @ (BudgieError::InvalidState(_) | BudgieError::NotFound(_))) => {
                    println!("{}", format!("Skipped: {e}").yellow());
                }
                Err(e) => return Err(e),
            },
            "r" => match resolver::reject(&conn, detail.suggestion.id) {
                Ok(_) => println!("{}", "\u{2192} Rejected".dimmed()),
                Err(e @ (BudgieError::InvalidState(_) | BudgieError::NotFound(_))) => {
                    println!("{}", format!("Skipped: {e}").yellow());
                }
                Err(e) => return Err(e),
            },
            "s" => continue,
            _ => {
                println!("{}", "Invalid choice, skipping.".red());
                continue;
            }
        }
        println!();
    }

    println!("{}", "Review complete!".green());
    Ok(())
}
