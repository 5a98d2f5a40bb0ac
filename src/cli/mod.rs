pub mod accounts;
pub mod import;
pub mod init;
pub mod link;
pub mod review;
pub mod status;
pub mod suggestions;
pub mod transactions;

use clap::{Parser, Subcommand};
use rusqlite::Connection;

use crate::db::{get_connection, init_db};
use crate::error::{BudgieError, Result};
use crate::match_engine::{IngestionListener, MatchEngine, NoMatching};
use crate::settings::Settings;

pub(crate) fn open_db() -> Result<Connection> {
    let path = Settings::load().db_path();
    if !path.exists() {
        return Err(BudgieError::Settings(format!(
            "no database at {}; run `budgie init` first",
            path.display()
        )));
    }
    let conn = get_connection(&path)?;
    init_db(&conn)?;
    Ok(conn)
}

/// The ingestion port configured by the `matching` settings.
pub(crate) fn ingestion_listener() -> Result<Box<dyn IngestionListener>> {
    let settings = Settings::load();
    if settings.matching.enabled {
        Ok(Box::new(MatchEngine::from_settings(&settings.matching)?))
    } else {
        Ok(Box::new(NoMatching))
    }
}

#[derive(Parser)]
#[command(name = "budgie", about = "Personal budgeting CLI that finds transfers between your accounts.")]
pub struct Cli {
    /// Log matching decisions to stderr (same as RUST_LOG=info).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Set up budgie: choose a data directory and initialize the database.
    Init {
        /// Path for budgie data (default: ~/Documents/budgie)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
        /// Your name, shown by `budgie status`
        #[arg(long)]
        name: Option<String>,
    },
    /// Manage accounts.
    Accounts {
        #[command(subcommand)]
        command: AccountsCommands,
    },
    /// Enter, list or delete transactions.
    Transactions {
        #[command(subcommand)]
        command: TransactionsCommands,
    },
    /// Import a CSV bank export and look for transfers.
    Import {
        /// Path to CSV file to import
        file: String,
        /// Account name to import into
        #[arg(long)]
        account: String,
        /// Importer format key (generic, bofa_checking, bofa_credit_card)
        #[arg(long)]
        format: Option<String>,
    },
    /// List and resolve transfer suggestions.
    Suggestions {
        #[command(subcommand)]
        command: SuggestionsCommands,
    },
    /// Link two transactions as a transfer without a suggestion.
    Link {
        /// First transaction ID
        transaction_a: i64,
        /// Second transaction ID
        transaction_b: i64,
    },
    /// Interactively review pending transfer suggestions.
    Review,
    /// Re-run transfer matching over every unlinked transaction.
    Rematch,
    /// Show current database and summary statistics.
    Status,
}

#[derive(Subcommand)]
pub enum AccountsCommands {
    /// Add a new account.
    Add {
        /// Account name, e.g. 'Joint Checking'
        name: String,
        /// Account type: checking, savings, cash, credit
        #[arg(long = "type")]
        account_type: String,
        /// Institution name
        #[arg(long)]
        institution: Option<String>,
    },
    /// List all accounts.
    List,
}

#[derive(Subcommand)]
pub enum TransactionsCommands {
    /// Record a transaction by hand.
    Add {
        /// Account name
        #[arg(long)]
        account: String,
        /// Date: YYYY-MM-DD or MM/DD/YYYY
        #[arg(long)]
        date: String,
        /// Signed amount, e.g. -125.00 for an outflow
        #[arg(long, allow_hyphen_values = true)]
        amount: String,
        #[arg(long)]
        description: String,
    },
    /// List transactions.
    List {
        /// Filter by account name
        #[arg(long)]
        account: Option<String>,
    },
    /// Delete a transaction and any suggestions that reference it.
    Delete {
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum SuggestionsCommands {
    /// List suggestions with both sides of each pair.
    List {
        /// Only show one status: pending, accepted, rejected
        #[arg(long)]
        status: Option<String>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Accept a suggestion and link its transactions.
    Accept {
        id: i64,
    },
    /// Reject a suggestion; its transactions stay unlinked.
    Reject {
        id: i64,
    },
}
