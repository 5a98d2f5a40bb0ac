mod candidates;
mod cli;
mod db;
mod error;
mod fmt;
mod importer;
mod match_engine;
mod models;
mod resolver;
mod scorer;
mod settings;
mod store;
mod suggestions;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{AccountsCommands, Cli, Commands, SuggestionsCommands, TransactionsCommands};

fn init_tracing(verbose: bool) {
    let default = if verbose { "budgie=info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Init { data_dir, name } => cli::init::run(data_dir, name),
        Commands::Accounts { command } => match command {
            AccountsCommands::Add {
                name,
                account_type,
                institution,
            } => cli::accounts::add(&name, &account_type, institution.as_deref()),
            AccountsCommands::List => cli::accounts::list(),
        },
        Commands::Transactions { command } => match command {
            TransactionsCommands::Add {
                account,
                date,
                amount,
                description,
            } => cli::transactions::add(&account, &date, &amount, &description),
            TransactionsCommands::List { account } => cli::transactions::list(account.as_deref()),
            TransactionsCommands::Delete { id } => cli::transactions::delete(id),
        },
        Commands::Import {
            file,
            account,
            format,
        } => cli::import::run(&file, &account, format.as_deref()),
        Commands::Suggestions { command } => match command {
            SuggestionsCommands::List { status, json } => {
                cli::suggestions::list(status.as_deref(), json)
            }
            SuggestionsCommands::Accept { id } => cli::suggestions::accept(id),
            SuggestionsCommands::Reject { id } => cli::suggestions::reject(id),
        },
        Commands::Link {
            transaction_a,
            transaction_b,
        } => cli::link::run(transaction_a, transaction_b),
        Commands::Review => cli::review::run(),
        Commands::Rematch => cli::suggestions::rematch(),
        Commands::Status => cli::status::run(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e} ({})", e.status_code());
        std::process::exit(1);
    }
}
