use crate::db::get_connection;
use crate::error::Result;
use crate::fmt::format_bytes;
use crate::settings::Settings;
use crate::suggestions::count_by_status;

pub fn run() -> Result<()> {
    let settings = Settings::load();
    let db_path = settings.db_path();

    println!("User:       {}", if settings.user_name.is_empty() { "(not set)" } else { &settings.user_name });
    println!("Data dir:   {}", settings.data_dir);
    println!("Database:   {}", db_path.display());
    println!(
        "Matching:   {}",
        if settings.matching.enabled { "enabled" } else { "disabled" }
    );

    if db_path.exists() {
        let size = std::fs::metadata(&db_path)?.len();
        println!("DB size:    {}", format_bytes(size));

        let conn = get_connection(&db_path)?;

        let accounts: i64 = conn.query_row("SELECT count(*) FROM accounts", [], |r| r.get(0))?;
        let transactions: i64 = conn.query_row("SELECT count(*) FROM transactions", [], |r| r.get(0))?;
        let transfers: i64 = conn.query_row(
            "SELECT count(*) FROM transactions WHERE kind = 'transfer'",
            [],
            |r| r.get(0),
        )?;

        println!();
        println!("Accounts:      {accounts}");
        println!("Transactions:  {transactions}");
        println!("Transfers:     {transfers}");
        for (status, count) in count_by_status(&conn)? {
            println!("{:<15}{count}", format!("Suggestions ({status}):"));
        }
    } else {
        println!();
        println!("Database not found. Run `budgie init` to set up.");
    }

    Ok(())
}
