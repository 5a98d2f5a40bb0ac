use comfy_table::{Cell, Table};

use crate::cli::open_db;
use crate::error::Result;
use crate::models::AccountType;
use crate::store::{add_account, list_accounts};

pub fn add(name: &str, account_type: &str, institution: Option<&str>) -> Result<()> {
    let account_type: AccountType = account_type.parse()?;
    let conn = open_db()?;
    add_account(&conn, name, account_type, institution)?;
    println!("Added account: {name} ({account_type})");
    Ok(())
}

pub fn list() -> Result<()> {
    let conn = open_db()?;
    let accounts = list_accounts(&conn)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Type", "Institution"]);
    for account in accounts {
        table.add_row(vec![
            Cell::new(account.id),
            Cell::new(account.name),
            Cell::new(account.account_type),
            Cell::new(account.institution.unwrap_or_default()),
        ]);
    }
    println!("Accounts\n{table}");
    Ok(())
}
