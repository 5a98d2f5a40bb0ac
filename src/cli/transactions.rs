use std::collections::HashMap;

use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::cli::{ingestion_listener, open_db};
use crate::error::{BudgieError, Result};
use crate::fmt::money;
use crate::importer::{parse_cents, parse_date};
use crate::models::NewTransaction;
use crate::store::{delete_transaction, find_account_by_name, insert_transaction, list_accounts, list_transactions};

pub fn add(account: &str, date: &str, amount: &str, description: &str) -> Result<()> {
    let date = parse_date(date)
        .ok_or_else(|| BudgieError::InvalidRequest(format!("unrecognized date '{date}'")))?;
    let amount_cents = parse_cents(amount)
        .ok_or_else(|| BudgieError::InvalidRequest(format!("unrecognized amount '{amount}'")))?;

    let conn = open_db()?;
    let account = find_account_by_name(&conn, account)?;
    let listener = ingestion_listener()?;

    let id = insert_transaction(
        &conn,
        &NewTransaction {
            account_id: account.id,
            date,
            description: description.to_string(),
            amount_cents,
            import_id: None,
        },
    )?;
    println!("Added transaction {id}: {} {}", date, money(amount_cents));

    let report = listener.on_transaction_ingested(&conn, id);
    if !report.created.is_empty() {
        println!(
            "{}",
            format!(
                "{} possible transfer(s) found; see `budgie suggestions list`",
                report.created.len()
            )
            .yellow()
        );
    }
    Ok(())
}

pub fn list(account: Option<&str>) -> Result<()> {
    let conn = open_db()?;
    let account_id = match account {
        Some(name) => Some(find_account_by_name(&conn, name)?.id),
        None => None,
    };
    let names: HashMap<i64, String> = list_accounts(&conn)?
        .into_iter()
        .map(|a| (a.id, a.name))
        .collect();
    let name_of = |id: i64| names.get(&id).cloned().unwrap_or_default();

    let mut table = Table::new();
    table.set_header(vec!["ID", "Date", "Account", "Description", "Amount", "Transfer"]);
    for txn in list_transactions(&conn, account_id)? {
        table.add_row(vec![
            Cell::new(txn.id),
            Cell::new(txn.date),
            Cell::new(name_of(txn.account_id)),
            Cell::new(&txn.description),
            Cell::new(money(txn.amount_cents)),
            Cell::new(
                txn.transfer_account_id
                    .map(|id| format!("↔ {}", name_of(id)))
                    .unwrap_or_default(),
            ),
        ]);
    }
    println!("Transactions\n{table}");
    Ok(())
}

pub fn delete(id: i64) -> Result<()> {
    let conn = open_db()?;
    delete_transaction(&conn, id)?;
    println!("Deleted transaction {id}");
    Ok(())
}
