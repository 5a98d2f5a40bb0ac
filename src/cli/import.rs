use std::path::PathBuf;

use crate::cli::{ingestion_listener, open_db};
use crate::error::Result;
use crate::importer::import_file;

pub fn run(file: &str, account: &str, format: Option<&str>) -> Result<()> {
    let file_path = PathBuf::from(file);
    let conn = open_db()?;
    let listener = ingestion_listener()?;

    let result = import_file(&conn, &file_path, account, format, listener.as_ref())?;

    if result.duplicate_file {
        println!("This file has already been imported (duplicate checksum).");
        return Ok(());
    }

    println!("{} imported, {} skipped (duplicates)", result.imported, result.skipped);
    if result.suggestions > 0 {
        println!(
            "{} possible transfer(s) found; run `budgie review`",
            result.suggestions
        );
    }
    Ok(())
}
