use dialoguer::Input;

use crate::db::{get_connection, init_db};
use crate::error::Result;
use crate::settings::{expand_path, Settings};

pub fn run(data_dir: Option<String>, name: Option<String>) -> Result<()> {
    let first_run = !Settings::file().exists();
    let mut settings = Settings::load();

    if let Some(dir) = data_dir {
        settings.data_dir = expand_path(&dir);
    } else if first_run {
        let chosen: String = Input::new()
            .with_prompt("Data directory")
            .default(settings.data_dir.clone())
            .interact_text()
            .unwrap_or_else(|_| settings.data_dir.clone());
        settings.data_dir = expand_path(chosen.trim());
    }

    if let Some(name) = name {
        settings.user_name = name.trim().to_string();
    } else if first_run {
        let chosen: String = Input::new()
            .with_prompt("Your name")
            .allow_empty(true)
            .interact_text()
            .unwrap_or_default();
        settings.user_name = chosen.trim().to_string();
    }

    let dir = settings.data_dir();
    std::fs::create_dir_all(dir.join("imports"))?;
    settings.save()?;

    let conn = get_connection(&settings.db_path())?;
    init_db(&conn)?;

    println!("Initialized budgie at {}", dir.display());
    Ok(())
}
