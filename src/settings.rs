use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::scorer::{DEFAULT_PAYMENT_KEYWORDS, DEFAULT_TRANSFER_KEYWORDS};

pub const DB_FILE: &str = "budgie.db";

/// Contents of `~/.config/budgie/settings.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub matching: MatchSettings,
}

/// Controls transfer detection when transactions are ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchSettings {
    pub enabled: bool,
    pub transfer_keywords: Vec<String>,
    pub payment_keywords: Vec<String>,
}

impl Default for MatchSettings {
    fn default() -> Self {
        let owned = |words: &[&str]| -> Vec<String> { words.iter().map(|w| w.to_string()).collect() };
        Self {
            enabled: true,
            transfer_keywords: owned(DEFAULT_TRANSFER_KEYWORDS),
            payment_keywords: owned(DEFAULT_PAYMENT_KEYWORDS),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            user_name: String::new(),
            matching: MatchSettings::default(),
        }
    }
}

fn home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn default_data_dir() -> String {
    home().join("Documents").join("budgie").display().to_string()
}

impl Settings {
    pub fn config_dir() -> PathBuf {
        home().join(".config").join("budgie")
    }

    pub fn file() -> PathBuf {
        Self::config_dir().join("settings.json")
    }

    /// Reads the settings file. A missing file means defaults; an unreadable
    /// one is logged and also falls back to defaults.
    pub fn load() -> Self {
        let path = Self::file();
        let Ok(content) = std::fs::read_to_string(&path) else {
            return Self::default();
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "unreadable settings, using defaults");
            Self::default()
        })
    }

    pub fn save(&self) -> Result<()> {
        std::fs::create_dir_all(Self::config_dir())?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(Self::file(), json + "\n")?;
        Ok(())
    }

    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir().join(DB_FILE)
    }
}

/// Expands a leading `~` and makes existing paths absolute.
pub fn expand_path(raw: &str) -> String {
    let expanded = match raw.strip_prefix('~') {
        Some(rest) => home().join(rest.trim_start_matches('/')),
        None => PathBuf::from(raw),
    };
    absolute(&expanded).display().to_string()
}

fn absolute(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
