use thiserror::Error;

#[derive(Error, Debug)]
pub enum BudgieError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unknown account: {0}")]
    UnknownAccount(String),

    #[error("Unknown format: {0}")]
    UnknownFormat(String),

    #[error("No importer for account type: {0}")]
    NoImporter(String),

    #[error("Settings error: {0}")]
    Settings(String),
}

impl BudgieError {
    /// HTTP-style status for callers that expose resolver results over an API.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) | Self::UnknownAccount(_) => 404,
            Self::InvalidState(_)
            | Self::InvalidRequest(_)
            | Self::UnknownFormat(_)
            | Self::NoImporter(_) => 400,
            Self::Db(_)
            | Self::Io(_)
            | Self::Csv(_)
            | Self::Json(_)
            | Self::Settings(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, BudgieError>;
