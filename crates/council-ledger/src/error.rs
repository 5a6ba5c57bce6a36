use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Session {0} already recorded")]
    Duplicate(String),

    #[error("Ledger not available: {0}")]
    Unavailable(String),
}
