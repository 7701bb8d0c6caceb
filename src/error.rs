//! Error types for urban-audit

use thiserror::Error;

/// Result type for store, session and parser operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// SQLite failure underneath the document store
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No user is logged in")]
    NotLoggedIn,

    #[error("Unknown user: {0}")]
    UnknownUser(String),

    /// Required form input absent; raised before any file is read
    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("Could not parse survey file: {0}")]
    UnparseableSurvey(String),

    #[error("Wrong file type for {file}: expected {expected}")]
    WrongFileType { file: String, expected: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Index {index} out of bounds (len {len})")]
    IndexOutOfBounds { index: usize, len: usize },

    /// A viewer item reference that does not decode as `<parentId>-<subIndex>`
    #[error("Invalid item reference: {0}")]
    InvalidReference(String),

    #[error("Viewer cannot open with no items")]
    EmptyViewer,
}
