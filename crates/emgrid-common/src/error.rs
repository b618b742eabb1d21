//! Error types for EMGRID

use thiserror::Error;

/// Result type alias for EMGRID operations
pub type Result<T> = std::result::Result<T, EmgridError>;

/// Main error type for EMGRID
#[derive(Error, Debug)]
pub enum EmgridError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}
