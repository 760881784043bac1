//! Error types for liftlog-core

use thiserror::Error;

/// Result type alias using liftlog-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in liftlog-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Local key-value storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote HTTP transport error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote API rejected the request
    #[error("Remote API error: {0}")]
    Remote(String),

    /// Write attempted with a handle for a namespace that is no longer active
    #[error("Namespace is no longer active: {0}")]
    StaleNamespace(String),

    /// Remote sync is not configured
    #[error("Remote sync is not configured")]
    NotConfigured,
}
