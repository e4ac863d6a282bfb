//! Common error types for the gallery sync daemon

use thiserror::Error;

/// Common result type for sync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the sync daemon
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid caller input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Remote gallery API or WordPress API failure
    #[error("Remote API error: {0}")]
    Remote(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
