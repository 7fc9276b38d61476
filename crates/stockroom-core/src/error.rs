//! Error types for stockroom-core

use thiserror::Error;

use crate::http::TransportError;

/// Result type alias using stockroom-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in stockroom-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Outbound request failed before a usable response arrived
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}
