//! Error types for Parley.

use thiserror::Error;

/// Common error type for Parley.
#[derive(Error, Debug)]
pub enum ParleyError {
    /// Database error.
    ///
    /// Wraps errors from the sqlx backend. Join/send paths log and swallow
    /// this variant so a storage hiccup never blocks the in-memory chat.
    #[error("database error: {0}")]
    Database(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Room is at capacity and no same-name alternative has spare seats.
    #[error("room {0} is full")]
    RoomFull(String),

    /// Duplicate resource, e.g. a room name that already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<sqlx::Error> for ParleyError {
    fn from(e: sqlx::Error) -> Self {
        ParleyError::Database(e.to_string())
    }
}

/// Result type alias for Parley operations.
pub type Result<T> = std::result::Result<T, ParleyError>;
