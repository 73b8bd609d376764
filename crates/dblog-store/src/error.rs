//! Error types for dblog-store
//!
//! This module defines the error types returned by every store backend.

use thiserror::Error;

/// Errors that can occur in store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error while opening or writing the backing file
    #[error("I/O error: {0}")]
    Io(String),

    /// Error reported by the database engine
    #[error("Database error: {0}")]
    Database(String),

    /// The table was never set up with `setup_namespace`
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    /// The store cannot currently serve requests
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl StoreError {
    /// Create a new I/O error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }

    /// Create a new Database error
    pub fn database(message: impl ToString) -> Self {
        Self::Database(message.to_string())
    }

    /// Create a new UnknownTable error
    pub fn unknown_table(table: impl Into<String>) -> Self {
        Self::UnknownTable(table.into())
    }

    /// Create a new Unavailable error
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}
