//! Error types for envsense-store.

use std::path::PathBuf;

/// Result type for envsense-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in envsense-store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Task not found in database.
    #[error("Task not found: {0}")]
    TaskNotFound(i64),

    /// The database was written by a newer version of this crate.
    #[error("Unsupported schema version {found} (newest known is {supported})")]
    UnsupportedSchema { found: i32, supported: i32 },
}
