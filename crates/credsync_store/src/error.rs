//! Error types for the login store.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
///
/// Storage failures are fatal to the caller's current operation; the store
/// never retries internally.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Underlying SQLite error.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// No login with the given guid exists.
    #[error("no login with guid `{0}`")]
    NoSuchRecord(String),

    /// The supplied login content is unusable.
    #[error("invalid login: {0}")]
    InvalidEntry(String),
}
