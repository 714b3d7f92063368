//! Error types for the sync engine.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that end a sync cycle.
///
/// Every variant is fatal to the current cycle and leaves the watermark
/// untouched; the engine never retries internally. Whether a retry is worth
/// scheduling is exposed through [`SyncError::is_retryable`].
#[derive(Error, Debug)]
pub enum SyncError {
    /// Transport-level failure while talking to the remote collection.
    #[error("network error: {message}")]
    Network {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The remote collection rejected a request.
    #[error("server error: {0}")]
    Server(String),

    /// Local storage failure during apply or upload.
    #[error("storage error: {0}")]
    Storage(#[from] credsync_store::StoreError),

    /// The cycle was interrupted between stages.
    #[error("sync interrupted")]
    Interrupted,
}

impl SyncError {
    /// Creates a retryable network error.
    pub fn network_retryable(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable network error.
    pub fn network_fatal(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if a later cycle may succeed without intervention.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Network { retryable, .. } => *retryable,
            SyncError::Server(_) => true,
            SyncError::Storage(_) | SyncError::Interrupted => false,
        }
    }
}
