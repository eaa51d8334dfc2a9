//! Error types for the mirror engine.
//!
//! [`StorageError`] is what a backend returns for a single call.
//! [`MirrorError`] is what escapes a run: configuration problems and listing
//! failures. Per-key failures never become a `MirrorError`; jobs log them and
//! count them in the run statistics instead.

/// Error returned by an [`ObjectStorage`](crate::storage::ObjectStorage) call.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The object or its requested version does not exist.
    #[error("The specified key does not exist: {bucket}/{key}")]
    NotFound {
        /// The bucket that was addressed.
        bucket: String,
        /// The key that was not found.
        key: String,
    },

    /// The backend rejected or failed the request.
    #[error("{operation} failed (status {}): {message}", status.map_or_else(|| "n/a".to_owned(), |s| s.to_string()))]
    Service {
        /// The operation that failed (e.g. `copy_object`).
        operation: &'static str,
        /// HTTP status code, when one was received.
        status: Option<u16>,
        /// Backend error message.
        message: String,
    },

    /// Internal error with context.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl StorageError {
    /// Build a [`StorageError::Service`].
    #[must_use]
    pub fn service(operation: &'static str, status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Service {
            operation,
            status,
            message: message.into(),
        }
    }

    /// Whether the error means the addressed object does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Service { status, .. } => *status == Some(404),
            Self::Internal(_) => false,
        }
    }
}

/// Convenience result type for storage calls.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error that aborts a mirror run.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    /// The configuration is invalid or could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),

    /// A listing page could not be fetched within the retry budget.
    #[error("listing {bucket}/{prefix} failed after {attempts} attempt(s): {source}")]
    ListingFailed {
        /// The bucket being listed.
        bucket: String,
        /// The prefix being listed.
        prefix: String,
        /// Number of attempts made.
        attempts: u32,
        /// The last error returned by the backend.
        #[source]
        source: StorageError,
    },

    /// Listing was interrupted while waiting to retry.
    #[error("listing {bucket}/{prefix} interrupted while waiting to retry")]
    ListingInterrupted {
        /// The bucket being listed.
        bucket: String,
        /// The prefix being listed.
        prefix: String,
    },

    /// A background task panicked or was cancelled.
    #[error("{task} task failed: {message}")]
    Task {
        /// Which task failed.
        task: &'static str,
        /// Join error description.
        message: String,
    },

    /// Internal error with context.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Convenience result type for mirror runs.
pub type MirrorResult<T> = Result<T, MirrorError>;
