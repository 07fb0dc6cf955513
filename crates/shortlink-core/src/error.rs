use thiserror::Error;

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors a storage backend can report through the [`Repository`] contract.
///
/// A soft-deleted record is *not* an error; see
/// [`Destination::Gone`](crate::repository::Destination::Gone).
///
/// [`Repository`]: crate::repository::Repository
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("short code not found: {0}")]
    NotFound(String),
    #[error("record already exists: {0}")]
    Conflict(String),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        let message = err.to_string();
        match err.kind() {
            ErrorKind::TimedOut => StorageError::Timeout(message),
            ErrorKind::InvalidData | ErrorKind::UnexpectedEof => StorageError::InvalidData(message),
            _ => StorageError::Unavailable(message),
        }
    }
}
