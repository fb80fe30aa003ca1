use thiserror::Error;

/// Result type for storage contract operations.
pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("invalid short key: {0}")]
    InvalidShortKey(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

/// Errors surfaced by every storage backend.
///
/// Backends return these to the direct caller without retrying.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("short key already exists for owner '{owner}': {short_key}")]
    Conflict { owner: String, short_key: String },
    #[error("short key not found: {0}")]
    NotFound(String),
    #[error("short key has been deleted: {0}")]
    Gone(String),
    #[error("all urls have been deleted for owner '{0}'")]
    AllDeleted(String),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("storage operation timed out: {0}")]
    Timeout(String),
    #[error("storage query failed: {0}")]
    Query(String),
    #[error("stored data is invalid: {0}")]
    InvalidData(String),
    #[error("operation not supported by this backend: {0}")]
    Unimplemented(&'static str),
    #[error("storage i/o failed: {0}")]
    Io(String),
}

impl StorageError {
    /// Whether the caller may retry the same operation later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(StorageError::Unavailable("down".into()).is_retryable());
        assert!(StorageError::Timeout("get".into()).is_retryable());
        assert!(!StorageError::NotFound("abc".into()).is_retryable());
        assert!(!StorageError::Unimplemented("delete_batch").is_retryable());
    }

    #[test]
    fn io_errors_convert() {
        let err: StorageError = std::io::Error::other("disk full").into();
        assert_eq!(err, StorageError::Io("disk full".into()));
    }
}
