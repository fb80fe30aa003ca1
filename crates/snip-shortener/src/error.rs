use snip_core::{CoreError, StorageError};
use snip_deleter::PipelineError;
use thiserror::Error;

/// Outcomes surfaced to callers of the shortener.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShortenerError {
    #[error("url already shortened: {short_url}")]
    AlreadyExists { short_url: String },
    #[error("resource deleted: {0}")]
    Deleted(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ShortenerError {
    /// HTTP-equivalent status for the outcome.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::AlreadyExists { .. } => 409,
            Self::Deleted(_) => 410,
            Self::NotFound(_) => 404,
            Self::InvalidUrl(_) => 400,
            Self::Unavailable(_) => 503,
            Self::Internal(_) => 500,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<CoreError> for ShortenerError {
    fn from(value: CoreError) -> Self {
        match value {
            CoreError::InvalidUrl(message) => Self::InvalidUrl(message),
            CoreError::InvalidShortKey(message) => Self::NotFound(message),
        }
    }
}

/// `Conflict` is not mapped here; the caller knows the short URL to report.
impl From<StorageError> for ShortenerError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::NotFound(key) => Self::NotFound(key),
            StorageError::Gone(key) => Self::Deleted(key),
            StorageError::AllDeleted(owner) => Self::Deleted(format!("all urls of {owner}")),
            StorageError::Unavailable(_) | StorageError::Timeout(_) => {
                Self::Unavailable(value.to_string())
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<PipelineError> for ShortenerError {
    fn from(value: PipelineError) -> Self {
        match value {
            PipelineError::Closed => Self::Unavailable(value.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn storage_errors_map_to_user_outcomes() {
        let gone: ShortenerError = StorageError::Gone("k1".into()).into();
        assert_eq!(gone.status_code(), 410);

        let all_deleted: ShortenerError = StorageError::AllDeleted("u1".into()).into();
        assert_eq!(all_deleted.status_code(), 410);

        let missing: ShortenerError = StorageError::NotFound("k1".into()).into();
        assert_eq!(missing.status_code(), 404);

        let timeout: ShortenerError = StorageError::Timeout("get exceeded 3000ms".into()).into();
        assert_eq!(timeout.status_code(), 503);
        assert!(timeout.is_retryable());

        let unimplemented: ShortenerError = StorageError::Unimplemented("delete_batch").into();
        assert_eq!(unimplemented.status_code(), 500);
        assert!(!unimplemented.is_retryable());
    }

    #[test]
    fn core_and_pipeline_errors() {
        let invalid: ShortenerError = CoreError::InvalidUrl("nope".into()).into();
        assert_eq!(invalid.status_code(), 400);

        let closed: ShortenerError = PipelineError::Closed.into();
        assert!(closed.is_retryable());

        let drain: ShortenerError = PipelineError::DrainTimeout(Duration::from_secs(5)).into();
        assert_eq!(drain.status_code(), 500);

        let conflict = ShortenerError::AlreadyExists {
            short_url: "http://localhost:8080/0f115db0".into(),
        };
        assert_eq!(conflict.status_code(), 409);
    }
}
