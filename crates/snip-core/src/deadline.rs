use crate::error::{Result, StorageError};
use std::future::Future;
use std::time::Duration;

/// Runs a storage operation under a deadline.
///
/// Expiry surfaces as [`StorageError::Timeout`] naming the operation.
pub async fn with_deadline<T, F>(deadline: Duration, operation: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(StorageError::Timeout(format!(
            "{operation} exceeded {}ms",
            deadline.as_millis()
        ))),
    }
}
