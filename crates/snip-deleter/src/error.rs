use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("deletion pipeline is shutting down")]
    Closed,
    #[error("deletion pipeline did not drain within {0:?}")]
    DrainTimeout(Duration),
    #[error("deletion worker failed: {0}")]
    WorkerFailed(String),
}
