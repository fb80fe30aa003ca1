use std::time::Duration;
use typed_builder::TypedBuilder;

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Tuning for [`crate::DeletionPipeline`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct PipelineConfig {
    /// Soft cap on buffered requests; reaching it triggers a flush.
    #[builder(default = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,
    /// Period of the timer flush. Empty buffers are not flushed.
    #[builder(default = DEFAULT_FLUSH_INTERVAL)]
    pub flush_interval: Duration,
    /// Deadline for a single `delete_batch` call.
    #[builder(default = DEFAULT_FLUSH_TIMEOUT)]
    pub flush_timeout: Duration,
    /// Upper bound on `shutdown`, final flush included.
    #[builder(default = DEFAULT_DRAIN_TIMEOUT)]
    pub drain_timeout: Duration,
    #[builder(default = DEFAULT_CHANNEL_CAPACITY)]
    pub channel_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}
