//! Asynchronous batch deletion.
//!
//! Many producers submit `(owner, short_key)` pairs; a single worker buffers
//! them and hands them to [`snip_core::BatchDeleter::delete_batch`] in bulk.

pub mod config;
pub mod error;
pub mod pipeline;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use pipeline::{DeletionPipeline, PipelineState, PipelineStats};
