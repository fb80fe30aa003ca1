//! URL shortener facade.
//!
//! Ties a storage backend and the deletion pipeline together behind
//! [`ShortenerService`]. Core types are re-exported from `snip_core`.

pub mod config;
pub mod error;
pub mod service;

pub use config::{ConfigError, FileConfig, ServiceConfig};
pub use error::ShortenerError;
pub use service::{BatchItem, BatchResult, ShortenerService, ShortenedUrl};
pub use snip_core::{OwnerId, ShortKey, Statistics};
