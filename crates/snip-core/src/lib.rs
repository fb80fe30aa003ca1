//! Core types and traits for the snip URL shortener.
//!
//! This crate provides the storage engine contract shared by every backend,
//! the short-key deriver, and the error taxonomy.

pub mod deadline;
pub mod error;
pub mod repository;
pub mod shortkey;
pub mod validate;

pub use deadline::with_deadline;
pub use error::{CoreError, Result, StorageError};
pub use repository::{
    BatchDeleter, DeletionRequest, ReadRepository, Repository, Statistics, UrlEntry,
};
pub use shortkey::{OwnerId, ShortKey};
pub use validate::validate_url;
