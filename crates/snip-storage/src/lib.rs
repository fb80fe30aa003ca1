//! Storage backends for the snip URL shortener.
//!
//! Three implementations of [`snip_core::Repository`]: an in-memory map, an
//! append-only file log replayed on open, and PostgreSQL with tombstones.
//! [`open`] picks one from a [`StorageConfig`].

pub mod config;
mod error;
pub mod file;
mod index;
pub mod memory;
pub mod postgres;

pub use config::{open, BackendKind, StorageConfig};
pub use file::{FileLogRepository, ReplayStats};
pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;
pub use snip_core::{
    BatchDeleter, DeletionRequest, OwnerId, ReadRepository, Repository, Result, ShortKey,
    Statistics, StorageError, UrlEntry,
};
