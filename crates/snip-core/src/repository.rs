use crate::error::Result;
use crate::shortkey::{OwnerId, ShortKey};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One `{short_key, original_url}` pair, as written in a batch or listed for an owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlEntry {
    pub short_key: ShortKey,
    pub original_url: String,
}

impl UrlEntry {
    pub fn new(short_key: ShortKey, original_url: impl Into<String>) -> Self {
        Self {
            short_key,
            original_url: original_url.into(),
        }
    }
}

/// A request to delete one owner's short key.
///
/// The same pair may be submitted more than once; deletes are idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeletionRequest {
    pub owner: OwnerId,
    pub short_key: ShortKey,
}

impl DeletionRequest {
    pub fn new(owner: OwnerId, short_key: ShortKey) -> Self {
        Self { owner, short_key }
    }
}

/// Live record counts across all owners.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    /// Number of live URL records.
    pub urls: u64,
    /// Number of owners holding at least one live record.
    pub users: u64,
}

/// Read side of the storage contract.
#[async_trait]
pub trait ReadRepository: Send + Sync + 'static {
    /// Returns the original URL stored for the pair.
    ///
    /// Fails with `NotFound` when no record exists and with `Gone` when the
    /// record was tombstoned; a backend may physically remove the tombstone
    /// as a side effect.
    async fn get(&self, owner: &OwnerId, short_key: &ShortKey) -> Result<String>;

    /// Returns every live record of the owner.
    ///
    /// Backends with tombstones exclude them (and may remove them); when the
    /// owner had records but all were tombstoned this fails with `AllDeleted`.
    async fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<UrlEntry>>;

    async fn statistics(&self) -> Result<Statistics>;
}

/// The one capability the deletion pipeline needs from a backend.
#[async_trait]
pub trait BatchDeleter: Send + Sync + 'static {
    /// Tombstones (or removes) every pair. Unknown pairs are ignored and
    /// repeating a delete is a no-op.
    async fn delete_batch(&self, requests: &[DeletionRequest]) -> Result<()>;
}

/// The storage engine contract shared by every backend.
#[async_trait]
pub trait Repository: ReadRepository + BatchDeleter {
    /// Inserts a new live record. Returns `Err(Conflict)` if a live record
    /// already exists for the pair.
    async fn put(&self, owner: &OwnerId, short_key: &ShortKey, original_url: &str) -> Result<()>;

    /// Inserts several records for one owner and returns the entries written.
    async fn put_batch(&self, owner: &OwnerId, entries: Vec<UrlEntry>) -> Result<Vec<UrlEntry>>;

    /// Liveness probe, bounded by the backend's own short timeout.
    async fn ping(&self) -> Result<()>;

    /// Releases backend resources. Called once during shutdown.
    async fn close(&self) -> Result<()>;
}
