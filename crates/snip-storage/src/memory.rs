use crate::index::UrlIndex;
use async_trait::async_trait;
use parking_lot::RwLock;
use snip_core::{
    BatchDeleter, DeletionRequest, OwnerId, ReadRepository, Repository, Result, ShortKey,
    Statistics, StorageError, UrlEntry,
};
use tracing::debug;

/// In-memory implementation of the Repository trait.
///
/// A single reader/writer lock guards the whole index and is held only for
/// the map access itself. Nothing is persisted, and deletes remove entries
/// outright instead of tombstoning them.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    index: RwLock<UrlIndex>,
}

impl InMemoryRepository {
    /// Creates a new in-memory repository.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReadRepository for InMemoryRepository {
    async fn get(&self, owner: &OwnerId, short_key: &ShortKey) -> Result<String> {
        self.index
            .read()
            .get(owner, short_key)
            .map(str::to_owned)
            .ok_or_else(|| StorageError::NotFound(short_key.to_string()))
    }

    async fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<UrlEntry>> {
        Ok(self.index.read().list(owner))
    }

    async fn statistics(&self) -> Result<Statistics> {
        Ok(self.index.read().statistics())
    }
}

#[async_trait]
impl BatchDeleter for InMemoryRepository {
    async fn delete_batch(&self, requests: &[DeletionRequest]) -> Result<()> {
        let mut index = self.index.write();
        for request in requests {
            index.remove(&request.owner, &request.short_key);
        }
        Ok(())
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn put(&self, owner: &OwnerId, short_key: &ShortKey, original_url: &str) -> Result<()> {
        if !self.index.write().insert(owner, short_key, original_url) {
            return Err(StorageError::Conflict {
                owner: owner.to_string(),
                short_key: short_key.to_string(),
            });
        }
        Ok(())
    }

    async fn put_batch(&self, owner: &OwnerId, entries: Vec<UrlEntry>) -> Result<Vec<UrlEntry>> {
        let mut index = self.index.write();
        let mut written = Vec::with_capacity(entries.len());
        for entry in entries {
            if index.insert(owner, &entry.short_key, &entry.original_url) {
                written.push(entry);
            } else {
                debug!(owner = %owner, short_key = %entry.short_key, "skipping existing batch entry");
            }
        }
        Ok(written)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
