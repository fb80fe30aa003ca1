use crate::config::ServiceConfig;
use crate::error::ShortenerError;
use serde::{Deserialize, Serialize};
use snip_core::{
    validate_url, with_deadline, DeletionRequest, OwnerId, ReadRepository, Repository, ShortKey,
    Statistics, StorageError, UrlEntry,
};
use snip_deleter::DeletionPipeline;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// One item of a batch shorten request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    pub correlation_id: String,
    pub original_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub correlation_id: String,
    pub short_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortenedUrl {
    pub short_url: String,
    pub original_url: String,
}

/// Shortener facade over a storage backend.
///
/// Creates and reads go straight to the repository under the operation
/// deadline. Deletes are queued on the [`DeletionPipeline`] and applied later
/// in batches.
pub struct ShortenerService {
    repository: Arc<dyn Repository>,
    deleter: Arc<DeletionPipeline>,
    config: ServiceConfig,
    closed: AtomicBool,
}

impl ShortenerService {
    pub fn new(
        repository: Arc<dyn Repository>,
        deleter: Arc<DeletionPipeline>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            repository,
            deleter,
            config,
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    fn short_url(&self, key: &ShortKey) -> String {
        key.to_url(&self.config.base_url)
    }

    /// Shortens `original_url` for `owner` and returns the full short URL.
    ///
    /// Shortening a URL the owner already shortened fails with
    /// [`ShortenerError::AlreadyExists`] carrying the existing short URL.
    pub async fn shorten(
        &self,
        owner: &OwnerId,
        original_url: &str,
    ) -> Result<String, ShortenerError> {
        validate_url(original_url)?;
        let key = ShortKey::derive(original_url);

        let stored = with_deadline(
            self.config.operation_timeout,
            "put",
            self.repository.put(owner, &key, original_url),
        )
        .await;

        match stored {
            Ok(()) => {
                debug!(owner = %owner, short_key = %key, "shortened url");
                Ok(self.short_url(&key))
            }
            Err(StorageError::Conflict { .. }) => Err(ShortenerError::AlreadyExists {
                short_url: self.short_url(&key),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Shortens several URLs at once.
    ///
    /// Every URL is validated before anything is written, and repeated URLs
    /// are written once. Backends that write the batch as one unit reject it
    /// with [`ShortenerError::AlreadyExists`] when any key is already live;
    /// the others leave such items out of the result.
    pub async fn shorten_batch(
        &self,
        owner: &OwnerId,
        items: Vec<BatchItem>,
    ) -> Result<Vec<BatchResult>, ShortenerError> {
        for item in &items {
            validate_url(&item.original_url)?;
        }

        let keyed: Vec<(String, ShortKey, String)> = items
            .into_iter()
            .map(|item| {
                let key = ShortKey::derive(&item.original_url);
                (item.correlation_id, key, item.original_url)
            })
            .collect();
        let mut seen = HashSet::new();
        let entries = keyed
            .iter()
            .filter(|(_, key, _)| seen.insert(key.clone()))
            .map(|(_, key, url)| UrlEntry::new(key.clone(), url.clone()))
            .collect();

        let written = with_deadline(
            self.config.operation_timeout,
            "put_batch",
            self.repository.put_batch(owner, entries),
        )
        .await
        .map_err(|e| match e {
            StorageError::Conflict { short_key, .. } => ShortenerError::AlreadyExists {
                short_url: self.short_url(&ShortKey::new_unchecked(short_key)),
            },
            other => other.into(),
        })?;
        let written: HashSet<ShortKey> = written.into_iter().map(|entry| entry.short_key).collect();

        let results: Vec<BatchResult> = keyed
            .into_iter()
            .filter(|(_, key, _)| written.contains(key))
            .map(|(correlation_id, key, _)| BatchResult {
                correlation_id,
                short_url: self.short_url(&key),
            })
            .collect();
        debug!(owner = %owner, count = results.len(), "shortened batch");
        Ok(results)
    }

    /// Returns the original URL behind `short_key`.
    pub async fn resolve(&self, owner: &OwnerId, short_key: &str) -> Result<String, ShortenerError> {
        let key = ShortKey::new(short_key)?;
        Ok(with_deadline(
            self.config.operation_timeout,
            "get",
            self.repository.get(owner, &key),
        )
        .await?)
    }

    /// Lists the owner's live URLs. An owner whose URLs were all deleted
    /// gets [`ShortenerError::Deleted`].
    pub async fn list(&self, owner: &OwnerId) -> Result<Vec<ShortenedUrl>, ShortenerError> {
        let entries = with_deadline(
            self.config.operation_timeout,
            "list_by_owner",
            self.repository.list_by_owner(owner),
        )
        .await?;

        Ok(entries
            .into_iter()
            .map(|entry| ShortenedUrl {
                short_url: self.short_url(&entry.short_key),
                original_url: entry.original_url,
            })
            .collect())
    }

    /// Queues the owner's keys for deletion and returns immediately.
    ///
    /// Keys that are not well-formed cannot exist and are skipped.
    pub async fn delete(&self, owner: &OwnerId, short_keys: &[String]) -> Result<(), ShortenerError> {
        let requests: Vec<DeletionRequest> = short_keys
            .iter()
            .filter_map(|raw| match ShortKey::new(raw.as_str()) {
                Ok(key) => Some(DeletionRequest::new(owner.clone(), key)),
                Err(e) => {
                    warn!(owner = %owner, error = %e, "skipping malformed key in delete request");
                    None
                }
            })
            .collect();

        let count = requests.len();
        self.deleter.submit(requests).await?;
        debug!(owner = %owner, count, "queued deletions");
        Ok(())
    }

    /// Applies every queued deletion now.
    pub async fn flush_deletions(&self) -> Result<(), ShortenerError> {
        Ok(self.deleter.flush().await?)
    }

    pub async fn ping(&self) -> Result<(), ShortenerError> {
        Ok(with_deadline(self.config.ping_timeout, "ping", self.repository.ping()).await?)
    }

    pub async fn statistics(&self) -> Result<Statistics, ShortenerError> {
        Ok(with_deadline(
            self.config.operation_timeout,
            "statistics",
            self.repository.statistics(),
        )
        .await?)
    }

    /// Drains the deletion pipeline, then closes the backend.
    ///
    /// The backend is closed exactly once even if this is called again or
    /// the drain times out. The first error is returned.
    pub async fn shutdown(&self) -> Result<(), ShortenerError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let drained = self.deleter.shutdown().await;
        if let Err(e) = &drained {
            error!(error = %e, "deletion pipeline did not drain cleanly");
        }

        let closed = self.repository.close().await;
        match &closed {
            Ok(()) => info!("storage backend closed"),
            Err(e) => error!(error = %e, "failed to close storage backend"),
        }

        drained?;
        Ok(closed?)
    }
}
