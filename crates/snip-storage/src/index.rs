use snip_core::{OwnerId, ShortKey, Statistics, UrlEntry};
use std::collections::HashMap;

/// Owner-scoped map of short keys to original URLs.
///
/// Shared by the in-memory and file-log backends. It holds no lock of its
/// own; each backend guards its index with a single reader/writer lock.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct UrlIndex {
    owners: HashMap<OwnerId, HashMap<ShortKey, String>>,
}

impl UrlIndex {
    pub(crate) fn contains(&self, owner: &OwnerId, short_key: &ShortKey) -> bool {
        self.get(owner, short_key).is_some()
    }

    pub(crate) fn get(&self, owner: &OwnerId, short_key: &ShortKey) -> Option<&str> {
        self.owners
            .get(owner)
            .and_then(|keys| keys.get(short_key))
            .map(String::as_str)
    }

    /// Inserts the pair unless it is already present. Never overwrites.
    pub(crate) fn insert(&mut self, owner: &OwnerId, short_key: &ShortKey, original_url: &str) -> bool {
        let keys = self.owners.entry(owner.clone()).or_default();
        if keys.contains_key(short_key) {
            return false;
        }
        keys.insert(short_key.clone(), original_url.to_owned());
        true
    }

    pub(crate) fn remove(&mut self, owner: &OwnerId, short_key: &ShortKey) -> bool {
        let Some(keys) = self.owners.get_mut(owner) else {
            return false;
        };
        let removed = keys.remove(short_key).is_some();
        if keys.is_empty() {
            self.owners.remove(owner);
        }
        removed
    }

    /// All entries of the owner, ordered by short key.
    pub(crate) fn list(&self, owner: &OwnerId) -> Vec<UrlEntry> {
        let mut entries: Vec<UrlEntry> = self
            .owners
            .get(owner)
            .map(|keys| {
                keys.iter()
                    .map(|(key, url)| UrlEntry::new(key.clone(), url.clone()))
                    .collect()
            })
            .unwrap_or_default();
        entries.sort_by(|a, b| a.short_key.cmp(&b.short_key));
        entries
    }

    pub(crate) fn statistics(&self) -> Statistics {
        Statistics {
            urls: self.owners.values().map(|keys| keys.len() as u64).sum(),
            users: self.owners.len() as u64,
        }
    }
}
