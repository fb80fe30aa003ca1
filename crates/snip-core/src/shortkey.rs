use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::Display;

/// Number of hex characters kept from the URL digest.
pub const DERIVED_KEY_LENGTH: usize = 8;

const MIN_LENGTH: usize = 1;
const MAX_LENGTH: usize = 64;

/// The compact identifier substituted for a long URL.
///
/// Keys are unique per owner, not globally: two owners may hold the same key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShortKey(String);

impl ShortKey {
    /// Derives the key for `original_url`.
    ///
    /// SHA-256 over the URL bytes, hex encoded, truncated to
    /// [`DERIVED_KEY_LENGTH`] characters. Identical inputs always yield
    /// identical keys. URLs whose digests share the prefix collide, and the
    /// second write for the same owner fails with a conflict.
    pub fn derive(original_url: &str) -> Self {
        let digest = Sha256::digest(original_url.as_bytes());
        let mut encoded = hex::encode(digest);
        encoded.truncate(DERIVED_KEY_LENGTH);
        Self(encoded)
    }

    /// Creates a `ShortKey` from caller input after validation.
    ///
    /// Valid keys are 1-64 characters of `[a-zA-Z0-9_-]`.
    pub fn new(key: impl Into<String>) -> Result<Self, CoreError> {
        let key = key.into();
        Self::validate(&key)?;
        Ok(Self(key))
    }

    /// Creates a `ShortKey` without validation.
    ///
    /// Use only for keys read back from trusted storage.
    pub fn new_unchecked(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Generates the full shortened URL based on the provided base URL.
    pub fn to_url(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(key: &str) -> Result<(), CoreError> {
        if key.len() < MIN_LENGTH || key.len() > MAX_LENGTH {
            return Err(CoreError::InvalidShortKey(format!(
                "length must be between {} and {}, got {}",
                MIN_LENGTH,
                MAX_LENGTH,
                key.len()
            )));
        }

        if !key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(CoreError::InvalidShortKey(format!(
                "must contain only alphanumeric characters, hyphens, or underscores: '{}'",
                key
            )));
        }

        Ok(())
    }
}

impl Display for ShortKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identifier of the user a record belongs to.
///
/// The empty id is the anonymous owner used by single-tenant deployments.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn anonymous() -> Self {
        Self(String::new())
    }

    pub fn is_anonymous(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for OwnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_is_deterministic() {
        let first = ShortKey::derive("https://example.com/");
        let second = ShortKey::derive("https://example.com/");
        assert_eq!(first, second);
    }

    #[test]
    fn derive_matches_sha256_prefix() {
        // sha256("https://example.com/") = 0f115db0...
        let key = ShortKey::derive("https://example.com/");
        assert_eq!(key.as_str(), "0f115db0");
        assert_eq!(key.as_str().len(), DERIVED_KEY_LENGTH);
    }

    #[test]
    fn derive_differs_for_distinct_urls() {
        assert_ne!(
            ShortKey::derive("https://example.com/"),
            ShortKey::derive("https://other.com/")
        );
    }

    #[test]
    fn derived_keys_pass_validation() {
        let key = ShortKey::derive("https://example.com/a?b=c");
        assert!(ShortKey::new(key.as_str()).is_ok());
    }

    #[test]
    fn rejects_invalid_keys() {
        assert!(ShortKey::new("").is_err());
        assert!(ShortKey::new("a".repeat(65)).is_err());
        assert!(ShortKey::new("abc/def").is_err());
        assert!(ShortKey::new("abc def").is_err());
    }

    #[test]
    fn to_url_trims_trailing_slash() {
        let key = ShortKey::new("abc123").unwrap();
        assert_eq!(key.to_url("http://localhost:8080"), "http://localhost:8080/abc123");
        assert_eq!(key.to_url("http://localhost:8080/"), "http://localhost:8080/abc123");
    }

    #[test]
    fn anonymous_owner_is_empty() {
        assert!(OwnerId::anonymous().is_anonymous());
        assert!(!OwnerId::new("u1").is_anonymous());
    }
}
