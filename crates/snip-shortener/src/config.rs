use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use typed_builder::TypedBuilder;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {message}")]
    Read { path: PathBuf, message: String },
    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Settings read from the JSON file named by `--config`.
///
/// Every field is optional; flags and environment variables take
/// precedence over it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub database_dsn: Option<String>,
    pub file_storage_path: Option<PathBuf>,
    pub base_url: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

#[derive(Debug, Clone, TypedBuilder)]
pub struct ServiceConfig {
    /// Prefix of rendered short URLs.
    #[builder(default = DEFAULT_BASE_URL.to_string(), setter(into))]
    pub base_url: String,
    /// Deadline applied to every backend call except `ping`.
    #[builder(default = DEFAULT_OPERATION_TIMEOUT)]
    pub operation_timeout: Duration,
    #[builder(default = DEFAULT_PING_TIMEOUT)]
    pub ping_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}
