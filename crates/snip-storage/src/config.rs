use crate::{FileLogRepository, InMemoryRepository, PostgresRepository};
use snip_core::{Repository, Result};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use typed_builder::TypedBuilder;

pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(1);

/// Inputs for backend selection.
///
/// Empty strings are treated the same as absent values.
#[derive(Debug, Clone, TypedBuilder)]
pub struct StorageConfig {
    #[builder(default, setter(into))]
    pub database_dsn: Option<String>,
    #[builder(default, setter(into))]
    pub file_storage_path: Option<PathBuf>,
    #[builder(default = DEFAULT_PING_TIMEOUT)]
    pub ping_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendKind {
    Postgres(String),
    FileLog(PathBuf),
    InMemory,
}

/// Never prints the connection string, which may carry credentials.
impl Display for BackendKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Postgres(_) => write!(f, "postgres"),
            BackendKind::FileLog(path) => write!(f, "file({})", path.display()),
            BackendKind::InMemory => write!(f, "memory"),
        }
    }
}

impl StorageConfig {
    /// Connection string wins over file path; neither selects in-memory.
    pub fn backend_kind(&self) -> BackendKind {
        if let Some(dsn) = self.database_dsn.as_deref().filter(|dsn| !dsn.is_empty()) {
            return BackendKind::Postgres(dsn.to_owned());
        }
        if let Some(path) = self
            .file_storage_path
            .as_ref()
            .filter(|path| !path.as_os_str().is_empty())
        {
            return BackendKind::FileLog(path.clone());
        }
        BackendKind::InMemory
    }
}

/// Opens the backend selected by `config`.
pub async fn open(config: &StorageConfig) -> Result<Arc<dyn Repository>> {
    let repository: Arc<dyn Repository> = match config.backend_kind() {
        BackendKind::Postgres(dsn) => {
            info!(backend = "postgres", "opening storage backend");
            Arc::new(PostgresRepository::connect(&dsn, config.ping_timeout).await?)
        }
        BackendKind::FileLog(path) => {
            info!(backend = "file", path = %path.display(), "opening storage backend");
            Arc::new(FileLogRepository::open(path)?)
        }
        BackendKind::InMemory => {
            info!(backend = "memory", "opening storage backend");
            Arc::new(InMemoryRepository::new())
        }
    };
    Ok(repository)
}
