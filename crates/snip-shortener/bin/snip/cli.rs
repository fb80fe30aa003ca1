use clap::{Parser, Subcommand, ValueEnum};
use snip_telemetry::LogFormat;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const DATABASE_DSN_ENV: &str = "DATABASE_DSN";
pub const FILE_STORAGE_PATH_ENV: &str = "FILE_STORAGE_PATH";
pub const BASE_URL_ENV: &str = "BASE_URL";
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";
pub const OPERATION_TIMEOUT_ENV: &str = "OPERATION_TIMEOUT_MS";
pub const PING_TIMEOUT_ENV: &str = "PING_TIMEOUT_MS";
pub const CONFIG_ENV: &str = "CONFIG";
pub const OWNER_ENV: &str = "SNIP_OWNER";

pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 3000;
pub const DEFAULT_PING_TIMEOUT_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    #[value(name = "pretty")]
    Pretty,
    #[value(name = "json")]
    Json,
}

impl Display for LogFormatArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormatArg::Pretty => write!(f, "pretty"),
            LogFormatArg::Json => write!(f, "json"),
        }
    }
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "snip", about = "Shorten, resolve and delete URLs")]
pub struct CLI {
    /// PostgreSQL connection string; selects the relational backend.
    #[arg(long, global = true, env = DATABASE_DSN_ENV)]
    pub database_dsn: Option<String>,

    /// Append-only log file; selects the file backend when no DSN is set.
    #[arg(long, global = true, env = FILE_STORAGE_PATH_ENV)]
    pub file_storage_path: Option<PathBuf>,

    /// Prefix of rendered short URLs.
    #[arg(long, global = true, env = BASE_URL_ENV)]
    pub base_url: Option<String>,

    #[arg(long, global = true, env = LOG_LEVEL_ENV, default_value = DEFAULT_LOG_LEVEL)]
    pub log_level: String,

    #[arg(
        long,
        global = true,
        env = LOG_FORMAT_ENV,
        value_enum,
        default_value_t = LogFormatArg::Pretty
    )]
    pub log_format: LogFormatArg,

    #[arg(
        long,
        global = true,
        env = OPERATION_TIMEOUT_ENV,
        default_value_t = DEFAULT_OPERATION_TIMEOUT_MS
    )]
    pub operation_timeout_ms: u64,

    #[arg(
        long,
        global = true,
        env = PING_TIMEOUT_ENV,
        default_value_t = DEFAULT_PING_TIMEOUT_MS
    )]
    pub ping_timeout_ms: u64,

    /// JSON file with `database_dsn`, `file_storage_path` and `base_url`.
    #[arg(long, global = true, env = CONFIG_ENV)]
    pub config: Option<PathBuf>,

    /// Owner the command acts for. Empty means anonymous.
    #[arg(long, global = true, env = OWNER_ENV, default_value = "")]
    pub owner: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Shorten one URL and print the short URL.
    Shorten { url: String },
    /// Shorten a JSON array of `{correlation_id, original_url}` items.
    ShortenBatch {
        /// Read the items from this file instead of stdin.
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Print the original URL behind a short key.
    Resolve { key: String },
    /// Print the owner's URLs as JSON.
    List,
    /// Queue short keys for deletion.
    Delete {
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Check that the backend is reachable.
    Ping,
    /// Print counts of live URLs and owners.
    Stats,
}
