//! Tracing subscriber setup shared by snip binaries.

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Default filter directive, e.g. `info` or `snip_storage=debug`.
    /// `RUST_LOG` overrides it when set.
    pub level: String,
    pub format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log filter '{directive}': {message}")]
    InvalidFilter { directive: String, message: String },
    #[error("failed to install subscriber: {0}")]
    Install(String),
}

pub fn env_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level).map_err(|e| TelemetryError::InvalidFilter {
        directive: config.level.clone(),
        message: e.to_string(),
    })
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = env_filter(config)?;
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let installed = match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.json())
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init(),
    };
    installed.map_err(|e| TelemetryError::Install(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_directive() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let config = TelemetryConfig {
            level: "snip=loud".to_string(),
            format: LogFormat::Json,
        };
        assert!(matches!(
            env_filter(&config),
            Err(TelemetryError::InvalidFilter { .. })
        ));
    }

    #[test]
    fn second_init_fails() {
        let config = TelemetryConfig::default();
        let _ = init(&config);
        assert!(matches!(init(&config), Err(TelemetryError::Install(_))));
    }
}
