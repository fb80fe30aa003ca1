mod cli;

use crate::cli::{Command, CLI};
use anyhow::Context;
use clap::Parser;
use snip_deleter::{DeletionPipeline, PipelineConfig};
use snip_shortener::config::DEFAULT_BASE_URL;
use snip_shortener::{
    BatchItem, FileConfig, OwnerId, ServiceConfig, ShortenerError, ShortenerService,
};
use snip_storage::StorageConfig;
use snip_telemetry::TelemetryConfig;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CLI::parse();

    snip_telemetry::init(&TelemetryConfig {
        level: cli.log_level.clone(),
        format: cli.log_format.into(),
    })?;

    let file = match cli.config.as_deref() {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };

    let storage = StorageConfig::builder()
        .database_dsn(cli.database_dsn.clone().or(file.database_dsn))
        .file_storage_path(cli.file_storage_path.clone().or(file.file_storage_path))
        .ping_timeout(Duration::from_millis(cli.ping_timeout_ms))
        .build();
    let service_config = ServiceConfig::builder()
        .base_url(
            cli.base_url
                .clone()
                .or(file.base_url)
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        )
        .operation_timeout(Duration::from_millis(cli.operation_timeout_ms))
        .ping_timeout(Duration::from_millis(cli.ping_timeout_ms))
        .build();

    info!(
        backend = %storage.backend_kind(),
        base_url = %service_config.base_url,
        "starting snip"
    );

    let repository = snip_storage::open(&storage)
        .await
        .context("failed to open storage backend")?;
    let pipeline = DeletionPipeline::spawn(Arc::clone(&repository), PipelineConfig::default());
    let service = ShortenerService::new(repository, Arc::new(pipeline), service_config);

    let owner = OwnerId::new(cli.owner);
    let outcome = run(&service, &owner, cli.command).await;
    let shutdown = service.shutdown().await;

    outcome?;
    shutdown?;
    Ok(())
}

async fn run(service: &ShortenerService, owner: &OwnerId, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Shorten { url } => match service.shorten(owner, &url).await {
            Ok(short_url) => println!("{short_url}"),
            Err(ShortenerError::AlreadyExists { short_url }) => {
                warn!(%short_url, "url was already shortened");
                println!("{short_url}");
            }
            Err(e) => return Err(e.into()),
        },
        Command::ShortenBatch { input } => {
            let raw = match input {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                None => {
                    let mut buf = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buf)
                        .context("failed to read stdin")?;
                    buf
                }
            };
            let items: Vec<BatchItem> =
                serde_json::from_str(&raw).context("batch input must be a JSON array")?;
            let results = service.shorten_batch(owner, items).await?;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Command::Resolve { key } => {
            println!("{}", service.resolve(owner, &key).await?);
        }
        Command::List => {
            let urls = service.list(owner).await?;
            println!("{}", serde_json::to_string_pretty(&urls)?);
        }
        Command::Delete { keys } => {
            service.delete(owner, &keys).await?;
            info!(count = keys.len(), "deletion queued");
        }
        Command::Ping => {
            service.ping().await?;
            println!("ok");
        }
        Command::Stats => {
            let stats = service.statistics().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }
    Ok(())
}
