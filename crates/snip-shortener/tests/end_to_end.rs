use std::sync::Arc;
use std::time::Duration;

use snip_core::{ReadRepository, Repository};
use snip_deleter::{DeletionPipeline, PipelineConfig};
use snip_shortener::{OwnerId, ServiceConfig, ShortenerError, ShortenerService, Statistics};
use snip_storage::{FileLogRepository, InMemoryRepository, StorageConfig};

const BASE_URL: &str = "http://localhost:8080";

fn service_over(repository: Arc<dyn Repository>) -> ShortenerService {
    let pipeline = DeletionPipeline::spawn(
        Arc::clone(&repository),
        PipelineConfig::builder()
            .flush_interval(Duration::from_secs(3600))
            .build(),
    );
    ShortenerService::new(
        repository,
        Arc::new(pipeline),
        ServiceConfig::builder().base_url(BASE_URL).build(),
    )
}

#[tokio::test]
async fn create_conflict_read_delete_over_memory() {
    let service = service_over(Arc::new(InMemoryRepository::new()));
    let u1 = OwnerId::new("u1");

    let short_url = service.shorten(&u1, "https://example.com/").await.unwrap();
    assert_eq!(short_url, format!("{BASE_URL}/0f115db0"));

    let err = service.shorten(&u1, "https://example.com/").await.unwrap_err();
    assert_eq!(err, ShortenerError::AlreadyExists { short_url });
    assert_eq!(err.status_code(), 409);

    assert_eq!(
        service.resolve(&u1, "0f115db0").await.unwrap(),
        "https://example.com/"
    );

    service.delete(&u1, &["0f115db0".to_string()]).await.unwrap();
    service.flush_deletions().await.unwrap();

    let err = service.resolve(&u1, "0f115db0").await.unwrap_err();
    assert_eq!(err.status_code(), 404);

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn deletes_queued_before_shutdown_are_applied() {
    let repository = Arc::new(InMemoryRepository::new());
    let service = service_over(Arc::clone(&repository) as Arc<dyn Repository>);
    let u1 = OwnerId::new("u1");

    service.shorten(&u1, "https://a.example/").await.unwrap();
    service.shorten(&u1, "https://b.example/").await.unwrap();
    assert_eq!(
        service.statistics().await.unwrap(),
        Statistics { urls: 2, users: 1 }
    );

    let keys: Vec<String> = service
        .list(&u1)
        .await
        .unwrap()
        .into_iter()
        .map(|url| url.short_url.rsplit('/').next().unwrap().to_string())
        .collect();
    service.delete(&u1, &keys).await.unwrap();
    service.shutdown().await.unwrap();

    assert!(repository.list_by_owner(&u1).await.unwrap().is_empty());
}

#[tokio::test]
async fn file_backend_survives_restart() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("urls.log");
    let u1 = OwnerId::new("u1");

    {
        let service = service_over(Arc::new(FileLogRepository::open(&path).unwrap()));
        service.shorten(&u1, "https://example.com/").await.unwrap();
        service.ping().await.unwrap();
    }

    let config = StorageConfig::builder()
        .file_storage_path(Some(path.clone()))
        .build();
    let service = service_over(snip_storage::open(&config).await.unwrap());

    assert_eq!(
        service.resolve(&u1, "0f115db0").await.unwrap(),
        "https://example.com/"
    );
    assert!(matches!(
        service.shorten(&u1, "https://example.com/").await.unwrap_err(),
        ShortenerError::AlreadyExists { .. }
    ));

    // The file backend cannot delete; the failed flush is dropped.
    service.delete(&u1, &["0f115db0".to_string()]).await.unwrap();
    service.flush_deletions().await.unwrap();
    assert!(service.resolve(&u1, "0f115db0").await.is_ok());

    service.shutdown().await.unwrap();
}
