use std::sync::Arc;
use std::time::Duration;

use snip_core::{
    BatchDeleter, DeletionRequest, OwnerId, ReadRepository, Repository, ShortKey, Statistics,
    StorageError, UrlEntry,
};
use snip_deleter::{DeletionPipeline, PipelineConfig};
use snip_storage::PostgresRepository;
use snip_test_infra::postgres::{PostgresConfig, PostgresServer};
use sqlx::postgres::PgPoolOptions;

struct Fixture {
    _postgres: PostgresServer,
    repo: Arc<PostgresRepository>,
}

impl Fixture {
    async fn start() -> Self {
        let postgres = PostgresServer::new(PostgresConfig::builder().build())
            .await
            .expect("start postgres");
        let url = postgres.database_url().await.expect("postgres url");
        let pool = connect_with_retry(&url).await;
        let repo = PostgresRepository::new(pool, Duration::from_secs(1))
            .await
            .expect("apply migrations");

        Self {
            _postgres: postgres,
            repo: Arc::new(repo),
        }
    }
}

async fn connect_with_retry(url: &str) -> sqlx::PgPool {
    let mut last_error = None;

    for _ in 0..20 {
        match PgPoolOptions::new().max_connections(5).connect(url).await {
            Ok(pool) => return pool,
            Err(err) => {
                last_error = Some(err);
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
    }

    panic!("failed to connect postgres: {last_error:?}");
}

fn owner(value: &str) -> OwnerId {
    OwnerId::new(value)
}

fn key(value: &str) -> ShortKey {
    ShortKey::new_unchecked(value)
}

fn deletion(o: &str, k: &str) -> DeletionRequest {
    DeletionRequest::new(owner(o), key(k))
}

#[tokio::test]
async fn put_conflicts_when_pair_is_live() {
    let fixture = Fixture::start().await;

    fixture
        .repo
        .put(&owner("u1"), &key("k1"), "https://example.com/")
        .await
        .unwrap();
    let err = fixture
        .repo
        .put(&owner("u1"), &key("k1"), "https://other.com/")
        .await
        .unwrap_err();

    assert!(matches!(err, StorageError::Conflict { .. }));
    assert_eq!(
        fixture.repo.get(&owner("u1"), &key("k1")).await.unwrap(),
        "https://example.com/"
    );
    fixture
        .repo
        .put(&owner("u2"), &key("k1"), "https://other.com/")
        .await
        .unwrap();
}

#[tokio::test]
async fn tombstone_is_gone_once_then_not_found() {
    let fixture = Fixture::start().await;
    fixture
        .repo
        .put(&owner("u1"), &key("k1"), "https://example.com/")
        .await
        .unwrap();

    fixture.repo.delete_batch(&[deletion("u1", "k1")]).await.unwrap();

    assert!(matches!(
        fixture.repo.get(&owner("u1"), &key("k1")).await.unwrap_err(),
        StorageError::Gone(_)
    ));
    assert!(matches!(
        fixture.repo.get(&owner("u1"), &key("k1")).await.unwrap_err(),
        StorageError::NotFound(_)
    ));
}

#[tokio::test]
async fn delete_batch_is_idempotent_and_ignores_unknown_pairs() {
    let fixture = Fixture::start().await;
    fixture
        .repo
        .put(&owner("u1"), &key("k1"), "https://a.com/")
        .await
        .unwrap();
    fixture
        .repo
        .put(&owner("u1"), &key("k2"), "https://b.com/")
        .await
        .unwrap();

    let batch = [deletion("u1", "k1"), deletion("u1", "missing"), deletion("u9", "k2")];
    fixture.repo.delete_batch(&batch).await.unwrap();
    fixture.repo.delete_batch(&batch).await.unwrap();
    fixture.repo.delete_batch(&[]).await.unwrap();

    assert_eq!(
        fixture.repo.statistics().await.unwrap(),
        Statistics { urls: 1, users: 1 }
    );
}

#[tokio::test]
async fn list_excludes_and_compacts_tombstones() {
    let fixture = Fixture::start().await;
    for (k, url) in [("k1", "https://a.com/"), ("k2", "https://b.com/"), ("k3", "https://c.com/")] {
        fixture.repo.put(&owner("u1"), &key(k), url).await.unwrap();
    }
    fixture.repo.delete_batch(&[deletion("u1", "k2")]).await.unwrap();

    let listed = fixture.repo.list_by_owner(&owner("u1")).await.unwrap();
    assert_eq!(
        listed,
        vec![
            UrlEntry::new(key("k1"), "https://a.com/"),
            UrlEntry::new(key("k3"), "https://c.com/"),
        ]
    );

    // The tombstone was removed by the listing.
    assert!(matches!(
        fixture.repo.get(&owner("u1"), &key("k2")).await.unwrap_err(),
        StorageError::NotFound(_)
    ));
}

#[tokio::test]
async fn list_distinguishes_all_deleted_from_empty() {
    let fixture = Fixture::start().await;
    fixture
        .repo
        .put(&owner("u1"), &key("k1"), "https://a.com/")
        .await
        .unwrap();
    fixture.repo.delete_batch(&[deletion("u1", "k1")]).await.unwrap();

    assert!(matches!(
        fixture.repo.list_by_owner(&owner("u1")).await.unwrap_err(),
        StorageError::AllDeleted(_)
    ));
    assert!(fixture.repo.list_by_owner(&owner("u1")).await.unwrap().is_empty());
    assert!(fixture.repo.list_by_owner(&owner("nobody")).await.unwrap().is_empty());
}

#[tokio::test]
async fn put_revives_tombstoned_pair() {
    let fixture = Fixture::start().await;
    fixture
        .repo
        .put(&owner("u1"), &key("k1"), "https://old.com/")
        .await
        .unwrap();
    fixture.repo.delete_batch(&[deletion("u1", "k1")]).await.unwrap();

    fixture
        .repo
        .put(&owner("u1"), &key("k1"), "https://new.com/")
        .await
        .unwrap();

    assert_eq!(
        fixture.repo.get(&owner("u1"), &key("k1")).await.unwrap(),
        "https://new.com/"
    );
}

#[tokio::test]
async fn put_batch_touching_live_pair_writes_nothing() {
    let fixture = Fixture::start().await;
    fixture
        .repo
        .put(&owner("u1"), &key("k1"), "https://a.com/")
        .await
        .unwrap();

    let err = fixture
        .repo
        .put_batch(
            &owner("u1"),
            vec![
                UrlEntry::new(key("k1"), "https://other.com/"),
                UrlEntry::new(key("k2"), "https://b.com/"),
                UrlEntry::new(key("k3"), "https://c.com/"),
            ],
        )
        .await
        .unwrap_err();

    assert_eq!(
        err,
        StorageError::Conflict {
            owner: "u1".to_string(),
            short_key: "k1".to_string(),
        }
    );
    assert_eq!(
        fixture.repo.get(&owner("u1"), &key("k1")).await.unwrap(),
        "https://a.com/"
    );
    for k in ["k2", "k3"] {
        assert!(matches!(
            fixture.repo.get(&owner("u1"), &key(k)).await.unwrap_err(),
            StorageError::NotFound(_)
        ));
    }
}

#[tokio::test]
async fn put_batch_revives_tombstones_and_writes_all() {
    let fixture = Fixture::start().await;
    fixture
        .repo
        .put(&owner("u1"), &key("k1"), "https://a.com/")
        .await
        .unwrap();
    fixture
        .repo
        .delete_batch(&[deletion("u1", "k1")])
        .await
        .unwrap();

    let entries = vec![
        UrlEntry::new(key("k1"), "https://new.com/"),
        UrlEntry::new(key("k2"), "https://b.com/"),
    ];
    let written = fixture
        .repo
        .put_batch(&owner("u1"), entries.clone())
        .await
        .unwrap();

    assert_eq!(written, entries);
    assert_eq!(
        fixture.repo.get(&owner("u1"), &key("k1")).await.unwrap(),
        "https://new.com/"
    );
}

#[tokio::test]
async fn put_batch_rolls_back_on_failure() {
    let fixture = Fixture::start().await;

    // NUL bytes are rejected by PostgreSQL text columns.
    let err = fixture
        .repo
        .put_batch(
            &owner("u1"),
            vec![
                UrlEntry::new(key("k1"), "https://a.com/"),
                UrlEntry::new(key("k2"), "https://b.com/\0"),
            ],
        )
        .await
        .unwrap_err();

    assert!(!matches!(err, StorageError::Conflict { .. }));
    assert!(matches!(
        fixture.repo.get(&owner("u1"), &key("k1")).await.unwrap_err(),
        StorageError::NotFound(_)
    ));
}

#[tokio::test]
async fn ping_and_close() {
    let fixture = Fixture::start().await;

    fixture.repo.ping().await.unwrap();
    fixture.repo.close().await.unwrap();

    assert!(fixture.repo.ping().await.unwrap_err().is_retryable());
}

#[tokio::test]
async fn create_conflict_read_delete_through_pipeline() {
    let fixture = Fixture::start().await;
    let pipeline = DeletionPipeline::spawn(Arc::clone(&fixture.repo), PipelineConfig::default());

    fixture
        .repo
        .put(&owner("u1"), &key("k1"), "https://example.com/")
        .await
        .unwrap();
    assert!(matches!(
        fixture
            .repo
            .put(&owner("u1"), &key("k1"), "https://other.com/")
            .await
            .unwrap_err(),
        StorageError::Conflict { .. }
    ));
    assert_eq!(
        fixture.repo.get(&owner("u1"), &key("k1")).await.unwrap(),
        "https://example.com/"
    );

    pipeline.submit_one(deletion("u1", "k1")).await.unwrap();
    pipeline.flush().await.unwrap();

    assert!(matches!(
        fixture.repo.get(&owner("u1"), &key("k1")).await.unwrap_err(),
        StorageError::Gone(_)
    ));
    assert!(matches!(
        fixture.repo.get(&owner("u1"), &key("k1")).await.unwrap_err(),
        StorageError::NotFound(_)
    ));

    pipeline.shutdown().await.unwrap();
    assert_eq!(pipeline.stats().flushed_requests, 1);
}
