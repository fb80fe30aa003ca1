use crate::error::{is_unique_violation, map_migrate_error, map_sqlx_error};
use async_trait::async_trait;
use snip_core::{
    with_deadline, BatchDeleter, DeletionRequest, OwnerId, ReadRepository, Repository, Result,
    ShortKey, Statistics, StorageError, UrlEntry,
};
use sqlx::migrate::Migrator;
use sqlx::{PgExecutor, PgPool, Row};
use std::time::Duration;
use tracing::{debug, warn};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const INSERT_OR_REVIVE: &str = r#"
    INSERT INTO url_records (owner_id, short_key, original_url, deleted)
    VALUES ($1, $2, $3, FALSE)
    ON CONFLICT (owner_id, short_key) DO UPDATE
    SET original_url = EXCLUDED.original_url,
        deleted = FALSE
    WHERE url_records.deleted
"#;

/// PostgreSQL implementation of the repository contract.
///
/// Deletes flip the `deleted` tombstone. Tombstoned rows are physically
/// removed lazily: the next `get` or `list_by_owner` that encounters one
/// reports it and then deletes the row. Inserting over a tombstoned pair
/// revives it as a fresh live record. Batch writes are all-or-nothing: a
/// batch touching a live pair fails with a conflict and writes nothing.
#[derive(Debug, Clone)]
pub struct PostgresRepository {
    pool: PgPool,
    ping_timeout: Duration,
}

impl PostgresRepository {
    /// Creates a repository from an existing pool and applies pending
    /// schema migrations.
    pub async fn new(pool: PgPool, ping_timeout: Duration) -> Result<Self> {
        MIGRATOR.run(&pool).await.map_err(map_migrate_error)?;
        Ok(Self { pool, ping_timeout })
    }

    /// Creates a repository by opening a new connection pool.
    pub async fn connect(database_url: &str, ping_timeout: Duration) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        Self::new(pool, ping_timeout).await
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn compact_one(&self, owner: &OwnerId, short_key: &ShortKey) {
        let result = sqlx::query(
            r#"
            DELETE FROM url_records
            WHERE owner_id = $1
              AND short_key = $2
              AND deleted
            "#,
        )
        .bind(owner.as_str())
        .bind(short_key.as_str())
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            warn!(owner = %owner, short_key = %short_key, error = %e, "failed to remove tombstone");
        }
    }
}

/// Inserts a live record or revives a tombstoned one.
///
/// A live record for the pair is a [`StorageError::Conflict`], whether the
/// upsert skips it or a concurrent insert trips the unique constraint.
async fn insert_live<'e, E>(
    executor: E,
    owner: &OwnerId,
    short_key: &ShortKey,
    original_url: &str,
) -> Result<()>
where
    E: PgExecutor<'e>,
{
    let conflict = || StorageError::Conflict {
        owner: owner.to_string(),
        short_key: short_key.to_string(),
    };

    let result = sqlx::query(INSERT_OR_REVIVE)
        .bind(owner.as_str())
        .bind(short_key.as_str())
        .bind(original_url)
        .execute(executor)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                conflict()
            } else {
                map_sqlx_error(e)
            }
        })?;

    if result.rows_affected() == 0 {
        return Err(conflict());
    }
    Ok(())
}

#[async_trait]
impl ReadRepository for PostgresRepository {
    async fn get(&self, owner: &OwnerId, short_key: &ShortKey) -> Result<String> {
        let row = sqlx::query(
            r#"
            SELECT original_url, deleted
            FROM url_records
            WHERE owner_id = $1
              AND short_key = $2
            "#,
        )
        .bind(owner.as_str())
        .bind(short_key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Err(StorageError::NotFound(short_key.to_string()));
        };

        let deleted: bool = row.try_get("deleted").map_err(map_sqlx_error)?;
        if deleted {
            self.compact_one(owner, short_key).await;
            return Err(StorageError::Gone(short_key.to_string()));
        }

        row.try_get("original_url").map_err(map_sqlx_error)
    }

    async fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<UrlEntry>> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let rows = sqlx::query(
            r#"
            SELECT short_key, original_url, deleted
            FROM url_records
            WHERE owner_id = $1
            ORDER BY short_key
            "#,
        )
        .bind(owner.as_str())
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let mut live = Vec::with_capacity(rows.len());
        let mut tombstones = Vec::new();
        for row in &rows {
            let short_key: String = row.try_get("short_key").map_err(map_sqlx_error)?;
            if row.try_get::<bool, _>("deleted").map_err(map_sqlx_error)? {
                tombstones.push(short_key);
                continue;
            }
            let original_url: String = row.try_get("original_url").map_err(map_sqlx_error)?;
            live.push(UrlEntry::new(ShortKey::new_unchecked(short_key), original_url));
        }

        if tombstones.is_empty() {
            tx.commit().await.map_err(map_sqlx_error)?;
        } else {
            let compacted = sqlx::query(
                r#"
                DELETE FROM url_records
                WHERE owner_id = $1
                  AND short_key = ANY($2)
                  AND deleted
                "#,
            )
            .bind(owner.as_str())
            .bind(tombstones.as_slice())
            .execute(&mut *tx)
            .await;

            match compacted {
                Ok(result) => {
                    tx.commit().await.map_err(map_sqlx_error)?;
                    debug!(owner = %owner, count = result.rows_affected(), "removed tombstones");
                }
                Err(e) => {
                    warn!(owner = %owner, count = tombstones.len(), error = %e, "failed to remove tombstones");
                    if let Err(e) = tx.rollback().await {
                        warn!(owner = %owner, error = %e, "rollback after failed compaction");
                    }
                }
            }
        }

        if live.is_empty() && !rows.is_empty() {
            return Err(StorageError::AllDeleted(owner.to_string()));
        }
        Ok(live)
    }

    async fn statistics(&self) -> Result<Statistics> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS urls, COUNT(DISTINCT owner_id) AS users
            FROM url_records
            WHERE NOT deleted
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let urls: i64 = row.try_get("urls").map_err(map_sqlx_error)?;
        let users: i64 = row.try_get("users").map_err(map_sqlx_error)?;
        Ok(Statistics {
            urls: urls as u64,
            users: users as u64,
        })
    }
}

#[async_trait]
impl BatchDeleter for PostgresRepository {
    async fn delete_batch(&self, requests: &[DeletionRequest]) -> Result<()> {
        if requests.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let mut tombstoned = 0u64;
        for request in requests {
            let result = sqlx::query(
                r#"
                UPDATE url_records
                SET deleted = TRUE
                WHERE owner_id = $1
                  AND short_key = $2
                "#,
            )
            .bind(request.owner.as_str())
            .bind(request.short_key.as_str())
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
            tombstoned += result.rows_affected();
        }
        tx.commit().await.map_err(map_sqlx_error)?;

        debug!(requested = requests.len(), tombstoned, "tombstoned batch");
        Ok(())
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn put(&self, owner: &OwnerId, short_key: &ShortKey, original_url: &str) -> Result<()> {
        insert_live(&self.pool, owner, short_key, original_url).await
    }

    async fn put_batch(&self, owner: &OwnerId, entries: Vec<UrlEntry>) -> Result<Vec<UrlEntry>> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        for entry in &entries {
            // Dropping `tx` on error rolls the whole batch back.
            insert_live(&mut *tx, owner, &entry.short_key, &entry.original_url).await?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        debug!(owner = %owner, count = entries.len(), "wrote batch");
        Ok(entries)
    }

    async fn ping(&self) -> Result<()> {
        with_deadline(self.ping_timeout, "ping", async {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map(|_| ())
                .map_err(map_sqlx_error)
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
