use async_trait::async_trait;
use shortlink_core::{
    Destination, RecordId, Repository, Result, ShortCode, StorageError, StorageStats, UrlRecord,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::{debug, info, warn};

const SCHEMA: &str = include_str!("../ddl/postgres/shorten_url.sql");

/// PostgreSQL implementation of the [`Repository`] contract.
///
/// Records live in the `shorten_url` table. Soft delete flips the `deleted`
/// column; rows are never removed. `add` on an existing code updates the
/// target URL in place and keeps the row's owner, id and delete flag.
#[derive(Debug, Clone)]
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a repository from an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates a repository by opening a new connection pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::new(pool))
    }

    /// Creates the `shorten_url` table and its indexes if missing.
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        info!("postgres schema ready");
        Ok(())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        ref db if is_unique_violation(db) => StorageError::Conflict(message),
        _ => StorageError::Query(message),
    }
}

/// Escapes `LIKE` metacharacters so `fragment` only matches literally.
fn escape_like(fragment: &str) -> String {
    let mut escaped = String::with_capacity(fragment.len());
    for c in fragment.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn add(&self, code: &ShortCode, original_url: &str, owner_token: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO shorten_url (short_url, original_url, owner_token)
            VALUES ($1, $2, $3)
            ON CONFLICT (short_url) DO UPDATE SET original_url = EXCLUDED.original_url
            "#,
        )
        .bind(code.as_str())
        .bind(original_url)
        .bind(owner_token)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn get(&self, code: &ShortCode, _owner_token: &str) -> Result<Destination> {
        let row = sqlx::query(
            r#"
            SELECT original_url, deleted
            FROM shorten_url
            WHERE short_url = $1
            LIMIT 1
            "#,
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Err(StorageError::NotFound(code.to_string()));
        };

        let deleted: bool = row.try_get("deleted").map_err(map_sqlx_error)?;
        if deleted {
            return Ok(Destination::Gone);
        }
        let original_url: String = row.try_get("original_url").map_err(map_sqlx_error)?;
        Ok(Destination::Active(original_url))
    }

    async fn token_exists(&self, token: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM shorten_url WHERE owner_token = $1)")
                .bind(token)
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        Ok(exists)
    }

    async fn list_by_owner(&self, token: &str) -> Result<Vec<UrlRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT short_url, original_url, owner_token, deleted
            FROM shorten_url
            WHERE owner_token = $1
            "#,
        )
        .bind(token)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter()
            .map(|row| {
                let short_url: String = row.try_get("short_url").map_err(map_sqlx_error)?;
                Ok(UrlRecord {
                    short_code: ShortCode::new_unchecked(short_url),
                    original_url: row.try_get("original_url").map_err(map_sqlx_error)?,
                    owner_token: row.try_get("owner_token").map_err(map_sqlx_error)?,
                    deleted: row.try_get("deleted").map_err(map_sqlx_error)?,
                })
            })
            .collect()
    }

    async fn resolve_id(&self, fragment: &str, owner_token: &str) -> Result<Option<RecordId>> {
        let pattern = format!("%{}", escape_like(fragment));

        let id: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT id
            FROM shorten_url
            WHERE short_url LIKE $1
              AND owner_token = $2
            ORDER BY id
            LIMIT 1
            "#,
        )
        .bind(pattern)
        .bind(owner_token)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(id.map(RecordId))
    }

    async fn bulk_soft_delete(&self, ids: &[RecordId]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let mut flipped = 0;

        for id in ids {
            let result = sqlx::query("UPDATE shorten_url SET deleted = TRUE WHERE id = $1 AND NOT deleted")
                .bind(id.0)
                .execute(&mut *tx)
                .await;

            match result {
                Ok(done) => flipped += done.rows_affected(),
                Err(err) => {
                    if let Err(rollback) = tx.rollback().await {
                        warn!(error = %rollback, "rollback after failed soft delete");
                    }
                    return Err(map_sqlx_error(err));
                }
            }
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        debug!(requested = ids.len(), flipped, "soft-deleted records");
        Ok(flipped)
    }

    async fn ping(&self) -> bool {
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => true,
            Err(err) => {
                warn!(error = %err, "postgres ping failed");
                false
            }
        }
    }

    async fn original_url_exists(&self, original_url: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM shorten_url WHERE original_url = $1)")
                .bind(original_url)
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        Ok(exists)
    }

    async fn stats(&self) -> Result<StorageStats> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS urls,
                   COUNT(DISTINCT NULLIF(owner_token, '')) AS users
            FROM shorten_url
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let urls: i64 = row.try_get("urls").map_err(map_sqlx_error)?;
        let users: i64 = row.try_get("users").map_err(map_sqlx_error)?;

        Ok(StorageStats {
            urls: urls.max(0) as u64,
            users: users.max(0) as u64,
        })
    }
}
