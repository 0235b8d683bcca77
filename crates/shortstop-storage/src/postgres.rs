use crate::deleter::{DelayedDeleter, FlushDeletes};
use crate::migrations;
use async_trait::async_trait;
use shortstop_core::{
    CorrelationLongPair, CorrelationShortPair, Repository, Result, ShortCode, StorageError,
    UrlPair,
};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::debug;

/// PostgreSQL implementation of the repository contract.
///
/// Mappings and their soft-delete flags live in the `url` table; external
/// user ids are resolved lazily to internal keys in `user`. Batch saves
/// stage rows in a transaction-scoped temp table and merge them in one
/// statement, so a batch commits fully or not at all. Delayed deletes run
/// through a per-user batching coordinator in front of the synchronous
/// soft-delete statement.
pub struct PostgresStore {
    pool: PgPool,
    deleter: DelayedDeleter,
}

impl PostgresStore {
    /// Connects to the database, applies pending schema migrations, and
    /// starts the delayed-delete coordinator. Connection or migration
    /// failure is fatal to startup.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = PgPool::connect(dsn).await.map_err(map_sqlx_error)?;
        Self::with_pool(pool).await
    }

    /// Builds a store on an existing pool, applying pending migrations.
    pub async fn with_pool(pool: PgPool) -> Result<Self> {
        migrations::migrate(&pool).await?;
        let deleter = DelayedDeleter::new(Arc::new(PgDeleteSink { pool: pool.clone() }));
        Ok(Self { pool, deleter })
    }

    /// Returns a reference to the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Flushes pending delayed deletes and closes the pool.
    pub async fn close(&self) {
        self.deleter.shutdown().await;
        self.pool.close().await;
    }

    /// Resolves an external user id to its internal key, creating the row on
    /// first use. The upsert is a single atomic statement, so concurrent
    /// first use yields exactly one key.
    async fn get_or_create_user(&self, user_id: &str) -> Result<i64> {
        let user_pk: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO "user" (uuid) VALUES ($1::uuid)
            ON CONFLICT (uuid) DO UPDATE SET uuid = EXCLUDED.uuid
            RETURNING id
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        debug!(user_id, user_pk, "resolved user");
        Ok(user_pk)
    }
}

/// Commits a coordinator batch with the synchronous soft-delete statement.
struct PgDeleteSink {
    pool: PgPool,
}

#[async_trait]
impl FlushDeletes for PgDeleteSink {
    async fn flush(&self, user_pk: i64, shorts: &[ShortCode]) -> Result<()> {
        soft_delete(&self.pool, user_pk, shorts).await
    }
}

/// Marks the given codes deleted, scoped to the owning user. Codes the user
/// does not own are silently unaffected.
async fn soft_delete(pool: &PgPool, user_pk: i64, shorts: &[ShortCode]) -> Result<()> {
    let shorts: Vec<String> = shorts.iter().map(|s| s.as_str().to_owned()).collect();
    sqlx::query(r#"UPDATE url SET is_deleted = TRUE WHERE short = ANY($1) AND user_id = $2"#)
        .bind(&shorts)
        .bind(user_pk)
        .execute(pool)
        .await
        .map_err(map_sqlx_error)?;
    Ok(())
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_) => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

#[async_trait]
impl Repository for PostgresStore {
    async fn save_long_url(&self, long: &str, user_id: &str) -> Result<ShortCode> {
        let short = ShortCode::from_long_url(long);
        let user_pk = self.get_or_create_user(user_id).await?;

        let inserted: Option<String> = sqlx::query_scalar(
            r#"
            INSERT INTO url (short, long, user_id) VALUES ($1, $2, $3)
            ON CONFLICT (short) DO NOTHING
            RETURNING short
            "#,
        )
        .bind(short.as_str())
        .bind(long)
        .bind(user_pk)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if inserted.is_some() {
            return Ok(short);
        }

        // The code is taken. An exact duplicate of the same long URL is not
        // an error; a different long URL under the same code is a conflict
        // that carries the taken code.
        let existing: Option<Option<String>> =
            sqlx::query_scalar(r#"SELECT long FROM url WHERE short = $1 LIMIT 1"#)
                .bind(short.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        match existing.flatten() {
            Some(existing) if existing == long => Ok(short),
            _ => Err(StorageError::Conflict(short)),
        }
    }

    async fn save_long_batch_url(
        &self,
        pairs: &[CorrelationLongPair],
        user_id: &str,
    ) -> Result<Vec<CorrelationShortPair>> {
        let user_pk = self.get_or_create_user(user_id).await?;

        let mut result = Vec::with_capacity(pairs.len());
        let mut shorts = Vec::with_capacity(pairs.len());
        let mut longs = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let short = ShortCode::from_long_url(&pair.long);
            shorts.push(short.as_str().to_owned());
            longs.push(pair.long.clone());
            result.push(CorrelationShortPair {
                correlation_id: pair.correlation_id.clone(),
                short,
            });
        }
        if result.is_empty() {
            return Ok(result);
        }

        // Stage, then merge, all inside one transaction: the batch commits
        // fully or not at all. The merge guard keeps a row owned by another
        // user unchanged on a code collision.
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        sqlx::query(r#"CREATE TEMP TABLE url_stage ON COMMIT DROP AS SELECT * FROM url WITH NO DATA"#)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        sqlx::query(
            r#"
            INSERT INTO url_stage (short, long, user_id, is_deleted)
            SELECT batch.short, batch.long, $3, FALSE
            FROM UNNEST($1::varchar[], $2::text[]) AS batch(short, long)
            "#,
        )
        .bind(&shorts)
        .bind(&longs)
        .bind(user_pk)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        sqlx::query(
            r#"
            INSERT INTO url SELECT DISTINCT ON (short) * FROM url_stage
            ON CONFLICT (short)
            DO UPDATE SET long = EXCLUDED.long, is_deleted = FALSE
            WHERE url.user_id = EXCLUDED.user_id
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(result)
    }

    async fn get_long_url(&self, short: &ShortCode) -> Result<String> {
        let row = sqlx::query(r#"SELECT long, is_deleted FROM url WHERE short = $1 LIMIT 1"#)
            .bind(short.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Err(StorageError::NotFound(short.clone()));
        };

        let deleted: Option<bool> = row.try_get("is_deleted").map_err(map_sqlx_error)?;
        if deleted.unwrap_or(false) {
            return Err(StorageError::Deleted(short.clone()));
        }

        let long: Option<String> = row.try_get("long").map_err(map_sqlx_error)?;
        long.ok_or_else(|| StorageError::InvalidData(format!("mapping {short} has no long url")))
    }

    /// Lists every mapping owned by the user, soft-deleted rows included.
    /// Filtering deleted rows out is a caller concern.
    async fn get_users_urls(&self, user_id: &str) -> Result<Vec<UrlPair>> {
        let rows = sqlx::query(
            r#"
            SELECT url.short, url.long FROM url
            JOIN "user" ON "user".id = url.user_id
            WHERE "user".uuid = $1::uuid
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter()
            .map(|row| {
                let short: String = row.try_get("short").map_err(map_sqlx_error)?;
                let long: Option<String> = row.try_get("long").map_err(map_sqlx_error)?;
                Ok(UrlPair {
                    short: ShortCode::new_unchecked(short),
                    long: long.unwrap_or_default(),
                })
            })
            .collect()
    }

    async fn delete_users_urls(&self, user_id: &str, shorts: &[ShortCode]) -> Result<()> {
        let user_pk = self.get_or_create_user(user_id).await?;
        soft_delete(&self.pool, user_pk, shorts).await
    }

    async fn delayed_delete_users_urls(&self, user_id: &str, shorts: &[ShortCode]) -> Result<()> {
        let user_pk = self.get_or_create_user(user_id).await?;
        self.deleter.enqueue(user_pk, shorts.to_vec());
        Ok(())
    }

    async fn ping(&self) -> bool {
        sqlx::query(r#"SELECT 1"#).execute(&self.pool).await.is_ok()
    }
}
