use async_trait::async_trait;
use batch_domain::{NaturalKey, PersistedRecord, RecordRepository};
use batch_errors::BatchResult;
use sqlx::{PgPool, Row};
use tracing::{debug, instrument};

use crate::error_handling::{RecordOperationContext, RepositoryErrorHelpers, RepositoryOperation};

/// 基于 PostgreSQL 的记录仓储
pub struct PostgresRecordRepository {
    pool: PgPool,
}

impl PostgresRecordRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<PersistedRecord, sqlx::Error> {
        let natural_key: Option<String> = row.try_get("natural_key")?;
        Ok(PersistedRecord {
            id: row.try_get("id")?,
            natural_key: natural_key.map(NaturalKey::new),
            payload: row.try_get("payload")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl RecordRepository for PostgresRecordRepository {
    #[instrument(skip(self))]
    async fn ensure_schema(&self) -> BatchResult<()> {
        let context = RecordOperationContext::new(RepositoryOperation::EnsureSchema);

        // NULL keys never collide under a UNIQUE constraint, so keyless
        // records keep plain-insert semantics.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS processed_records (
                id BIGSERIAL PRIMARY KEY,
                natural_key TEXT UNIQUE,
                payload TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::record_database_error(&context, e))?;

        debug!("processed_records 表已就绪");
        Ok(())
    }

    #[instrument(skip(self), fields(natural_key = %key))]
    async fn exists(&self, key: &NaturalKey) -> BatchResult<bool> {
        let context =
            RecordOperationContext::new(RepositoryOperation::Exists).with_key(Some(key));

        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM processed_records WHERE natural_key = $1)",
        )
        .bind(key.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::record_database_error(&context, e))?;

        Ok(exists)
    }

    #[instrument(skip(self, payload), fields(natural_key = ?key))]
    async fn insert(&self, key: Option<&NaturalKey>, payload: &str) -> BatchResult<i64> {
        let context = RecordOperationContext::new(RepositoryOperation::Insert).with_key(key);

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO processed_records (natural_key, payload)
            VALUES ($1, $2)
            RETURNING id
            "#,
        )
        .bind(key.map(NaturalKey::as_str))
        .bind(payload)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::record_database_error(&context, e))?;

        debug!(id, "插入记录成功");
        Ok(id)
    }

    async fn find_by_key(&self, key: &NaturalKey) -> BatchResult<Option<PersistedRecord>> {
        let context = RecordOperationContext::new(RepositoryOperation::Read).with_key(Some(key));

        let row = sqlx::query(
            "SELECT id, natural_key, payload, created_at FROM processed_records WHERE natural_key = $1",
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryErrorHelpers::record_database_error(&context, e))?;

        row.as_ref()
            .map(Self::row_to_record)
            .transpose()
            .map_err(|e| RepositoryErrorHelpers::record_database_error(&context, e))
    }

    async fn count_by_key(&self, key: &NaturalKey) -> BatchResult<u64> {
        let context = RecordOperationContext::new(RepositoryOperation::Count).with_key(Some(key));

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM processed_records WHERE natural_key = $1")
                .bind(key.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| RepositoryErrorHelpers::record_database_error(&context, e))?;

        Ok(count as u64)
    }

    async fn count(&self) -> BatchResult<u64> {
        let context = RecordOperationContext::new(RepositoryOperation::Count);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM processed_records")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| RepositoryErrorHelpers::record_database_error(&context, e))?;

        Ok(count as u64)
    }
}
