use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Pool, Postgres};

use crate::exporter::SourceCheck;

use super::super::{
    error::{Result, StorageError},
    models::SourceCheckRow,
    repositories::SourceChecksRepository,
};

pub struct PgSourceChecksRepo {
    pool: Arc<Pool<Postgres>>,
}

impl PgSourceChecksRepo {
    pub fn new(pool: Arc<Pool<Postgres>>) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &Pool<Postgres> {
        self.pool.as_ref()
    }
}

#[async_trait]
impl SourceChecksRepository for PgSourceChecksRepo {
    async fn upsert_check(&self, check: &SourceCheck) -> Result<()> {
        sqlx::query(
            "INSERT INTO source_checks (source_type, error_message, checked_at)
             VALUES ($1, $2, $3)
             ON CONFLICT (source_type)
             DO UPDATE SET error_message = EXCLUDED.error_message,
                           checked_at = EXCLUDED.checked_at",
        )
        .bind(&check.source_type)
        .bind(&check.error_message)
        .bind(check.checked_at)
        .execute(self.pool())
        .await
        .map_err(StorageError::Query)?;

        Ok(())
    }

    async fn list_checks(&self) -> Result<Vec<SourceCheck>> {
        let rows = sqlx::query_as::<_, SourceCheckRow>(
            "SELECT source_type, error_message, checked_at FROM source_checks
             ORDER BY source_type ASC",
        )
        .fetch_all(self.pool())
        .await
        .map_err(StorageError::Query)?;

        Ok(rows.into_iter().map(SourceCheck::from).collect())
    }
}
