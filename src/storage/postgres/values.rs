use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Transaction};

use crate::{
    exporter::{ExporterId, SeriesPoint},
    interval::Interval,
};

use super::super::{
    error::{Result, StorageError},
    models::SeriesValueRow,
    repositories::ValuesRepository,
};

pub struct PgValuesRepo {
    pool: Arc<Pool<Postgres>>,
}

impl PgValuesRepo {
    pub fn new(pool: Arc<Pool<Postgres>>) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &Pool<Postgres> {
        self.pool.as_ref()
    }

    async fn start_transaction(&self) -> Result<Transaction<'static, Postgres>> {
        self.pool.begin().await.map_err(StorageError::TransactionBegin)
    }
}

#[async_trait]
impl ValuesRepository for PgValuesRepo {
    async fn upsert_values(&self, series: ExporterId, points: &[SeriesPoint]) -> Result<usize> {
        let mut tx = self.start_transaction().await?;

        for point in points {
            sqlx::query(
                "INSERT INTO series_values (exporter_id, moment, value, comment)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (exporter_id, moment)
                 DO UPDATE SET value = EXCLUDED.value, comment = EXCLUDED.comment",
            )
            .bind(series.as_uuid())
            .bind(point.moment)
            .bind(point.value)
            .bind(&point.comment)
            .execute(&mut *tx)
            .await
            .map_err(StorageError::Query)?;
        }

        tx.commit().await.map_err(StorageError::TransactionCommit)?;

        Ok(points.len())
    }

    async fn values_in_range(
        &self,
        series: ExporterId,
        range: Interval,
    ) -> Result<Vec<SeriesPoint>> {
        let rows = sqlx::query_as::<_, SeriesValueRow>(
            "SELECT moment, value, comment FROM series_values
             WHERE exporter_id = $1 AND moment >= $2 AND moment < $3
             ORDER BY moment ASC",
        )
        .bind(series.as_uuid())
        .bind(range.start())
        .bind(range.end())
        .fetch_all(self.pool())
        .await
        .map_err(StorageError::Query)?;

        Ok(rows.into_iter().map(SeriesPoint::from).collect())
    }

    async fn all_values(&self, series: ExporterId) -> Result<Vec<SeriesPoint>> {
        let rows = sqlx::query_as::<_, SeriesValueRow>(
            "SELECT moment, value, comment FROM series_values
             WHERE exporter_id = $1
             ORDER BY moment ASC",
        )
        .bind(series.as_uuid())
        .fetch_all(self.pool())
        .await
        .map_err(StorageError::Query)?;

        Ok(rows.into_iter().map(SeriesPoint::from).collect())
    }

    async fn count_values(&self, series: ExporterId) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM series_values WHERE exporter_id = $1")
                .bind(series.as_uuid())
                .fetch_one(self.pool())
                .await
                .map_err(StorageError::Query)?;

        Ok(count as u64)
    }

    async fn remove_values(&self, series: ExporterId) -> Result<()> {
        sqlx::query("DELETE FROM series_values WHERE exporter_id = $1")
            .bind(series.as_uuid())
            .execute(self.pool())
            .await
            .map_err(StorageError::Query)?;

        Ok(())
    }
}
