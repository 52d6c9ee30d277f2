use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Transaction};

use crate::{exporter::ExporterId, interval::IntervalSet};

use super::super::{
    error::{Result, StorageError},
    models::DownloadedIntervalRow,
    repositories::IntervalsRepository,
};

pub struct PgIntervalsRepo {
    pool: Arc<Pool<Postgres>>,
}

impl PgIntervalsRepo {
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
impl IntervalsRepository for PgIntervalsRepo {
    async fn load_interval_set(&self, series: ExporterId) -> Result<IntervalSet> {
        let rows = sqlx::query_as::<_, DownloadedIntervalRow>(
            "SELECT date_from, date_to FROM downloaded_intervals
             WHERE exporter_id = $1
             ORDER BY date_from ASC",
        )
        .bind(series.as_uuid())
        .fetch_all(self.pool())
        .await
        .map_err(StorageError::Query)?;

        let set = IntervalSet::from_pairs(rows.into_iter().map(|row| (row.date_from, row.date_to)))?;

        Ok(set)
    }

    async fn persist_interval_set(&self, series: ExporterId, set: &IntervalSet) -> Result<()> {
        let mut tx = self.start_transaction().await?;

        sqlx::query("DELETE FROM downloaded_intervals WHERE exporter_id = $1")
            .bind(series.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(StorageError::Query)?;

        for interval in set.iter() {
            sqlx::query(
                "INSERT INTO downloaded_intervals (exporter_id, date_from, date_to)
                 VALUES ($1, $2, $3)",
            )
            .bind(series.as_uuid())
            .bind(interval.start())
            .bind(interval.end())
            .execute(&mut *tx)
            .await
            .map_err(StorageError::Query)?;
        }

        tx.commit().await.map_err(StorageError::TransactionCommit)?;

        Ok(())
    }

    async fn remove_interval_set(&self, series: ExporterId) -> Result<()> {
        sqlx::query("DELETE FROM downloaded_intervals WHERE exporter_id = $1")
            .bind(series.as_uuid())
            .execute(self.pool())
            .await
            .map_err(StorageError::Query)?;

        Ok(())
    }
}
