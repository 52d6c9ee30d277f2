use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use crate::exporter::{Exporter, ExporterId, ExporterStatus};

use super::super::{
    error::{Result, StorageError},
    models::ExporterRow,
    repositories::ExportersRepository,
};

pub struct PgExportersRepo {
    pool: Arc<Pool<Postgres>>,
}

impl PgExportersRepo {
    pub fn new(pool: Arc<Pool<Postgres>>) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &Pool<Postgres> {
        self.pool.as_ref()
    }
}

#[async_trait]
impl ExportersRepository for PgExportersRepo {
    async fn add(&self, exporter: &Exporter) -> Result<()> {
        sqlx::query(
            "INSERT INTO exporters
             (id, unique_code, description, is_active, source_type, instrument_params,
              status_error, last_actualized)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(exporter.id.as_uuid())
        .bind(&exporter.unique_code)
        .bind(&exporter.description)
        .bind(exporter.is_active)
        .bind(&exporter.source_type)
        .bind(&exporter.instrument_params)
        .bind(exporter.status.error())
        .bind(exporter.last_actualized)
        .execute(self.pool())
        .await
        .map_err(StorageError::Query)?;

        Ok(())
    }

    async fn get(&self, id: ExporterId) -> Result<Option<Exporter>> {
        let row = sqlx::query_as::<_, ExporterRow>("SELECT * FROM exporters WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(self.pool())
            .await
            .map_err(StorageError::Query)?;

        Ok(row.map(Exporter::from))
    }

    async fn get_by_code(&self, unique_code: &str) -> Result<Option<Exporter>> {
        let row =
            sqlx::query_as::<_, ExporterRow>("SELECT * FROM exporters WHERE unique_code = $1")
                .bind(unique_code)
                .fetch_optional(self.pool())
                .await
                .map_err(StorageError::Query)?;

        Ok(row.map(Exporter::from))
    }

    async fn list(&self) -> Result<Vec<Exporter>> {
        let rows = sqlx::query_as::<_, ExporterRow>("SELECT * FROM exporters ORDER BY unique_code")
            .fetch_all(self.pool())
            .await
            .map_err(StorageError::Query)?;

        Ok(rows.into_iter().map(Exporter::from).collect())
    }

    async fn update(&self, exporter: &Exporter) -> Result<()> {
        sqlx::query(
            "UPDATE exporters
             SET unique_code = $2, description = $3, is_active = $4, source_type = $5,
                 instrument_params = $6, status_error = $7, last_actualized = $8
             WHERE id = $1",
        )
        .bind(exporter.id.as_uuid())
        .bind(&exporter.unique_code)
        .bind(&exporter.description)
        .bind(exporter.is_active)
        .bind(&exporter.source_type)
        .bind(&exporter.instrument_params)
        .bind(exporter.status.error())
        .bind(exporter.last_actualized)
        .execute(self.pool())
        .await
        .map_err(StorageError::Query)?;

        Ok(())
    }

    async fn update_status(&self, id: ExporterId, status: &ExporterStatus) -> Result<()> {
        sqlx::query("UPDATE exporters SET status_error = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(status.error())
            .execute(self.pool())
            .await
            .map_err(StorageError::Query)?;

        Ok(())
    }

    async fn update_last_actualized(&self, id: ExporterId, moment: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE exporters SET last_actualized = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(moment)
            .execute(self.pool())
            .await
            .map_err(StorageError::Query)?;

        Ok(())
    }

    async fn remove(&self, id: ExporterId) -> Result<()> {
        // Values and intervals are removed by the ON DELETE CASCADE
        // constraints.
        sqlx::query("DELETE FROM exporters WHERE id = $1")
            .bind(id.as_uuid())
            .execute(self.pool())
            .await
            .map_err(StorageError::Query)?;

        Ok(())
    }
}
