use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;

pub(crate) mod error;
mod memory;
pub(crate) mod models;
mod postgres;
mod repositories;

use error::{Result, StorageError};
use memory::{
    MemExportersRepo, MemIntervalsRepo, MemSourceChecksRepo, MemValuesRepo, MemoryStore,
};
use postgres::{
    exporters::PgExportersRepo, intervals::PgIntervalsRepo, source_checks::PgSourceChecksRepo,
    values::PgValuesRepo,
};
use repositories::{
    ExportersRepository, IntervalsRepository, SourceChecksRepository, ValuesRepository,
};

/// Primary storage interface for exporters, series values, downloaded
/// intervals and source availability checks.
///
/// Backed by PostgreSQL with automatic migrations, or by an in-memory store
/// for tests and embedded use. Repositories of one instance always share the
/// same backend.
pub struct Database {
    pub(crate) exporters: Box<dyn ExportersRepository>,
    pub(crate) values: Box<dyn ValuesRepository>,
    pub(crate) intervals: Box<dyn IntervalsRepository>,
    pub(crate) source_checks: Box<dyn SourceChecksRepository>,
}

impl Database {
    /// Creates a PostgreSQL-backed database instance and runs migrations.
    pub async fn connect(postgres_db_url: &str) -> Result<Arc<Self>> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(postgres_db_url)
            .await
            .map_err(StorageError::Connection)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(StorageError::Migration)?;

        let pool = Arc::new(pool);
        let exporters = Box::new(PgExportersRepo::new(pool.clone()));
        let values = Box::new(PgValuesRepo::new(pool.clone()));
        let intervals = Box::new(PgIntervalsRepo::new(pool.clone()));
        let source_checks = Box::new(PgSourceChecksRepo::new(pool));

        Ok(Arc::new(Self {
            exporters,
            values,
            intervals,
            source_checks,
        }))
    }

    /// Creates a database instance backed by process memory.
    pub fn in_memory() -> Arc<Self> {
        let store = MemoryStore::new();
        let exporters = Box::new(MemExportersRepo::new(store.clone()));
        let values = Box::new(MemValuesRepo::new(store.clone()));
        let intervals = Box::new(MemIntervalsRepo::new(store.clone()));
        let source_checks = Box::new(MemSourceChecksRepo::new(store));

        Arc::new(Self {
            exporters,
            values,
            intervals,
            source_checks,
        })
    }
}
