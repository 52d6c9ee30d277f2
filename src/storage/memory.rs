use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    exporter::{Exporter, ExporterId, ExporterStatus, SeriesPoint, SourceCheck},
    interval::{Interval, IntervalSet},
};

use super::{
    error::{Result, StorageError},
    repositories::{
        ExportersRepository, IntervalsRepository, SourceChecksRepository, ValuesRepository,
    },
};

/// Shared state of the in-memory storage backend.
///
/// All repositories of one `Database::in_memory()` instance point at the same
/// store, mirroring how the Postgres repositories share one pool.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    exporters: HashMap<ExporterId, Exporter>,
    values: HashMap<ExporterId, BTreeMap<DateTime<Utc>, SeriesPoint>>,
    intervals: HashMap<ExporterId, IntervalSet>,
    checks: BTreeMap<String, SourceCheck>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, MemoryStoreInner> {
        self.inner
            .lock()
            .expect("`MemoryStore` mutex can't be poisoned")
    }
}

pub struct MemExportersRepo {
    store: Arc<MemoryStore>,
}

impl MemExportersRepo {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ExportersRepository for MemExportersRepo {
    async fn add(&self, exporter: &Exporter) -> Result<()> {
        let mut inner = self.store.lock();

        if inner
            .exporters
            .values()
            .any(|existing| existing.unique_code == exporter.unique_code)
        {
            return Err(StorageError::Generic(format!(
                "unique code {:?} already taken",
                exporter.unique_code
            )));
        }

        inner.exporters.insert(exporter.id, exporter.clone());

        Ok(())
    }

    async fn get(&self, id: ExporterId) -> Result<Option<Exporter>> {
        Ok(self.store.lock().exporters.get(&id).cloned())
    }

    async fn get_by_code(&self, unique_code: &str) -> Result<Option<Exporter>> {
        Ok(self
            .store
            .lock()
            .exporters
            .values()
            .find(|exporter| exporter.unique_code == unique_code)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Exporter>> {
        let mut exporters: Vec<Exporter> = self.store.lock().exporters.values().cloned().collect();
        exporters.sort_by(|a, b| a.unique_code.cmp(&b.unique_code));

        Ok(exporters)
    }

    async fn update(&self, exporter: &Exporter) -> Result<()> {
        let mut inner = self.store.lock();

        if !inner.exporters.contains_key(&exporter.id) {
            return Err(StorageError::Generic(format!(
                "exporter {} not found",
                exporter.id
            )));
        }

        inner.exporters.insert(exporter.id, exporter.clone());

        Ok(())
    }

    async fn update_status(&self, id: ExporterId, status: &ExporterStatus) -> Result<()> {
        let mut inner = self.store.lock();

        let exporter = inner
            .exporters
            .get_mut(&id)
            .ok_or_else(|| StorageError::Generic(format!("exporter {id} not found")))?;
        exporter.status = status.clone();

        Ok(())
    }

    async fn update_last_actualized(&self, id: ExporterId, moment: DateTime<Utc>) -> Result<()> {
        let mut inner = self.store.lock();

        let exporter = inner
            .exporters
            .get_mut(&id)
            .ok_or_else(|| StorageError::Generic(format!("exporter {id} not found")))?;
        exporter.last_actualized = Some(moment);

        Ok(())
    }

    async fn remove(&self, id: ExporterId) -> Result<()> {
        let mut inner = self.store.lock();
        inner.exporters.remove(&id);
        inner.values.remove(&id);
        inner.intervals.remove(&id);

        Ok(())
    }
}

pub struct MemValuesRepo {
    store: Arc<MemoryStore>,
}

impl MemValuesRepo {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ValuesRepository for MemValuesRepo {
    async fn upsert_values(&self, series: ExporterId, points: &[SeriesPoint]) -> Result<usize> {
        let mut inner = self.store.lock();
        let values = inner.values.entry(series).or_default();

        for point in points {
            values.insert(point.moment, point.clone());
        }

        Ok(points.len())
    }

    async fn values_in_range(
        &self,
        series: ExporterId,
        range: Interval,
    ) -> Result<Vec<SeriesPoint>> {
        let inner = self.store.lock();

        Ok(inner
            .values
            .get(&series)
            .map(|values| {
                values
                    .range(range.start()..range.end())
                    .map(|(_, point)| point.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn all_values(&self, series: ExporterId) -> Result<Vec<SeriesPoint>> {
        let inner = self.store.lock();

        Ok(inner
            .values
            .get(&series)
            .map(|values| values.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn count_values(&self, series: ExporterId) -> Result<u64> {
        let inner = self.store.lock();

        Ok(inner
            .values
            .get(&series)
            .map(|values| values.len() as u64)
            .unwrap_or_default())
    }

    async fn remove_values(&self, series: ExporterId) -> Result<()> {
        self.store.lock().values.remove(&series);

        Ok(())
    }
}

pub struct MemIntervalsRepo {
    store: Arc<MemoryStore>,
}

impl MemIntervalsRepo {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl IntervalsRepository for MemIntervalsRepo {
    async fn load_interval_set(&self, series: ExporterId) -> Result<IntervalSet> {
        Ok(self
            .store
            .lock()
            .intervals
            .get(&series)
            .cloned()
            .unwrap_or_default())
    }

    async fn persist_interval_set(&self, series: ExporterId, set: &IntervalSet) -> Result<()> {
        self.store.lock().intervals.insert(series, set.clone());

        Ok(())
    }

    async fn remove_interval_set(&self, series: ExporterId) -> Result<()> {
        self.store.lock().intervals.remove(&series);

        Ok(())
    }
}

pub struct MemSourceChecksRepo {
    store: Arc<MemoryStore>,
}

impl MemSourceChecksRepo {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SourceChecksRepository for MemSourceChecksRepo {
    async fn upsert_check(&self, check: &SourceCheck) -> Result<()> {
        self.store
            .lock()
            .checks
            .insert(check.source_type.clone(), check.clone());

        Ok(())
    }

    async fn list_checks(&self) -> Result<Vec<SourceCheck>> {
        Ok(self.store.lock().checks.values().cloned().collect())
    }
}
