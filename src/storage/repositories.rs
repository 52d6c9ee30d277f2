use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    exporter::{Exporter, ExporterId, ExporterStatus, SeriesPoint, SourceCheck},
    interval::{Interval, IntervalSet},
};

use super::error::Result;

#[async_trait]
pub(crate) trait ExportersRepository: Send + Sync {
    /// Adds a new exporter. Fails if the unique code is already taken.
    async fn add(&self, exporter: &Exporter) -> Result<()>;

    async fn get(&self, id: ExporterId) -> Result<Option<Exporter>>;

    async fn get_by_code(&self, unique_code: &str) -> Result<Option<Exporter>>;

    async fn list(&self) -> Result<Vec<Exporter>>;

    /// Overwrites the mutable attributes of an existing exporter.
    async fn update(&self, exporter: &Exporter) -> Result<()>;

    async fn update_status(&self, id: ExporterId, status: &ExporterStatus) -> Result<()>;

    async fn update_last_actualized(&self, id: ExporterId, moment: DateTime<Utc>) -> Result<()>;

    /// Removes the exporter together with its values and intervals.
    async fn remove(&self, id: ExporterId) -> Result<()>;
}

#[async_trait]
pub(crate) trait ValuesRepository: Send + Sync {
    /// Upserts each point by (series, moment); last write wins, so
    /// re-applying the same batch is idempotent. Returns the number of points
    /// written.
    async fn upsert_values(&self, series: ExporterId, points: &[SeriesPoint]) -> Result<usize>;

    /// Stored values with moments inside `range`, ascending by moment.
    async fn values_in_range(&self, series: ExporterId, range: Interval)
    -> Result<Vec<SeriesPoint>>;

    /// All stored values of the series, ascending by moment.
    async fn all_values(&self, series: ExporterId) -> Result<Vec<SeriesPoint>>;

    async fn count_values(&self, series: ExporterId) -> Result<u64>;

    async fn remove_values(&self, series: ExporterId) -> Result<()>;
}

#[async_trait]
pub(crate) trait IntervalsRepository: Send + Sync {
    /// Reconstructs the in-memory interval set from its persisted
    /// (start, end) pairs.
    async fn load_interval_set(&self, series: ExporterId) -> Result<IntervalSet>;

    /// Replaces the persisted pairs with the given set's intervals.
    async fn persist_interval_set(&self, series: ExporterId, set: &IntervalSet) -> Result<()>;

    async fn remove_interval_set(&self, series: ExporterId) -> Result<()>;
}

#[async_trait]
pub(crate) trait SourceChecksRepository: Send + Sync {
    /// Records the latest availability check of one source type, replacing
    /// any previous record for it.
    async fn upsert_check(&self, check: &SourceCheck) -> Result<()>;

    async fn list_checks(&self) -> Result<Vec<SourceCheck>>;
}
