//! Synchronization engine tying the registry, storage and the per-series
//! download machinery together.
//!
//! All engine operations are on-demand; there is no background scheduler.
//! Per-series advisory locks guarantee at most one mutating operation per
//! series at a time, while a semaphore bounds simultaneously in-flight
//! source calls across series.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::{broadcast, OwnedMutexGuard, Semaphore};
use tracing::{info, warn};

use crate::{
    adapter::AdapterRegistry,
    exporter::{Exporter, ExporterId, ExporterStatus, SeriesPoint, SourceCheck},
    interval::Interval,
    storage::Database,
    util::AbortOnDropHandle,
};

pub mod actuality;
pub mod config;
pub mod error;
pub mod report;

pub(crate) mod actualize_task;
pub(crate) mod merge;

use actualize_task::ActualizeTask;
use config::SyncConfig;
use error::{Result, SyncError};
use report::{ActualizeReport, SeriesStatus};

const SHUTDOWN_CHANNEL_CAPACITY: usize = 1;

pub struct SyncEngine {
    config: SyncConfig,
    db: Arc<Database>,
    registry: Arc<AdapterRegistry>,
    /// Advisory per-series locks. Entries are created on first use and
    /// removed when the exporter is deleted.
    run_locks: Mutex<HashMap<ExporterId, Arc<tokio::sync::Mutex<()>>>>,
    fetch_permits: Arc<Semaphore>,
    /// Set once by `shutdown`; runs requested afterwards are refused at
    /// entry, while in-flight runs learn about it over the broadcast channel.
    shutting_down: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

impl SyncEngine {
    pub fn new(config: SyncConfig, db: Arc<Database>, registry: Arc<AdapterRegistry>) -> Arc<Self> {
        let (shutdown_tx, _) = broadcast::channel(SHUTDOWN_CHANNEL_CAPACITY);
        let fetch_permits = Arc::new(Semaphore::new(config.max_concurrent_fetches().get()));

        Arc::new(Self {
            config,
            db,
            registry,
            run_locks: Mutex::new(HashMap::new()),
            fetch_permits,
            shutting_down: AtomicBool::new(false),
            shutdown_tx,
        })
    }

    /// Builds an engine backed by the process-wide adapter registry.
    pub fn with_global_registry(config: SyncConfig, db: Arc<Database>) -> Arc<Self> {
        Self::new(config, db, crate::adapter::global_registry())
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Registers a new exporter after validating that its source type is
    /// known and its unique code is free.
    pub async fn register_exporter(
        &self,
        unique_code: impl Into<String>,
        description: impl Into<String>,
        source_type: impl Into<String>,
        instrument_params: impl Into<String>,
    ) -> Result<Exporter> {
        let unique_code = unique_code.into();
        let source_type = source_type.into();

        // Fail before touching storage if no adapter can ever serve it.
        self.registry.get(&source_type)?;

        if self.db.exporters.get_by_code(&unique_code).await?.is_some() {
            return Err(SyncError::DuplicateUniqueCode(unique_code));
        }

        let exporter = Exporter::new(unique_code, description, source_type, instrument_params);
        self.db.exporters.add(&exporter).await?;

        info!(%exporter, "exporter registered");

        Ok(exporter)
    }

    /// Deletes the exporter together with all of its values and coverage.
    ///
    /// Fails with `Busy` if an actualization of the series is in progress.
    pub async fn delete_exporter(&self, unique_code: &str) -> Result<()> {
        let exporter = self.resolve(unique_code).await?;
        let _guard = self.try_lock_series(&exporter)?;

        self.db.values.remove_values(exporter.id).await?;
        self.db.intervals.remove_interval_set(exporter.id).await?;
        self.db.exporters.remove(exporter.id).await?;

        self.run_locks
            .lock()
            .expect("`SyncEngine` lock can't be poisoned")
            .remove(&exporter.id);

        info!(%exporter, "exporter deleted");

        Ok(())
    }

    /// Includes or excludes the exporter from automatic actualization.
    ///
    /// Re-activating also clears a `Disabled` status, giving a series whose
    /// source misbehaved another chance.
    pub async fn set_active(&self, unique_code: &str, is_active: bool) -> Result<Exporter> {
        let mut exporter = self.resolve(unique_code).await?;

        exporter.is_active = is_active;
        if is_active && exporter.status.is_disabled() {
            exporter.status = ExporterStatus::Active;
        }
        self.db.exporters.update(&exporter).await?;

        Ok(exporter)
    }

    pub async fn exporters(&self) -> Result<Vec<Exporter>> {
        Ok(self.db.exporters.list().await?)
    }

    /// Actualizes a single series over `range`, downloading only its gaps.
    ///
    /// Progress made before a failure is kept and reported; source failures
    /// that exhaust the retry budget disable the exporter instead of
    /// propagating as errors.
    pub async fn actualize(&self, unique_code: &str, range: Interval) -> Result<ActualizeReport> {
        let exporter = self.resolve(unique_code).await?;
        if !exporter.is_actualizable() {
            return Err(SyncError::ExporterDisabled(exporter.unique_code));
        }

        let _guard = self.try_lock_series(&exporter)?;

        self.run_actualization(&exporter, range).await
    }

    /// Actualizes every actualizable exporter over `[lower_bound, now)`,
    /// running the series concurrently.
    ///
    /// Per-series failures are isolated: each series reports its own result
    /// and a failing one never aborts the others.
    pub async fn actualize_all(
        self: &Arc<Self>,
        lower_bound: DateTime<Utc>,
    ) -> Result<Vec<(String, Result<ActualizeReport>)>> {
        let range = Interval::new(lower_bound, Utc::now())?;

        let exporters: Vec<Exporter> = self
            .db
            .exporters
            .list()
            .await?
            .into_iter()
            .filter(Exporter::is_actualizable)
            .collect();

        let (codes, handles): (Vec<String>, Vec<AbortOnDropHandle<Result<ActualizeReport>>>) =
            exporters
                .into_iter()
                .map(|exporter| {
                    let engine = self.clone();
                    let unique_code = exporter.unique_code.clone();

                    let handle = AbortOnDropHandle::from(tokio::spawn(async move {
                        let _guard = engine.try_lock_series(&exporter)?;
                        engine.run_actualization(&exporter, range).await
                    }));

                    (unique_code, handle)
                })
                .unzip();

        let mut results = Vec::with_capacity(codes.len());
        for (unique_code, joined) in codes.into_iter().zip(join_all(handles).await) {
            let result = joined.map_err(SyncError::TaskJoin)?;
            results.push((unique_code, result));
        }

        Ok(results)
    }

    /// On-demand status snapshot of one series.
    pub async fn status(&self, unique_code: &str) -> Result<SeriesStatus> {
        let exporter = self.resolve(unique_code).await?;
        let set = self.db.intervals.load_interval_set(exporter.id).await?;

        Ok(SeriesStatus {
            is_actual: actuality::is_actual(&set, Utc::now(), self.config.staleness_tolerance()),
            has_gaps: actuality::has_interior_gaps(&set),
            last_error: exporter.status.error().map(str::to_string),
        })
    }

    /// True iff `[lower_bound, now)` contains uncovered sub-ranges for the
    /// series.
    pub async fn has_gaps(&self, unique_code: &str, lower_bound: DateTime<Utc>) -> Result<bool> {
        let exporter = self.resolve(unique_code).await?;
        let set = self.db.intervals.load_interval_set(exporter.id).await?;

        Ok(actuality::has_gaps(&set, lower_bound, Utc::now()))
    }

    /// The series' synchronized coverage, ascending by start.
    pub async fn covered_intervals(&self, unique_code: &str) -> Result<Vec<Interval>> {
        let exporter = self.resolve(unique_code).await?;
        let set = self.db.intervals.load_interval_set(exporter.id).await?;

        Ok(set.as_slice().to_vec())
    }

    /// Stored values of the series inside `range`, ascending by moment.
    pub async fn read_values(
        &self,
        unique_code: &str,
        range: Interval,
    ) -> Result<Vec<SeriesPoint>> {
        let exporter = self.resolve(unique_code).await?;

        Ok(self.db.values.values_in_range(exporter.id, range).await?)
    }

    /// Probes every registered source adapter and records the outcome.
    pub async fn check_sources(&self) -> Result<Vec<SourceCheck>> {
        let mut checks = Vec::new();

        for source_type in self.registry.source_types() {
            let adapter = self.registry.get(&source_type)?;
            let error_message = adapter.probe().await.err().map(|error| error.to_string());

            if let Some(message) = &error_message {
                warn!(%source_type, %message, "source probe failed");
            }

            let check = SourceCheck {
                source_type,
                error_message,
                checked_at: Utc::now(),
            };
            self.db.source_checks.upsert_check(&check).await?;
            checks.push(check);
        }

        Ok(checks)
    }

    /// Latest recorded probe outcome per source type, ascending by type.
    pub async fn source_checks(&self) -> Result<Vec<SourceCheck>> {
        Ok(self.db.source_checks.list_checks().await?)
    }

    /// Requests cooperative cancellation of all in-flight actualization runs.
    ///
    /// Runs stop between sub-ranges, so every merge committed so far stays
    /// intact.
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        // Err means no run is listening, which is fine.
        let _ = self.shutdown_tx.send(());
    }

    async fn resolve(&self, unique_code: &str) -> Result<Exporter> {
        self.db
            .exporters
            .get_by_code(unique_code)
            .await?
            .ok_or_else(|| SyncError::ExporterNotFound(unique_code.to_string()))
    }

    fn try_lock_series(&self, exporter: &Exporter) -> Result<OwnedMutexGuard<()>> {
        let lock = self
            .run_locks
            .lock()
            .expect("`SyncEngine` lock can't be poisoned")
            .entry(exporter.id)
            .or_default()
            .clone();

        lock.try_lock_owned()
            .map_err(|_| SyncError::Busy(exporter.unique_code.clone()))
    }

    /// Runs one actualization while holding the series lock, then applies the
    /// outcome to the exporter record.
    async fn run_actualization(
        &self,
        exporter: &Exporter,
        range: Interval,
    ) -> Result<ActualizeReport> {
        if self.shutting_down.load(Ordering::SeqCst) {
            let mut report = ActualizeReport::default();
            report
                .errors
                .push(actualize_task::error::ActualizeError::Cancelled.to_string());
            return Ok(report);
        }

        let _permit = self.fetch_permits.clone().acquire_owned().await?;

        let adapter = self.registry.get(&exporter.source_type)?;
        let task = ActualizeTask::new(
            &self.config,
            self.db.clone(),
            adapter,
            self.shutdown_tx.subscribe(),
        );

        let (mut report, error) = task.run(exporter, range).await;

        match error {
            None => {
                self.db
                    .exporters
                    .update_last_actualized(exporter.id, Utc::now())
                    .await?;
            }
            Some(error) if error.disables_exporter() => {
                let message = error.to_string();
                warn!(exporter = %exporter.unique_code, %error, "disabling exporter");

                self.db
                    .exporters
                    .update_status(
                        exporter.id,
                        &ExporterStatus::Disabled {
                            error: message.clone(),
                        },
                    )
                    .await?;
                report.errors.push(message);
            }
            Some(error @ actualize_task::error::ActualizeError::Cancelled) => {
                report.errors.push(error.to_string());
            }
            Some(error) => return Err(error.into()),
        }

        Ok(report)
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use tokio::time;

    use crate::adapter::{error::FetchError, SourceAdapter};

    use super::*;

    /// Adapter that fails a scripted number of fetches before succeeding,
    /// then returns one point at the start of each requested range.
    struct ScriptedAdapter {
        source_type: &'static str,
        failures_left: AtomicU32,
        fetch_calls: AtomicU32,
        probe_error: Option<&'static str>,
    }

    impl ScriptedAdapter {
        fn new(source_type: &'static str, failures: u32) -> Self {
            Self {
                source_type,
                failures_left: AtomicU32::new(failures),
                fetch_calls: AtomicU32::new(0),
                probe_error: None,
            }
        }

        fn with_probe_error(source_type: &'static str, message: &'static str) -> Self {
            Self {
                probe_error: Some(message),
                ..Self::new(source_type, 0)
            }
        }

        fn fetch_calls(&self) -> u32 {
            self.fetch_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SourceAdapter for ScriptedAdapter {
        fn source_type(&self) -> &str {
            self.source_type
        }

        fn description(&self) -> &str {
            "scripted test source"
        }

        async fn fetch(
            &self,
            _instrument_params: &str,
            range: Interval,
        ) -> crate::adapter::error::Result<Vec<SeriesPoint>> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);

            let failures = self.failures_left.load(Ordering::SeqCst);
            if failures > 0 {
                self.failures_left.store(failures - 1, Ordering::SeqCst);
                return Err(FetchError::Transient("scripted failure".to_string()));
            }

            Ok(vec![SeriesPoint::new(range.start(), 1.0)])
        }

        async fn probe(&self) -> crate::adapter::error::Result<()> {
            match self.probe_error {
                Some(message) => Err(FetchError::Transient(message.to_string())),
                None => Ok(()),
            }
        }
    }

    fn moment(offset_days: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap() + Duration::days(offset_days)
    }

    fn interval(start: i64, end: i64) -> Interval {
        Interval::new(moment(start), moment(end)).unwrap()
    }

    fn fast_config() -> SyncConfig {
        SyncConfig::default()
            .with_source_cooldown(time::Duration::ZERO)
            .with_retry_backoff_base(time::Duration::from_millis(1))
    }

    fn setup(adapter: Arc<ScriptedAdapter>) -> Arc<SyncEngine> {
        let registry = Arc::new(AdapterRegistry::new());
        registry.register(adapter).unwrap();

        SyncEngine::new(fast_config(), Database::in_memory(), registry)
    }

    #[tokio::test]
    async fn register_validates_source_type_and_unique_code() {
        let engine = setup(Arc::new(ScriptedAdapter::new("mock", 0)));

        engine
            .register_exporter("MSCI_World", "MSCI World index", "mock", "{}")
            .await
            .unwrap();

        assert!(matches!(
            engine
                .register_exporter("MSCI_World", "again", "mock", "{}")
                .await,
            Err(SyncError::DuplicateUniqueCode(_))
        ));
        assert!(matches!(
            engine
                .register_exporter("SP500", "S&P 500", "unknown", "{}")
                .await,
            Err(SyncError::Registry(_))
        ));
    }

    #[tokio::test]
    async fn actualize_downloads_gaps_and_marks_actualized() {
        let adapter = Arc::new(ScriptedAdapter::new("mock", 0));
        let engine = setup(adapter.clone());

        engine
            .register_exporter("MSCI_World", "MSCI World index", "mock", "{}")
            .await
            .unwrap();

        let report = engine.actualize("MSCI_World", interval(0, 10)).await.unwrap();
        assert!(report.is_clean());
        assert_eq!(report.intervals_added, vec![interval(0, 10)]);
        assert_eq!(report.points_written, 1);

        let exporter = &engine.exporters().await.unwrap()[0];
        assert!(exporter.last_actualized.is_some());

        assert_eq!(
            engine.covered_intervals("MSCI_World").await.unwrap(),
            vec![interval(0, 10)]
        );
        assert_eq!(
            engine.read_values("MSCI_World", interval(0, 10)).await.unwrap().len(),
            1
        );

        // Fully covered: a second run over the same range calls the source
        // no further.
        let calls_before = adapter.fetch_calls();
        let report = engine.actualize("MSCI_World", interval(0, 10)).await.unwrap();
        assert!(report.intervals_added.is_empty());
        assert_eq!(adapter.fetch_calls(), calls_before);
    }

    #[tokio::test]
    async fn transient_failures_within_budget_still_succeed() {
        // Default budget is 3 trials; 2 failures then success.
        let adapter = Arc::new(ScriptedAdapter::new("mock", 2));
        let engine = setup(adapter.clone());

        engine
            .register_exporter("MSCI_World", "MSCI World index", "mock", "{}")
            .await
            .unwrap();

        let report = engine.actualize("MSCI_World", interval(0, 10)).await.unwrap();
        assert!(report.is_clean());
        assert_eq!(adapter.fetch_calls(), 3);

        let exporter = &engine.exporters().await.unwrap()[0];
        assert_eq!(exporter.status, ExporterStatus::Active);
    }

    #[tokio::test]
    async fn exhausted_retry_budget_disables_the_exporter() {
        let adapter = Arc::new(ScriptedAdapter::new("mock", 10));
        let engine = setup(adapter.clone());

        engine
            .register_exporter("MSCI_World", "MSCI World index", "mock", "{}")
            .await
            .unwrap();

        let report = engine.actualize("MSCI_World", interval(0, 10)).await.unwrap();
        assert!(!report.is_clean());
        assert!(report.intervals_added.is_empty());

        let exporter = &engine.exporters().await.unwrap()[0];
        assert!(exporter.status.is_disabled());
        assert!(engine.covered_intervals("MSCI_World").await.unwrap().is_empty());

        // Disabled exporters refuse further actualization until re-enabled.
        assert!(matches!(
            engine.actualize("MSCI_World", interval(0, 10)).await,
            Err(SyncError::ExporterDisabled(_))
        ));

        let exporter = engine.set_active("MSCI_World", true).await.unwrap();
        assert_eq!(exporter.status, ExporterStatus::Active);
        assert!(exporter.is_actualizable());
    }

    #[tokio::test]
    async fn concurrent_actualization_of_one_series_is_rejected() {
        let engine = setup(Arc::new(ScriptedAdapter::new("mock", 0)));

        let exporter = engine
            .register_exporter("MSCI_World", "MSCI World index", "mock", "{}")
            .await
            .unwrap();

        let _held = engine.try_lock_series(&exporter).unwrap();

        assert!(matches!(
            engine.actualize("MSCI_World", interval(0, 10)).await,
            Err(SyncError::Busy(_))
        ));
        assert!(matches!(
            engine.delete_exporter("MSCI_World").await,
            Err(SyncError::Busy(_))
        ));
    }

    #[tokio::test]
    async fn shutdown_cancels_before_the_first_fetch() {
        let adapter = Arc::new(ScriptedAdapter::new("mock", 0));
        let engine = setup(adapter.clone());

        engine
            .register_exporter("MSCI_World", "MSCI World index", "mock", "{}")
            .await
            .unwrap();

        engine.shutdown();

        let report = engine.actualize("MSCI_World", interval(0, 10)).await.unwrap();
        assert!(!report.is_clean());
        assert_eq!(adapter.fetch_calls(), 0);
        assert!(engine.covered_intervals("MSCI_World").await.unwrap().is_empty());

        // The exporter is not at fault; it stays active.
        let exporter = &engine.exporters().await.unwrap()[0];
        assert_eq!(exporter.status, ExporterStatus::Active);
    }

    #[tokio::test]
    async fn actualize_all_isolates_series_results() {
        let adapter = Arc::new(ScriptedAdapter::new("mock", 0));
        let engine = setup(adapter.clone());

        engine
            .register_exporter("MSCI_World", "MSCI World index", "mock", "{}")
            .await
            .unwrap();
        engine
            .register_exporter("SP500", "S&P 500 index", "mock", "{}")
            .await
            .unwrap();
        // Inactive exporters are skipped entirely.
        engine
            .register_exporter("Dormant", "not synchronized", "mock", "{}")
            .await
            .unwrap();
        engine.set_active("Dormant", false).await.unwrap();

        let results = engine.actualize_all(moment(-5)).await.unwrap();
        assert_eq!(results.len(), 2);
        for (_, result) in &results {
            assert!(result.as_ref().unwrap().is_clean());
        }

        assert!(!engine.covered_intervals("MSCI_World").await.unwrap().is_empty());
        assert!(engine.covered_intervals("Dormant").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_exporter_removes_values_and_coverage() {
        let engine = setup(Arc::new(ScriptedAdapter::new("mock", 0)));

        engine
            .register_exporter("MSCI_World", "MSCI World index", "mock", "{}")
            .await
            .unwrap();
        engine.actualize("MSCI_World", interval(0, 10)).await.unwrap();

        engine.delete_exporter("MSCI_World").await.unwrap();

        assert!(engine.exporters().await.unwrap().is_empty());
        assert!(matches!(
            engine.covered_intervals("MSCI_World").await,
            Err(SyncError::ExporterNotFound(_))
        ));
    }

    #[tokio::test]
    async fn status_reflects_actuality_and_fragmentation() {
        let engine = setup(Arc::new(ScriptedAdapter::new("mock", 0)));

        engine
            .register_exporter("MSCI_World", "MSCI World index", "mock", "{}")
            .await
            .unwrap();

        // Two disjoint old ranges: fragmented and stale.
        engine.actualize("MSCI_World", interval(0, 5)).await.unwrap();
        engine.actualize("MSCI_World", interval(10, 15)).await.unwrap();

        let status = engine.status("MSCI_World").await.unwrap();
        assert!(!status.is_actual);
        assert!(status.has_gaps);
        assert_eq!(status.last_error, None);

        assert!(engine.has_gaps("MSCI_World", moment(0)).await.unwrap());
    }

    #[tokio::test]
    async fn check_sources_records_probe_outcomes() {
        let registry = Arc::new(AdapterRegistry::new());
        registry.register(Arc::new(ScriptedAdapter::new("cbr", 0))).unwrap();
        registry
            .register(Arc::new(ScriptedAdapter::with_probe_error("moex", "503")))
            .unwrap();

        let engine = SyncEngine::new(fast_config(), Database::in_memory(), registry);

        let checks = engine.check_sources().await.unwrap();
        assert_eq!(checks.len(), 2);
        // source_types() is sorted
        assert_eq!(checks[0].source_type, "cbr");
        assert!(checks[0].error_message.is_none());
        assert_eq!(checks[1].source_type, "moex");
        assert!(checks[1].error_message.as_deref().unwrap().contains("503"));

        // Recorded outcomes are readable back
        let recorded = engine.source_checks().await.unwrap();
        assert_eq!(recorded, checks);
    }
}
