use std::sync::Arc;

use rand::Rng;
use tokio::{
    sync::broadcast::{self, error::TryRecvError},
    time,
};
use tracing::{debug, warn};

use crate::{
    adapter::{SourceAdapter, error::FetchError},
    exporter::{Exporter, SeriesPoint},
    interval::Interval,
    storage::Database,
};

use super::{
    config::{ActualizeTaskConfig, SyncConfig},
    merge::MergeEngine,
    report::ActualizeReport,
};

pub mod error;

use error::{ActualizeError, Result};

/// Download coordinator for one series and one actualization run.
///
/// Short-lived: created per run, discarded on completion. Walks the gaps of
/// the requested range strictly in ascending order, fetching each sub-range
/// with bounded retry and handing every successful fetch to the merge engine
/// before the next sub-range is attempted, so the series' interval set stays
/// internally consistent between merges.
pub(crate) struct ActualizeTask {
    config: ActualizeTaskConfig,
    db: Arc<Database>,
    adapter: Arc<dyn SourceAdapter>,
    merge: MergeEngine,
    shutdown_rx: broadcast::Receiver<()>,
}

impl ActualizeTask {
    pub fn new(
        config: &SyncConfig,
        db: Arc<Database>,
        adapter: Arc<dyn SourceAdapter>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        let merge = MergeEngine::new(db.clone());

        Self {
            config: config.into(),
            db,
            adapter,
            merge,
            shutdown_rx,
        }
    }

    fn cancelled(&mut self) -> bool {
        !matches!(self.shutdown_rx.try_recv(), Err(TryRecvError::Empty))
    }

    /// Exponential backoff with jitter, so many series retrying at once don't
    /// hammer the source in lockstep.
    fn backoff_delay(&self, trials: u32) -> time::Duration {
        let base_ms = self.config.retry_backoff_base().as_millis() as u64;
        let backoff_ms = base_ms.saturating_mul(1u64 << (trials - 1).min(16));

        let jitter_range = if self.config.retry_jitter_percent() == 0 {
            1
        } else {
            std::cmp::max(
                1,
                backoff_ms.saturating_mul(u64::from(self.config.retry_jitter_percent())) / 100,
            )
        };
        let mut rng = rand::rng();

        time::Duration::from_millis(backoff_ms + rng.random_range(0..jitter_range))
    }

    async fn fetch_with_retry(
        &self,
        exporter: &Exporter,
        gap: Interval,
    ) -> Result<Vec<SeriesPoint>> {
        let max_trials = self.config.source_error_max_trials().get();
        let mut trials = 0;

        loop {
            time::sleep(self.config.source_cooldown()).await;

            match self.adapter.fetch(&exporter.instrument_params, gap).await {
                Ok(points) => return Ok(points),
                Err(error @ FetchError::Permanent(_)) => {
                    return Err(ActualizeError::SourcePermanentFailure(error));
                }
                Err(error) => {
                    trials += 1;
                    if trials >= max_trials {
                        return Err(ActualizeError::SourceMaxTrialsReached {
                            error,
                            trials: max_trials,
                        });
                    }

                    let delay = self.backoff_delay(trials);
                    warn!(
                        exporter = %exporter.unique_code,
                        %gap,
                        trials,
                        ?delay,
                        %error,
                        "transient fetch failure, backing off"
                    );
                    time::sleep(delay).await;
                }
            }
        }
    }

    /// Runs the actualization of `range`.
    ///
    /// Returns the progress made together with the error that ended the run
    /// early, if any; merges committed before the failure are kept.
    pub async fn run(
        mut self,
        exporter: &Exporter,
        range: Interval,
    ) -> (ActualizeReport, Option<ActualizeError>) {
        let mut report = ActualizeReport::default();

        let set = match self.db.intervals.load_interval_set(exporter.id).await {
            Ok(set) => set,
            Err(error) => return (report, Some(error.into())),
        };
        let gaps: Vec<Interval> = set.gaps(range).collect();

        debug!(
            exporter = %exporter.unique_code,
            %range,
            missing = gaps.len(),
            "starting actualization run"
        );

        for gap in gaps {
            // Cooperative cancellation between sub-ranges only; a cancelled
            // run keeps whatever consistent state the last merge produced.
            if self.cancelled() {
                return (report, Some(ActualizeError::Cancelled));
            }

            let points = match self.fetch_with_retry(exporter, gap).await {
                Ok(points) => points,
                Err(error) => return (report, Some(error)),
            };

            match self.merge.merge(exporter.id, gap, &points).await {
                Ok(outcome) => {
                    report.points_written += outcome.points_written;
                    if let Some(interval) = outcome.interval_added {
                        report.intervals_added.push(interval);
                    }
                }
                Err(error) => return (report, Some(error.into())),
            }
        }

        (report, None)
    }
}
