use std::sync::Arc;

use tracing::debug;

use crate::{
    exporter::{ExporterId, SeriesPoint},
    interval::Interval,
    storage::Database,
};

pub mod error;

use error::{MergeError, Result};

/// Outcome of one committed merge.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub points_written: usize,
    /// Range committed into the interval set, if any coverage was added.
    pub interval_added: Option<Interval>,
}

/// Idempotently commits a fetched batch into storage and the series'
/// interval set.
pub(crate) struct MergeEngine {
    db: Arc<Database>,
}

impl MergeEngine {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Merges `points`, fetched for the claimed `range`, into the series.
    ///
    /// Every point must lie inside `range`; a single stray point aborts the
    /// whole merge with nothing committed. Values are upserted first and the
    /// claimed range is inserted into the interval set only after all writes
    /// succeed, so no interval ever claims coverage for data that was never
    /// written. If the writes fail partway, the range remains a gap and is
    /// picked up again by the next actualization pass: merge semantics are
    /// at-least-once and idempotent.
    ///
    /// A fetch that returned no points commits coverage only when *both*
    /// edges of `range` pierce existing coverage (bridging two known-good
    /// spans); a range sticking out by either edge would claim data that
    /// does not exist.
    pub async fn merge(
        &self,
        series: ExporterId,
        range: Interval,
        points: &[SeriesPoint],
    ) -> Result<MergeOutcome> {
        for point in points {
            if !range.contains(point.moment) {
                return Err(MergeError::PointOutOfRange {
                    moment: point.moment,
                    range,
                });
            }
        }

        let mut set = self.db.intervals.load_interval_set(series).await?;

        if points.is_empty() && !(pierces(&set, range.start()) && pierces(&set, range.end())) {
            debug!(%series, %range, "empty fetch sticking out of coverage, nothing to commit");
            return Ok(MergeOutcome {
                points_written: 0,
                interval_added: None,
            });
        }

        let points_written = self.db.values.upsert_values(series, points).await?;

        set.insert(range);
        self.db.intervals.persist_interval_set(series, &set).await?;

        debug!(%series, %range, points_written, "merge committed");

        Ok(MergeOutcome {
            points_written,
            interval_added: Some(range),
        })
    }
}

/// True iff `moment` lies inside or on the closed boundary of some covered
/// interval.
fn pierces(set: &crate::interval::IntervalSet, moment: chrono::DateTime<chrono::Utc>) -> bool {
    set.iter()
        .any(|covered| covered.start() <= moment && moment <= covered.end())
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use crate::exporter::Exporter;

    use super::*;

    fn moment(offset_days: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap() + Duration::days(offset_days)
    }

    fn interval(start: i64, end: i64) -> Interval {
        Interval::new(moment(start), moment(end)).unwrap()
    }

    async fn setup() -> (Arc<Database>, ExporterId, MergeEngine) {
        let db = Database::in_memory();
        let exporter = Exporter::new("MSCI_World", "MSCI World index", "mock", "{}");
        db.exporters.add(&exporter).await.unwrap();
        let engine = MergeEngine::new(db.clone());

        (db, exporter.id, engine)
    }

    #[tokio::test]
    async fn merge_commits_values_then_coverage() {
        let (db, series, engine) = setup().await;

        let points = vec![
            SeriesPoint::new(moment(1), 10.0),
            SeriesPoint::new(moment(3), 11.0),
        ];
        let outcome = engine.merge(series, interval(0, 5), &points).await.unwrap();

        assert_eq!(outcome.points_written, 2);
        assert_eq!(outcome.interval_added, Some(interval(0, 5)));

        let set = db.intervals.load_interval_set(series).await.unwrap();
        assert_eq!(set.as_slice(), &[interval(0, 5)]);
        assert_eq!(db.values.count_values(series).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn point_outside_claimed_range_aborts_whole_merge() {
        let (db, series, engine) = setup().await;

        let points = vec![
            SeriesPoint::new(moment(1), 10.0),
            SeriesPoint::new(moment(15), 99.0),
        ];
        let result = engine.merge(series, interval(0, 10), &points).await;

        assert!(matches!(result, Err(MergeError::PointOutOfRange { moment: m, .. }) if m == moment(15)));

        // Nothing committed
        assert!(db.intervals.load_interval_set(series).await.unwrap().is_empty());
        assert_eq!(db.values.count_values(series).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn merge_is_idempotent() {
        let (db, series, engine) = setup().await;

        let points = vec![SeriesPoint::new(moment(2), 10.0)];
        engine.merge(series, interval(0, 5), &points).await.unwrap();

        let set_once = db.intervals.load_interval_set(series).await.unwrap();
        let values_once = db.values.all_values(series).await.unwrap();

        engine.merge(series, interval(0, 5), &points).await.unwrap();

        assert_eq!(db.intervals.load_interval_set(series).await.unwrap(), set_once);
        assert_eq!(db.values.all_values(series).await.unwrap(), values_once);
    }

    #[tokio::test]
    async fn redownload_overwrites_same_moment() {
        let (db, series, engine) = setup().await;

        engine
            .merge(series, interval(0, 5), &[SeriesPoint::new(moment(2), 10.0)])
            .await
            .unwrap();
        engine
            .merge(series, interval(0, 5), &[SeriesPoint::new(moment(2), 12.5)])
            .await
            .unwrap();

        let values = db.values.all_values(series).await.unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].value, 12.5);
    }

    #[tokio::test]
    async fn empty_fetch_over_uncovered_range_adds_no_coverage() {
        let (db, series, engine) = setup().await;

        let outcome = engine.merge(series, interval(0, 5), &[]).await.unwrap();

        assert_eq!(outcome.interval_added, None);
        assert!(db.intervals.load_interval_set(series).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_fetch_touching_coverage_on_one_side_adds_no_coverage() {
        let (db, series, engine) = setup().await;

        engine
            .merge(series, interval(0, 5), &[SeriesPoint::new(moment(1), 1.0)])
            .await
            .unwrap();

        // Actualizing forward past a market closure: the range abuts existing
        // coverage on the left but sticks out on the right, so nothing may be
        // claimed.
        let outcome = engine.merge(series, interval(5, 10), &[]).await.unwrap();
        assert_eq!(outcome.interval_added, None);

        let set = db.intervals.load_interval_set(series).await.unwrap();
        assert_eq!(set.as_slice(), &[interval(0, 5)]);
        assert!(!set.covers(moment(7)));

        // Mirror image: sticking out on the left.
        let outcome = engine.merge(series, interval(-5, 0), &[]).await.unwrap();
        assert_eq!(outcome.interval_added, None);
        assert_eq!(
            db.intervals.load_interval_set(series).await.unwrap().as_slice(),
            &[interval(0, 5)]
        );
    }

    #[tokio::test]
    async fn empty_fetch_bridging_coverage_coalesces() {
        let (db, series, engine) = setup().await;

        engine
            .merge(series, interval(0, 5), &[SeriesPoint::new(moment(1), 1.0)])
            .await
            .unwrap();
        engine
            .merge(series, interval(10, 15), &[SeriesPoint::new(moment(12), 2.0)])
            .await
            .unwrap();

        // A holiday span with no values between two covered ranges still
        // counts as synchronized.
        let outcome = engine.merge(series, interval(5, 10), &[]).await.unwrap();
        assert_eq!(outcome.interval_added, Some(interval(5, 10)));

        let set = db.intervals.load_interval_set(series).await.unwrap();
        assert_eq!(set.as_slice(), &[interval(0, 15)]);
    }
}
