//! Read-side helpers shaping stored series values for display and export.
//!
//! Pure functions over already-loaded points; nothing here touches storage.

use chrono::Duration;

use crate::{exporter::SeriesPoint, interval::Interval};

/// Values with moments inside `range`, ascending by moment.
///
/// Moments outside the range are dropped, duplicates by moment keep their
/// last occurrence.
pub fn sorted_history(points: &[SeriesPoint], range: Interval) -> Vec<SeriesPoint> {
    let mut history: Vec<SeriesPoint> = points
        .iter()
        .filter(|point| range.contains(point.moment))
        .cloned()
        .collect();
    history.sort_by_key(|point| point.moment);
    history.dedup_by(|later, earlier| {
        let duplicate = later.moment == earlier.moment;
        if duplicate {
            // dedup keeps the first of a pair; we want the later observation
            std::mem::swap(later, earlier);
        }
        duplicate
    });

    history
}

/// One value per calendar day across `range`, carrying the last observation
/// forward over days without one.
///
/// Days before the first observation inside the range stay unfilled, since
/// there is nothing yet to carry. Within one day the latest observation wins.
/// Filled points sit at midnight UTC of their day and inherit no comment.
pub fn fill_daily_gaps(points: &[SeriesPoint], range: Interval) -> Vec<SeriesPoint> {
    let history = sorted_history(points, range);
    let Some(first) = history.first() else {
        return Vec::new();
    };

    let mut filled = Vec::new();
    let mut observations = history.iter().peekable();
    let mut last_value = first.value;

    let mut day = first.moment.date_naive();
    let last_day = (range.end() - Duration::nanoseconds(1)).date_naive();

    while day <= last_day {
        let mut observed: Option<&SeriesPoint> = None;
        while let Some(point) = observations.peek() {
            if point.moment.date_naive() > day {
                break;
            }
            observed = observations.next();
        }

        let point = match observed {
            Some(point) => {
                last_value = point.value;
                point.clone()
            }
            None => SeriesPoint::new(
                day.and_hms_opt(0, 0, 0)
                    .expect("midnight is always a valid time")
                    .and_utc(),
                last_value,
            ),
        };
        filled.push(point);

        day += Duration::days(1);
    }

    filled
}
