use chrono::{DateTime, Datelike, Duration, Utc, Weekday};

use crate::interval::{Interval, IntervalSet};

/// Allowed staleness window of a series before it stops being "actual".
///
/// Pure read computation, always evaluated against the latest interval-set
/// snapshot; nothing here is cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StalenessTolerance {
    /// The latest covered moment may lag `now` by at most this duration.
    Fixed(Duration),
    /// Coverage up to the most recent working day counts as actual: on
    /// Mondays and Sundays the previous Friday, otherwise yesterday. Suits
    /// daily market series that pause over weekends.
    LastWorkingDay,
}

impl StalenessTolerance {
    /// Earliest covered end still considered actual at `now`.
    pub fn threshold(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Fixed(tolerance) => now - *tolerance,
            Self::LastWorkingDay => {
                let days_back = match now.weekday() {
                    Weekday::Mon => 3,
                    Weekday::Sun => 2,
                    _ => 1,
                };
                let day = now.date_naive() - Duration::days(days_back);

                day.and_hms_opt(0, 0, 0)
                    .expect("midnight is always a valid time")
                    .and_utc()
            }
        }
    }
}

/// True iff the set's maximal covered end reaches `now` within `tolerance`.
pub fn is_actual(set: &IntervalSet, now: DateTime<Utc>, tolerance: StalenessTolerance) -> bool {
    set.max_end()
        .is_some_and(|max_end| max_end >= tolerance.threshold(now))
}

/// True iff `[lower_bound, now)` contains at least one uncovered sub-range.
pub fn has_gaps(set: &IntervalSet, lower_bound: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    let Ok(range) = Interval::new(lower_bound, now) else {
        // Empty or inverted request ranges have nothing to be missing.
        return false;
    };

    set.gaps(range).next().is_some()
}

/// True iff the covered span itself is fragmented (gaps strictly between the
/// earliest and latest covered moments).
pub fn has_interior_gaps(set: &IntervalSet) -> bool {
    set.len() > 1
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn moment(offset_days: i64) -> DateTime<Utc> {
        // 2021-06-04 was a Friday
        Utc.with_ymd_and_hms(2021, 6, 4, 12, 0, 0).unwrap() + Duration::days(offset_days)
    }

    fn set_covering(start: i64, end: i64) -> IntervalSet {
        let mut set = IntervalSet::new();
        set.insert(Interval::new(moment(start), moment(end)).unwrap());
        set
    }

    #[test]
    fn fixed_tolerance_compares_max_end_against_now() {
        let set = set_covering(-30, -2);
        let now = moment(0);

        assert!(is_actual(&set, now, StalenessTolerance::Fixed(Duration::days(3))));
        assert!(!is_actual(&set, now, StalenessTolerance::Fixed(Duration::days(1))));
    }

    #[test]
    fn empty_set_is_never_actual() {
        let set = IntervalSet::new();
        assert!(!is_actual(
            &set,
            moment(0),
            StalenessTolerance::Fixed(Duration::days(365))
        ));
    }

    #[test]
    fn last_working_day_rolls_over_weekends() {
        // Saturday noon: last working day is Friday (yesterday)
        let saturday = moment(1);
        assert_eq!(
            StalenessTolerance::LastWorkingDay.threshold(saturday),
            moment(0).date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc()
        );

        // Monday noon: last working day is the previous Friday
        let monday = moment(3);
        assert_eq!(
            StalenessTolerance::LastWorkingDay.threshold(monday),
            moment(0).date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc()
        );

        // Sunday noon: also the previous Friday
        let sunday = moment(2);
        assert_eq!(
            StalenessTolerance::LastWorkingDay.threshold(sunday),
            moment(0).date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc()
        );

        // A series covered into Friday stays actual all weekend
        let set = set_covering(-7, 0);
        assert!(is_actual(&set, monday, StalenessTolerance::LastWorkingDay));
    }

    #[test]
    fn gap_detection_over_requested_span() {
        let mut set = set_covering(0, 5);
        set.insert(Interval::new(moment(10), moment(15)).unwrap());

        assert!(has_gaps(&set, moment(0), moment(15)));
        assert!(!has_gaps(&set, moment(1), moment(4)));
        assert!(has_interior_gaps(&set));
        assert!(!has_interior_gaps(&set_covering(0, 5)));

        // Inverted bound is treated as an empty request
        assert!(!has_gaps(&set, moment(15), moment(0)));
    }
}
