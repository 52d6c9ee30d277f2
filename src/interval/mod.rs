use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod error;

use error::{IntervalError, Result};

/// A half-open time range `[start, end)` considered fully synchronized.
///
/// Construction enforces `start < end`, so a degenerate or inverted range can
/// never exist once built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawInterval", into = "RawInterval")]
pub struct Interval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Serialize, Deserialize)]
struct RawInterval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TryFrom<RawInterval> for Interval {
    type Error = IntervalError;

    fn try_from(value: RawInterval) -> Result<Self> {
        Self::new(value.start, value.end)
    }
}

impl From<Interval> for RawInterval {
    fn from(value: Interval) -> Self {
        Self {
            start: value.start,
            end: value.end,
        }
    }
}

impl Interval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start >= end {
            return Err(IntervalError::InvalidRange { start, end });
        }

        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// True iff `moment` lies inside `[start, end)`.
    pub fn contains(&self, moment: DateTime<Utc>) -> bool {
        self.start <= moment && moment < self.end
    }

    /// True iff `other` overlaps this interval or is directly adjacent to it,
    /// i.e. the two can be coalesced into a single interval.
    pub fn touches(&self, other: &Self) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// Ordered collection of non-overlapping, non-adjacent intervals covering the
/// known-good stored ranges of a single series.
///
/// Invariants, maintained after every mutation:
/// 1. sorted ascending by start,
/// 2. no two intervals overlap,
/// 3. no two intervals are adjacent (adjacency is coalesced on insert).
///
/// Serializes as a plain list of intervals; deserialization re-inserts every
/// element, so an unsorted or overlapping list normalizes back into a valid
/// set instead of bypassing the invariants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Interval>", into = "Vec<Interval>")]
pub struct IntervalSet {
    intervals: Vec<Interval>,
}

impl From<Vec<Interval>> for IntervalSet {
    fn from(intervals: Vec<Interval>) -> Self {
        let mut set = Self::new();
        for interval in intervals {
            set.insert(interval);
        }

        set
    }
}

impl From<IntervalSet> for Vec<Interval> {
    fn from(set: IntervalSet) -> Self {
        set.intervals
    }
}

impl IntervalSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores a set from its persisted `(start, end)` pairs.
    ///
    /// Pairs may arrive unsorted; overlapping or adjacent pairs are coalesced.
    /// Fails with `InvalidRange` if any pair is degenerate or inverted.
    pub fn from_pairs<I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (DateTime<Utc>, DateTime<Utc>)>,
    {
        let mut set = Self::new();
        for (start, end) in pairs {
            set.insert(Interval::new(start, end)?);
        }

        Ok(set)
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn as_slice(&self) -> &[Interval] {
        &self.intervals
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interval> {
        self.intervals.iter()
    }

    /// Latest covered moment (exclusive), if the set is non-empty.
    pub fn max_end(&self) -> Option<DateTime<Utc>> {
        self.intervals.last().map(|interval| interval.end)
    }

    /// Earliest covered moment, if the set is non-empty.
    pub fn min_start(&self) -> Option<DateTime<Utc>> {
        self.intervals.first().map(|interval| interval.start)
    }

    /// True iff some interval in the set contains `moment`.
    pub fn covers(&self, moment: DateTime<Utc>) -> bool {
        let idx = self
            .intervals
            .partition_point(|interval| interval.start <= moment);

        idx > 0 && self.intervals[idx - 1].contains(moment)
    }

    /// Inserts a newly-confirmed covered range.
    ///
    /// All existing intervals overlapping or adjacent to `range` are replaced
    /// by a single interval spanning the union's bounds. Binary search keeps
    /// this O(log n + k), with k the number of intervals touched.
    pub fn insert(&mut self, range: Interval) {
        let lo = self
            .intervals
            .partition_point(|interval| interval.end < range.start);
        let hi = self
            .intervals
            .partition_point(|interval| interval.start <= range.end);

        if lo == hi {
            // No interval touches `range`
            self.intervals.insert(lo, range);
            return;
        }

        let start = range.start.min(self.intervals[lo].start);
        let end = range.end.max(self.intervals[hi - 1].end);
        let merged = Interval { start, end };

        let _ = self.intervals.splice(lo..hi, std::iter::once(merged));
    }

    /// Returns the ordered sub-ranges of `range` not covered by any interval
    /// in the set.
    ///
    /// The iterator is lazy, finite and restartable against the snapshot it
    /// was created from: gaps come out ascending by start, never overlap each
    /// other and never overlap the covered set. If nothing intersects
    /// `range`, the single gap is `range` itself.
    pub fn gaps(&self, range: Interval) -> Gaps<'_> {
        // Skip intervals ending at or before the requested start; they can't
        // cover any part of the range.
        let idx = self
            .intervals
            .partition_point(|interval| interval.end <= range.start);

        Gaps {
            intervals: &self.intervals[idx..],
            cursor: range.start,
            range_end: range.end,
            done: false,
        }
    }
}

/// Iterator over the uncovered sub-ranges of a requested range.
///
/// Produced by [`IntervalSet::gaps`].
#[derive(Debug, Clone)]
pub struct Gaps<'a> {
    intervals: &'a [Interval],
    cursor: DateTime<Utc>,
    range_end: DateTime<Utc>,
    done: bool,
}

impl Iterator for Gaps<'_> {
    type Item = Interval;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            if self.cursor >= self.range_end {
                self.done = true;
                return None;
            }

            let Some((covered, rest)) = self.intervals.split_first() else {
                self.done = true;
                return Some(Interval {
                    start: self.cursor,
                    end: self.range_end,
                });
            };

            if covered.start >= self.range_end {
                self.done = true;
                return Some(Interval {
                    start: self.cursor,
                    end: self.range_end,
                });
            }

            self.intervals = rest;

            let gap = (covered.start > self.cursor).then_some(Interval {
                start: self.cursor,
                end: covered.start,
            });

            self.cursor = self.cursor.max(covered.end);

            if gap.is_some() {
                return gap;
            }
        }

        None
    }
}
