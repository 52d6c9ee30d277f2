use serde::Serialize;

use crate::interval::Interval;

/// Typed result of one actualization run, for the UI/API collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActualizeReport {
    /// Coverage committed by this run, ascending by start.
    pub intervals_added: Vec<Interval>,
    pub points_written: usize,
    /// Failures that ended the run early (the exporter may have been
    /// disabled); merges committed before a failure are kept.
    pub errors: Vec<String>,
}

impl ActualizeReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// On-demand status snapshot of one series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesStatus {
    /// Coverage reaches "now" within the configured staleness tolerance.
    pub is_actual: bool,
    /// The covered span itself is fragmented.
    pub has_gaps: bool,
    pub last_error: Option<String>,
}
