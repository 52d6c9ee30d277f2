use std::num::{NonZeroU32, NonZeroUsize};

use tokio::time;

use super::actuality::StalenessTolerance;

/// Configuration of the synchronization engine.
///
/// Defaults are conservative enough for public data providers; every knob has
/// a `with_*` builder for tuning.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    source_cooldown: time::Duration,
    retry_backoff_base: time::Duration,
    retry_jitter_percent: u32,
    source_error_max_trials: NonZeroU32,
    max_concurrent_fetches: NonZeroUsize,
    staleness_tolerance: StalenessTolerance,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            source_cooldown: time::Duration::from_secs(1),
            retry_backoff_base: time::Duration::from_millis(500),
            retry_jitter_percent: 20,
            source_error_max_trials: 3.try_into().expect("not zero"),
            max_concurrent_fetches: 4.try_into().expect("not zero"),
            staleness_tolerance: StalenessTolerance::LastWorkingDay,
        }
    }
}

impl SyncConfig {
    /// Pause before every source call, respecting provider rate limits.
    pub fn source_cooldown(&self) -> time::Duration {
        self.source_cooldown
    }

    /// Base delay of the exponential retry backoff.
    pub fn retry_backoff_base(&self) -> time::Duration {
        self.retry_backoff_base
    }

    /// Jitter applied on top of each backoff delay, as a percentage of it.
    pub fn retry_jitter_percent(&self) -> u32 {
        self.retry_jitter_percent
    }

    /// Maximum fetch attempts per sub-range before the exporter is disabled.
    pub fn source_error_max_trials(&self) -> NonZeroU32 {
        self.source_error_max_trials
    }

    /// Upper bound on simultaneously in-flight source calls across series.
    pub fn max_concurrent_fetches(&self) -> NonZeroUsize {
        self.max_concurrent_fetches
    }

    /// Default staleness tolerance used by `status`.
    pub fn staleness_tolerance(&self) -> StalenessTolerance {
        self.staleness_tolerance
    }

    pub fn with_source_cooldown(mut self, cooldown: time::Duration) -> Self {
        self.source_cooldown = cooldown;
        self
    }

    pub fn with_retry_backoff_base(mut self, base: time::Duration) -> Self {
        self.retry_backoff_base = base;
        self
    }

    pub fn with_retry_jitter_percent(mut self, percent: u32) -> Self {
        self.retry_jitter_percent = percent;
        self
    }

    pub fn with_source_error_max_trials(mut self, max_trials: NonZeroU32) -> Self {
        self.source_error_max_trials = max_trials;
        self
    }

    pub fn with_max_concurrent_fetches(mut self, max: NonZeroUsize) -> Self {
        self.max_concurrent_fetches = max;
        self
    }

    pub fn with_staleness_tolerance(mut self, tolerance: StalenessTolerance) -> Self {
        self.staleness_tolerance = tolerance;
        self
    }
}

/// Retry/backoff knobs scoped to one actualization run.
#[derive(Clone, Debug)]
pub(crate) struct ActualizeTaskConfig {
    source_cooldown: time::Duration,
    retry_backoff_base: time::Duration,
    retry_jitter_percent: u32,
    source_error_max_trials: NonZeroU32,
}

impl ActualizeTaskConfig {
    pub fn source_cooldown(&self) -> time::Duration {
        self.source_cooldown
    }

    pub fn retry_backoff_base(&self) -> time::Duration {
        self.retry_backoff_base
    }

    pub fn retry_jitter_percent(&self) -> u32 {
        self.retry_jitter_percent
    }

    pub fn source_error_max_trials(&self) -> NonZeroU32 {
        self.source_error_max_trials
    }
}

impl From<&SyncConfig> for ActualizeTaskConfig {
    fn from(value: &SyncConfig) -> Self {
        Self {
            source_cooldown: value.source_cooldown,
            retry_backoff_base: value.retry_backoff_base,
            retry_jitter_percent: value.retry_jitter_percent,
            source_error_max_trials: value.source_error_max_trials,
        }
    }
}
