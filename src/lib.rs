#![doc = include_str!("../README.md")]

/// Exports [`SourceAdapter`], [`AdapterRegistry`], and other types related to
/// external data sources.
///
/// [`SourceAdapter`]: crate::adapter::SourceAdapter
/// [`AdapterRegistry`]: crate::adapter::AdapterRegistry
pub mod adapter;
/// Exports [`Exporter`] and the other core series types.
///
/// [`Exporter`]: crate::exporter::Exporter
pub mod exporter;
/// Exports read-side helpers shaping stored values for display.
pub mod history;
/// Exports [`Interval`] and [`IntervalSet`], the coverage bookkeeping types.
///
/// [`Interval`]: crate::interval::Interval
/// [`IntervalSet`]: crate::interval::IntervalSet
pub mod interval;
/// Exports settings bundles for moving exporters between installations.
pub mod settings;
mod storage;
/// Exports [`SyncEngine`] and other types related to series synchronization.
///
/// [`SyncEngine`]: crate::sync::SyncEngine
pub mod sync;
mod util;

pub use storage::Database;

/// Error types returned by `finsync`.
pub mod error {
    pub use super::adapter::error::{FetchError, RegistryError};
    pub use super::interval::error::IntervalError;
    pub use super::settings::error::SettingsError;
    pub use super::storage::error::StorageError;
    pub use super::sync::{
        actualize_task::error::ActualizeError, error::SyncError, merge::error::MergeError,
    };

    /// Convenience general-purpose Result type alias.
    pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;
}

/// Exports the core domain models.
pub mod models {
    pub use super::exporter::{
        Exporter, ExporterId, ExporterStatus, SeriesPoint, SourceCheck, SourceCheckStatus,
    };
    pub use super::interval::{Interval, IntervalSet};
    pub use super::settings::{ExporterSettings, ImportSelection, IntervalPair, SettingsBundle};
    pub use super::sync::{
        actuality::StalenessTolerance,
        config::SyncConfig,
        report::{ActualizeReport, SeriesStatus},
    };
}
