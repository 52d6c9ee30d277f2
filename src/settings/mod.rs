//! Versioned JSON settings bundles for moving exporters between
//! installations.
//!
//! A bundle carries, per exporter, the registration record, its stored values
//! and its synchronized coverage. Import is selective: each part can be
//! applied or skipped per exporter, except that coverage is never imported
//! without the values behind it.

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    exporter::{Exporter, SeriesPoint},
    interval::IntervalSet,
    storage::Database,
};

pub mod error;

use error::{Result, SettingsError};

const BUNDLE_VERSION: &str = "1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsBundle {
    pub version: String,
    pub exporters: Vec<ExporterSettings>,
}

/// One exporter's portable state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExporterSettings {
    pub unique_code: String,
    pub description: String,
    pub is_active: bool,
    pub source_type: String,
    pub instrument_params: String,
    pub history_data: Vec<SeriesPoint>,
    pub downloaded_intervals: Vec<IntervalPair>,
}

/// Persisted form of one covered interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntervalPair {
    pub date_from: DateTime<Utc>,
    pub date_to: DateTime<Utc>,
}

/// Which parts of a bundled exporter to apply on import.
///
/// Exporters absent from the import selection are skipped entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSelection {
    pub exporter: bool,
    pub history_data: bool,
    pub downloaded_intervals: bool,
}

impl ImportSelection {
    pub fn everything() -> Self {
        Self {
            exporter: true,
            history_data: true,
            downloaded_intervals: true,
        }
    }
}

impl SettingsBundle {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let bundle: Self = serde_json::from_str(content)?;
        if bundle.version != BUNDLE_VERSION {
            return Err(SettingsError::UnsupportedVersion(bundle.version));
        }

        Ok(bundle)
    }
}

/// Bundles the named exporters with their values and coverage.
pub async fn export_settings(db: &Arc<Database>, codes: &[&str]) -> Result<SettingsBundle> {
    info!(exporters = codes.len(), "exporting settings bundle");

    let mut exporters = Vec::with_capacity(codes.len());
    for code in codes {
        let exporter = db
            .exporters
            .get_by_code(code)
            .await?
            .ok_or_else(|| SettingsError::UnknownExporter(code.to_string()))?;

        let history_data = db.values.all_values(exporter.id).await?;
        let downloaded_intervals = db
            .intervals
            .load_interval_set(exporter.id)
            .await?
            .iter()
            .map(|interval| IntervalPair {
                date_from: interval.start(),
                date_to: interval.end(),
            })
            .collect();

        exporters.push(ExporterSettings {
            unique_code: exporter.unique_code,
            description: exporter.description,
            is_active: exporter.is_active,
            source_type: exporter.source_type,
            instrument_params: exporter.instrument_params,
            history_data,
            downloaded_intervals,
        });
    }

    Ok(SettingsBundle {
        version: BUNDLE_VERSION.to_string(),
        exporters,
    })
}

/// Applies the selected parts of `bundle` to the database.
///
/// An exporter record is created or, when the unique code already exists,
/// its mutable attributes are overwritten while identity and status are
/// kept. Values upsert moment-by-moment; intervals merge into the existing
/// coverage after validation. Importing intervals is rejected unless values
/// will actually exist afterwards, either carried by the bundle or already
/// stored, so coverage can never be imported for data that is not there.
pub async fn import_settings(
    db: &Arc<Database>,
    bundle: &SettingsBundle,
    selections: &HashMap<String, ImportSelection>,
) -> Result<()> {
    info!(exporters = selections.len(), "importing settings bundle");

    for item in &bundle.exporters {
        let Some(selection) = selections.get(&item.unique_code) else {
            continue;
        };

        let existing = db.exporters.get_by_code(&item.unique_code).await?;

        let exporter = if selection.exporter {
            let exporter = match existing {
                Some(mut exporter) => {
                    exporter.description = item.description.clone();
                    exporter.is_active = item.is_active;
                    exporter.source_type = item.source_type.clone();
                    exporter.instrument_params = item.instrument_params.clone();
                    db.exporters.update(&exporter).await?;
                    exporter
                }
                None => {
                    let mut exporter = Exporter::new(
                        item.unique_code.clone(),
                        item.description.clone(),
                        item.source_type.clone(),
                        item.instrument_params.clone(),
                    );
                    exporter.is_active = item.is_active;
                    db.exporters.add(&exporter).await?;
                    exporter
                }
            };
            Some(exporter)
        } else {
            existing
        };

        let Some(exporter) = exporter else {
            return Err(SettingsError::UnknownExporter(item.unique_code.clone()));
        };

        if selection.downloaded_intervals && !item.downloaded_intervals.is_empty() {
            // Coverage may only land where values will actually exist after
            // the import, whether they come from the bundle or were already
            // stored.
            let importing_values = selection.history_data && !item.history_data.is_empty();
            if !importing_values && db.values.count_values(exporter.id).await? == 0 {
                return Err(SettingsError::IntervalsWithoutValues(
                    item.unique_code.clone(),
                ));
            }
        }

        if selection.history_data {
            db.values.upsert_values(exporter.id, &item.history_data).await?;
        }

        if selection.downloaded_intervals && !item.downloaded_intervals.is_empty() {
            let imported = IntervalSet::from_pairs(
                item.downloaded_intervals
                    .iter()
                    .map(|pair| (pair.date_from, pair.date_to)),
            )?;

            let mut set = db.intervals.load_interval_set(exporter.id).await?;
            for interval in imported.iter() {
                set.insert(*interval);
            }
            db.intervals.persist_interval_set(exporter.id, &set).await?;
        }
    }

    Ok(())
}
