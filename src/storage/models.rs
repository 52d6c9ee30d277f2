use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::exporter::{Exporter, ExporterStatus, SeriesPoint, SourceCheck};

#[derive(Debug, FromRow)]
pub struct ExporterRow {
    pub id: Uuid,
    pub unique_code: String,
    pub description: String,
    pub is_active: bool,
    pub source_type: String,
    pub instrument_params: String,
    pub status_error: Option<String>,
    pub last_actualized: Option<DateTime<Utc>>,
}

impl From<ExporterRow> for Exporter {
    fn from(row: ExporterRow) -> Self {
        let status = match row.status_error {
            Some(error) => ExporterStatus::Disabled { error },
            None => ExporterStatus::Active,
        };

        Self {
            id: row.id.into(),
            unique_code: row.unique_code,
            description: row.description,
            is_active: row.is_active,
            source_type: row.source_type,
            instrument_params: row.instrument_params,
            status,
            last_actualized: row.last_actualized,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct SeriesValueRow {
    pub moment: DateTime<Utc>,
    pub value: f64,
    pub comment: Option<String>,
}

impl From<SeriesValueRow> for SeriesPoint {
    fn from(row: SeriesValueRow) -> Self {
        Self {
            moment: row.moment,
            value: row.value,
            comment: row.comment,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct DownloadedIntervalRow {
    pub date_from: DateTime<Utc>,
    pub date_to: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
pub struct SourceCheckRow {
    pub source_type: String,
    pub error_message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl From<SourceCheckRow> for SourceCheck {
    fn from(row: SourceCheckRow) -> Self {
        Self {
            source_type: row.source_type,
            error_message: row.error_message,
            checked_at: row.checked_at,
        }
    }
}
