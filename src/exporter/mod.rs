use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;
use uuid::Uuid;

/// Identity of one registered exporter and, through it, of the series it
/// tracks. Immutable once the exporter is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExporterId(Uuid);

impl ExporterId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for ExporterId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for ExporterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of an exporter.
///
/// A disabled exporter keeps its last error message for diagnosis and is
/// excluded from automatic actualization until re-enabled by an operator.
#[derive(Debug, Clone, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
pub enum ExporterStatus {
    Active,
    Disabled { error: String },
}

impl ExporterStatus {
    pub fn is_disabled(&self) -> bool {
        matches!(self, Self::Disabled { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Active => None,
            Self::Disabled { error } => Some(error),
        }
    }
}

/// A named binding to an external source plus a specific instrument/series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exporter {
    pub id: ExporterId,
    pub unique_code: String,
    pub description: String,
    pub is_active: bool,
    /// Key into the adapter registry.
    pub source_type: String,
    /// Raw, source-specific instrument parameters, opaque to the engine.
    pub instrument_params: String,
    pub status: ExporterStatus,
    pub last_actualized: Option<DateTime<Utc>>,
}

impl Exporter {
    pub fn new(
        unique_code: impl Into<String>,
        description: impl Into<String>,
        source_type: impl Into<String>,
        instrument_params: impl Into<String>,
    ) -> Self {
        Self {
            id: ExporterId::generate(),
            unique_code: unique_code.into(),
            description: description.into(),
            is_active: true,
            source_type: source_type.into(),
            instrument_params: instrument_params.into(),
            status: ExporterStatus::Active,
            last_actualized: None,
        }
    }

    /// True iff the exporter takes part in automatic actualization.
    pub fn is_actualizable(&self) -> bool {
        self.is_active && !self.status.is_disabled()
    }
}

impl fmt::Display for Exporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Exporter (id={}, unique_code={}, source_type={}, status={})",
            self.id, self.unique_code, self.source_type, self.status
        )
    }
}

/// A single stored observation of a series.
///
/// At most one point exists per (series, moment); a later merge of the same
/// moment overwrites, never duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub moment: DateTime<Utc>,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl SeriesPoint {
    pub fn new(moment: DateTime<Utc>, value: f64) -> Self {
        Self {
            moment,
            value,
            comment: None,
        }
    }

    pub fn with_comment(moment: DateTime<Utc>, value: f64, comment: impl Into<String>) -> Self {
        Self {
            moment,
            value,
            comment: Some(comment.into()),
        }
    }
}

/// Result of the latest availability probe of one source type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCheck {
    pub source_type: String,
    pub error_message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl SourceCheck {
    pub fn status(&self) -> SourceCheckStatus {
        if self.error_message.is_some() {
            SourceCheckStatus::Failed
        } else {
            SourceCheckStatus::Valid
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum SourceCheckStatus {
    Valid,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_exporter_is_not_actualizable() {
        let mut exporter = Exporter::new("MSCI_World", "MSCI World index", "mock", "{}");
        assert!(exporter.is_actualizable());

        exporter.status = ExporterStatus::Disabled {
            error: "connection refused".to_string(),
        };
        assert!(!exporter.is_actualizable());
        assert_eq!(exporter.status.error(), Some("connection refused"));

        exporter.status = ExporterStatus::Active;
        exporter.is_active = false;
        assert!(!exporter.is_actualizable());
    }
}
