use std::result;

use thiserror::Error;

use crate::{interval::error::IntervalError, storage::error::StorageError};

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("UnsupportedVersion error: {0:?}")]
    UnsupportedVersion(String),
    #[error("UnknownExporter error: {0:?}")]
    UnknownExporter(String),
    #[error(
        "IntervalsWithoutValues error: {0:?} would claim coverage without the values behind it"
    )]
    IntervalsWithoutValues(String),
    #[error("[Json] {0}")]
    Json(#[from] serde_json::Error),
    #[error("[Interval] {0}")]
    Interval(#[from] IntervalError),
    #[error("[Storage] {0}")]
    Storage(#[from] StorageError),
}

pub type Result<T> = result::Result<T, SettingsError>;
