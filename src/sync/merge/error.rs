use std::result;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{interval::Interval, storage::error::StorageError};

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("PointOutOfRange error: point at {moment} outside claimed range {range}")]
    PointOutOfRange {
        moment: DateTime<Utc>,
        range: Interval,
    },
    #[error("[Storage] {0}")]
    Storage(#[from] StorageError),
}

pub type Result<T> = result::Result<T, MergeError>;
