use std::result;

use thiserror::Error;

use crate::{adapter::error::FetchError, storage::error::StorageError};

use super::super::merge::error::MergeError;

#[derive(Error, Debug)]
pub enum ActualizeError {
    #[error("SourceMaxTrialsReached error: {error} after {trials} trials")]
    SourceMaxTrialsReached { error: FetchError, trials: u32 },
    #[error("SourcePermanentFailure error: {0}")]
    SourcePermanentFailure(FetchError),
    #[error("[Merge] {0}")]
    Merge(#[from] MergeError),
    #[error("[Storage] {0}")]
    Storage(#[from] StorageError),
    #[error("Actualization cancelled")]
    Cancelled,
}

impl ActualizeError {
    /// True for failures that disable the exporter rather than propagate.
    pub fn disables_exporter(&self) -> bool {
        matches!(
            self,
            Self::SourceMaxTrialsReached { .. } | Self::SourcePermanentFailure(_)
        )
    }
}

pub type Result<T> = result::Result<T, ActualizeError>;
