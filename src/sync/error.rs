use std::result;

use thiserror::Error;
use tokio::{sync::AcquireError, task::JoinError};

use crate::{
    adapter::error::RegistryError, interval::error::IntervalError, storage::error::StorageError,
};

use super::actualize_task::error::ActualizeError;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Busy error: exporter {0:?} has an operation in progress")]
    Busy(String),
    #[error("ExporterNotFound error: {0:?}")]
    ExporterNotFound(String),
    #[error("ExporterDisabled error: {0:?} is excluded until re-enabled")]
    ExporterDisabled(String),
    #[error("DuplicateUniqueCode error: {0:?}")]
    DuplicateUniqueCode(String),
    #[error("[Interval] {0}")]
    Interval(#[from] IntervalError),
    #[error("[Registry] {0}")]
    Registry(#[from] RegistryError),
    #[error("[Actualize] {0}")]
    Actualize(#[from] ActualizeError),
    #[error("[Storage] {0}")]
    Storage(#[from] StorageError),
    #[error("TaskJoin error: {0}")]
    TaskJoin(JoinError),
    #[error("PermitAcquire error: {0}")]
    PermitAcquire(#[from] AcquireError),
}

pub type Result<T> = result::Result<T, SyncError>;
