use std::result;

use thiserror::Error;

/// Failure reported by a source adapter.
///
/// Transient failures (network hiccups, timeouts, throttling) are retried by
/// the download coordinator; permanent failures disable the exporter without
/// further retries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Transient fetch error: {0}")]
    Transient(String),
    #[error("Permanent fetch error: {0}")]
    Permanent(String),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("UnknownSourceType error: no adapter registered for {0:?}")]
    UnknownSourceType(String),
    #[error("DuplicateSourceType error: adapter already registered for {0:?}")]
    DuplicateSourceType(String),
}

pub type Result<T, E = FetchError> = result::Result<T, E>;
