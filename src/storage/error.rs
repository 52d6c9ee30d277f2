use std::result;

use thiserror::Error;

use crate::interval::error::IntervalError;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Connection error: {0}")]
    Connection(sqlx::Error),
    #[error("Migration error: {0}")]
    Migration(sqlx::migrate::MigrateError),
    #[error("Query error: {0}")]
    Query(sqlx::Error),
    #[error("Transaction begin error: {0}")]
    TransactionBegin(sqlx::Error),
    #[error("Transaction commit error: {0}")]
    TransactionCommit(sqlx::Error),
    #[error("Corrupted interval data: {0}")]
    CorruptedIntervals(#[from] IntervalError),
    #[error("Storage generic error: {0}")]
    Generic(String),
}

pub type Result<T> = result::Result<T, StorageError>;
