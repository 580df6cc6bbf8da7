//! Error types shared by the storage, sync and analytics layers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PosError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("{0}")]
    Remote(String),

    #[error("Cloud backend not configured: {0}")]
    NotConfigured(&'static str),

    #[error("Network unavailable")]
    Offline,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    Invalid(String),

    #[error("State lock poisoned")]
    LockPoisoned,
}

impl<T> From<std::sync::PoisonError<T>> for PosError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        PosError::LockPoisoned
    }
}

pub type PosResult<T> = Result<T, PosError>;
