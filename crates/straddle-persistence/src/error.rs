//! Persistence error types.

use straddle_lifecycle::LifecycleError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Snapshot file for {expected} holds trading day {found}")]
    DayMismatch { expected: String, found: String },
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

impl From<PersistenceError> for LifecycleError {
    fn from(e: PersistenceError) -> Self {
        LifecycleError::Persistence(e.to_string())
    }
}
