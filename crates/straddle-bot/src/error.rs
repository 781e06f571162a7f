//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] straddle_lifecycle::LifecycleError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] straddle_telemetry::TelemetryError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] straddle_persistence::PersistenceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
