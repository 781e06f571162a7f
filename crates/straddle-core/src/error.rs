//! Error types for straddle-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Invalid entry plan: {0}")]
    InvalidPlan(String),

    #[error("Invalid exit leg set: {0}")]
    InvalidLegSet(String),

    #[error("Invalid time: {0}")]
    InvalidTime(String),

    #[error("Decimal parse error: {0}")]
    DecimalParse(#[from] rust_decimal::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
