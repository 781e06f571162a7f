//! Prometheus metrics and structured logging for the straddle engine.
//!
//! - Structured logging with tracing (JSON in production, pretty otherwise)
//! - Prometheus counters for cycles, legs, compensations and trailing raises
//! - One-hot gauge of the current cycle state

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
