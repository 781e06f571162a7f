//! Straddle order lifecycle runner.
//!
//! Wires the lifecycle orchestrator to its collaborators:
//! - TOML configuration (entry plan, pricing, trailing, polling)
//! - Paper broker behind the retrying gateway
//! - JSON snapshots for same-day crash recovery
//! - JSON Lines decision journal and Prometheus metrics

pub mod app;
pub mod config;
pub mod error;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
