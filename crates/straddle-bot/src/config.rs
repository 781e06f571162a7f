//! Application configuration.

use crate::error::{AppError, AppResult};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use straddle_core::{parse_hhmm, EntryPlan, ExitParams, MarketTime, IST_OFFSET_MINUTES};
use straddle_gateway::{PaperConfig, RetryPolicy, DEFAULT_ORDER_ID_PREFIX};
use straddle_lifecycle::{OrchestratorConfig, PollPolicy, TrailingParams, DEFAULT_EXCHANGE};

/// Top-level configuration, loaded from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Lots per entry leg.
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    /// Market-local `HH:MM` after which the poll loop stops.
    #[serde(default = "default_cutoff")]
    pub cutoff: String,
    /// Exchange wall clock offset from UTC. Default: 330 (IST).
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,
    #[serde(default = "default_exchange")]
    pub exchange: String,
    /// Prefix the broker puts in front of a rule id in the order book.
    #[serde(default = "default_order_id_prefix")]
    pub order_id_prefix: String,
    /// Contracts and entry bands, resolved upstream.
    pub entry_plan: EntryPlan,
    #[serde(default)]
    pub poll: PollPolicy,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub exit: ExitParams,
    #[serde(default)]
    pub trailing: TrailingParams,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub paper: PaperConfig,
}

fn default_quantity() -> u32 {
    1
}

fn default_cutoff() -> String {
    "15:20".to_string()
}

fn default_utc_offset_minutes() -> i32 {
    IST_OFFSET_MINUTES
}

fn default_exchange() -> String {
    DEFAULT_EXCHANGE.to_string()
}

fn default_order_id_prefix() -> String {
    DEFAULT_ORDER_ID_PREFIX.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Root for `snapshots/` and `journal/`.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Decision entries buffered before a write. Transitions and errors
    /// are always written at once.
    #[serde(default = "default_journal_buffer_size")]
    pub journal_buffer_size: usize,
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_journal_buffer_size() -> usize {
    16
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            journal_buffer_size: default_journal_buffer_size(),
        }
    }
}

impl PersistenceConfig {
    pub fn snapshot_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("snapshots")
    }

    pub fn journal_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("journal")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Write the Prometheus text exposition here when the run ends.
    #[serde(default)]
    pub metrics_file: Option<String>,
}

impl AppConfig {
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the orchestrator would only trip over at run time.
    pub fn validate(&self) -> AppResult<()> {
        if self.quantity == 0 {
            return Err(AppError::Config("quantity must be at least one lot".into()));
        }
        if self.exchange.trim().is_empty() {
            return Err(AppError::Config("exchange must not be empty".into()));
        }
        if self.trailing.step1 > self.trailing.step2 {
            return Err(AppError::Config(format!(
                "trailing.step1 ({}) must not exceed trailing.step2 ({})",
                self.trailing.step1, self.trailing.step2
            )));
        }
        self.entry_plan
            .validate()
            .map_err(|e| AppError::Config(format!("entry_plan: {e}")))?;
        self.cutoff_time()?;
        self.market_time()?;
        Ok(())
    }

    pub fn cutoff_time(&self) -> AppResult<NaiveTime> {
        parse_hhmm(&self.cutoff).map_err(|e| AppError::Config(format!("cutoff: {e}")))
    }

    pub fn market_time(&self) -> AppResult<MarketTime> {
        MarketTime::new(self.utc_offset_minutes).map_err(|e| AppError::Config(format!("utc_offset_minutes: {e}")))
    }

    pub fn orchestrator_config(&self) -> AppResult<OrchestratorConfig> {
        Ok(OrchestratorConfig {
            exchange: self.exchange.clone(),
            order_id_prefix: self.order_id_prefix.clone(),
            market_time: self.market_time()?,
            exit: self.exit,
            trailing: self.trailing,
            poll: self.poll,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use straddle_core::Price;

    const MINIMAL: &str = r#"
[entry_plan]
ce_symbol = "NIFTY20OCT2625000CE"
ce_token = "40001"
ce_entry_price = "98"
ce_entry_limit = "100"
pe_symbol = "NIFTY20OCT2625000PE"
pe_token = "40002"
pe_entry_price = "88"
pe_entry_limit = "90"
lot_size = 50
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = AppConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(config.quantity, 1);
        assert_eq!(config.cutoff, "15:20");
        assert_eq!(config.utc_offset_minutes, 330);
        assert_eq!(config.exchange, "NFO");
        assert_eq!(config.order_id_prefix, "GTTV3_prod_");
        assert_eq!(config.poll.interval_ms, 500);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.trailing.step1, dec!(1.15));
        assert_eq!(config.exit.target_trigger_mult, dec!(1.05));
        assert_eq!(config.entry_plan.ce_entry_limit, Price::new(dec!(100)));
        assert!(config.telemetry.metrics_file.is_none());
        assert_eq!(config.persistence.snapshot_dir(), PathBuf::from("./data").join("snapshots"));
    }

    #[test]
    fn test_overrides() {
        let toml = format!(
            r#"
quantity = 3
cutoff = "14:45"

[poll]
interval_ms = 250

[trailing]
step1 = "1.2"
step2 = "1.2"

{MINIMAL}
"#
        );
        let config = AppConfig::from_toml(&toml).unwrap();
        assert_eq!(config.quantity, 3);
        assert_eq!(config.cutoff_time().unwrap(), NaiveTime::from_hms_opt(14, 45, 0).unwrap());
        assert_eq!(config.poll.interval_ms, 250);
        assert_eq!(config.poll.error_delay_ms, 2_000);
        assert_eq!(config.trailing.step1, config.trailing.step2);
        assert_eq!(config.trailing.step2_increment, dec!(0.20));

        let orch = config.orchestrator_config().unwrap();
        assert_eq!(orch.poll.interval_ms, 250);
        assert_eq!(orch.exchange, "NFO");
    }

    #[test]
    fn test_rejects_bad_values() {
        let bad_cutoff = format!("cutoff = \"25:00\"\n{MINIMAL}");
        assert!(matches!(AppConfig::from_toml(&bad_cutoff), Err(AppError::Config(_))));

        let zero_lots = format!("quantity = 0\n{MINIMAL}");
        assert!(AppConfig::from_toml(&zero_lots).is_err());

        let inverted = format!("[trailing]\nstep1 = \"1.5\"\nstep2 = \"1.2\"\n{MINIMAL}");
        assert!(AppConfig::from_toml(&inverted).is_err());

        let huge_offset = format!("utc_offset_minutes = 2147483647\n{MINIMAL}");
        assert!(matches!(AppConfig::from_toml(&huge_offset), Err(AppError::Config(_))));

        let no_plan = "quantity = 1\n";
        assert!(AppConfig::from_toml(no_plan).is_err());

        let bad_lot = MINIMAL.replace("lot_size = 50", "lot_size = 0");
        assert!(AppConfig::from_toml(&bad_lot).is_err());
    }
}
