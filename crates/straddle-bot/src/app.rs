//! Main application wiring.
//!
//! Builds the gateway stack (paper broker behind retries), the snapshot
//! store and journal, and hands them to the orchestrator. On start-up a
//! snapshot for the current trading day is resumed instead of opening a
//! second straddle.

use crate::config::AppConfig;
use crate::error::AppResult;
use chrono::{NaiveTime, Utc};
use std::sync::Arc;
use straddle_core::MarketTime;
use straddle_gateway::{DynGateway, PaperGateway, RetryingGateway};
use straddle_lifecycle::{Orchestrator, RunSummary, SnapshotStore};
use straddle_persistence::{JournalWriter, JsonSnapshotStore};
use straddle_telemetry::Metrics;
use tracing::{info, warn};

/// Main application.
pub struct Application {
    config: AppConfig,
    market_time: MarketTime,
    cutoff: NaiveTime,
    snapshots: Arc<JsonSnapshotStore>,
    orchestrator: Orchestrator,
}

impl Application {
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;
        let market_time = config.market_time()?;
        let cutoff = config.cutoff_time()?;

        let paper = PaperGateway::new(config.paper.clone(), market_time);
        let plan = &config.entry_plan;
        paper.seed_price(&plan.ce_token, plan.ce_entry_price);
        paper.seed_price(&plan.pe_token, plan.pe_entry_price);
        let gateway: DynGateway = Arc::new(RetryingGateway::new(paper, config.retry));

        let snapshots = Arc::new(JsonSnapshotStore::new(config.persistence.snapshot_dir())?);
        let journal = Arc::new(JournalWriter::new(
            config.persistence.journal_dir(),
            market_time,
            config.persistence.journal_buffer_size,
        )?);

        let orchestrator = Orchestrator::new(gateway, config.orchestrator_config()?)
            .with_snapshot_store(snapshots.clone())
            .with_journal(journal);

        info!(
            data_dir = %config.persistence.data_dir,
            exchange = %config.exchange,
            seed = config.paper.seed,
            "Application initialized (paper broker)"
        );

        Ok(Self {
            config,
            market_time,
            cutoff,
            snapshots,
            orchestrator,
        })
    }

    /// Resume today's snapshot if one exists, otherwise start fresh; run
    /// until the cutoff.
    pub async fn run(&self) -> AppResult<RunSummary> {
        let today = self.market_time.trading_day(Utc::now());

        let summary = match self.snapshots.load(today)? {
            Some(snapshot) => {
                if snapshot.plan != self.config.entry_plan {
                    warn!(
                        day = %today,
                        "Configured entry plan differs from today's snapshot; resuming with the snapshot's plan"
                    );
                }
                info!(
                    day = %today,
                    cycle_id = snapshot.cycle.cycle_id,
                    state = %snapshot.cycle.state,
                    "Resuming from snapshot"
                );
                self.orchestrator.resume(snapshot, self.cutoff).await?
            }
            None => {
                info!(day = %today, "No snapshot for today, starting fresh");
                self.orchestrator
                    .run(self.config.entry_plan.clone(), self.config.quantity, self.cutoff)
                    .await?
            }
        };

        self.write_metrics()?;
        Ok(summary)
    }

    fn write_metrics(&self) -> AppResult<()> {
        let Some(path) = &self.config.telemetry.metrics_file else {
            return Ok(());
        };
        std::fs::write(path, Metrics::render()?)?;
        info!(path = %path, "Metrics written");
        Ok(())
    }
}
