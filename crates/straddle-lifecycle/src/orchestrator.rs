//! Cycle orchestrator: the single poll loop that drives a straddle from
//! entry to restart until the daily cutoff.
//!
//! Each tick dispatches the controller for the current [`CycleState`] and
//! advances at most one state. Errors never end the loop:
//! - Rate limit: fixed cooldown, state unchanged
//! - Lookup/quote/order book: tick skipped, retried after the error delay
//! - Pending orders at entry: logged, entry retried next tick
//! - Leftover rules or a rule the broker no longer knows: logged for manual
//!   action, retried after the error delay
//! - Anything else: logged, error delay, loop continues
//!
//! Only the wall-clock cutoff returns from [`Orchestrator::run`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde_json::json;
use straddle_core::{EntryPlan, ExitParams, MarketTime};
use straddle_gateway::{DynGateway, DEFAULT_ORDER_ID_PREFIX};
use straddle_telemetry::Metrics;
use tracing::{debug, error, info, warn};

use crate::cycle::CycleRecord;
use crate::entry::{EntryController, EntryOutcome};
use crate::error::{LifecycleError, LifecycleResult};
use crate::exit::ExitController;
use crate::fill::{FillDetector, FillOutcome};
use crate::journal::{DecisionJournal, JournalEntry, JournalKind, NullJournal};
use crate::monitor::{MonitorOutcome, MonitorTracking, StopLossMonitor};
use crate::policy::{Clock, PollPolicy, SystemClock};
use crate::snapshot::{CycleSnapshot, NullSnapshotStore, SnapshotStore};
use crate::state::{CycleEvent, CycleState, RestartReason};
use crate::trailing::{TrailingController, TrailingOutcome, TrailingParams, TrailingThresholds};

/// Exchange segment for option quotes.
pub const DEFAULT_EXCHANGE: &str = "NFO";

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub exchange: String,
    pub order_id_prefix: String,
    pub market_time: MarketTime,
    pub exit: ExitParams,
    pub trailing: TrailingParams,
    pub poll: PollPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            exchange: DEFAULT_EXCHANGE.to_string(),
            order_id_prefix: DEFAULT_ORDER_ID_PREFIX.to_string(),
            market_time: MarketTime::default(),
            exit: ExitParams::default(),
            trailing: TrailingParams::default(),
            poll: PollPolicy::default(),
        }
    }
}

/// A run in progress: the plan plus the current cycle's records.
#[derive(Debug, Clone)]
pub struct Session {
    pub plan: EntryPlan,
    /// Lots per entry leg.
    pub quantity: u32,
    pub trading_day: NaiveDate,
    pub cycle: CycleRecord,
    /// Cycles that reached `Restarting` during this session.
    pub cycles_completed: u64,
    last_error: Option<String>,
}

impl Session {
    pub fn state(&self) -> CycleState {
        self.cycle.state
    }

    pub fn snapshot(&self, saved_at: DateTime<Utc>) -> CycleSnapshot {
        CycleSnapshot {
            trading_day: self.trading_day,
            plan: self.plan.clone(),
            quantity: self.quantity,
            cycle: self.cycle.clone(),
            saved_at,
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub cycles_completed: u64,
    pub last_cycle_id: u64,
    pub final_state: CycleState,
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    entry: EntryController,
    fill: FillDetector,
    exit: ExitController,
    monitor: StopLossMonitor,
    trailing: TrailingController,
    clock: Arc<dyn Clock>,
    snapshots: Arc<dyn SnapshotStore>,
    journal: Arc<dyn DecisionJournal>,
}

impl Orchestrator {
    pub fn new(gateway: DynGateway, config: OrchestratorConfig) -> Self {
        Self {
            entry: EntryController::new(gateway.clone(), config.exchange.clone()),
            fill: FillDetector::new(gateway.clone(), config.order_id_prefix.clone(), config.market_time),
            exit: ExitController::new(gateway.clone(), config.exit),
            monitor: StopLossMonitor::new(gateway.clone()),
            trailing: TrailingController::new(gateway, config.exchange.clone()),
            config,
            clock: Arc::new(SystemClock),
            snapshots: Arc::new(NullSnapshotStore),
            journal: Arc::new(NullJournal),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_snapshot_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.snapshots = store;
        self
    }

    pub fn with_journal(mut self, journal: Arc<dyn DecisionJournal>) -> Self {
        self.journal = journal;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    // ========================================================================
    // Entry points
    // ========================================================================

    /// Run fresh cycles of `plan` until `cutoff` (market-local `HH:MM`).
    pub async fn run(&self, plan: EntryPlan, quantity: u32, cutoff: NaiveTime) -> LifecycleResult<RunSummary> {
        let mut session = self.start(plan, quantity)?;
        self.run_session(&mut session, cutoff).await
    }

    /// Continue a saved cycle until `cutoff`.
    pub async fn resume(&self, snapshot: CycleSnapshot, cutoff: NaiveTime) -> LifecycleResult<RunSummary> {
        let mut session = self.resume_session(snapshot)?;
        self.run_session(&mut session, cutoff).await
    }

    /// New session starting at cycle 1 in `AwaitingEntry`.
    pub fn start(&self, plan: EntryPlan, quantity: u32) -> LifecycleResult<Session> {
        plan.validate()?;
        if quantity == 0 {
            return Err(straddle_core::CoreError::InvalidQuantity("quantity must be at least one lot".into()).into());
        }
        let now = self.clock.now();
        let session = Session {
            plan,
            quantity,
            trading_day: self.config.market_time.trading_day(now),
            cycle: CycleRecord::new(1),
            cycles_completed: 0,
            last_error: None,
        };
        Metrics::cycle_started("fresh", session.cycle.cycle_id);
        Metrics::cycle_state_set(session.state().as_str());
        info!(cycle_id = session.cycle.cycle_id, quantity, "Session started");
        self.journal.record(
            JournalEntry::new(now, session.cycle.cycle_id, session.state(), JournalKind::Transition, "session started")
                .with_detail(json!({ "origin": "fresh", "quantity": quantity })),
        );
        Ok(session)
    }

    /// Session rebuilt from a snapshot.
    pub fn resume_session(&self, snapshot: CycleSnapshot) -> LifecycleResult<Session> {
        snapshot.plan.validate()?;
        snapshot.cycle.validate()?;
        let now = self.clock.now();
        let session = Session {
            plan: snapshot.plan,
            quantity: snapshot.quantity,
            trading_day: snapshot.trading_day,
            cycle: snapshot.cycle,
            cycles_completed: 0,
            last_error: None,
        };
        Metrics::cycle_started("resumed", session.cycle.cycle_id);
        Metrics::cycle_state_set(session.state().as_str());
        info!(
            cycle_id = session.cycle.cycle_id,
            state = %session.state(),
            saved_at = %snapshot.saved_at,
            "Session resumed from snapshot"
        );
        self.journal.record(
            JournalEntry::new(now, session.cycle.cycle_id, session.state(), JournalKind::Transition, "session resumed")
                .with_detail(json!({ "origin": "resumed", "saved_at": snapshot.saved_at })),
        );
        Ok(session)
    }

    /// Poll `session` until the cutoff passes.
    pub async fn run_session(&self, session: &mut Session, cutoff: NaiveTime) -> LifecycleResult<RunSummary> {
        let cutoff_at = self.config.market_time.cutoff_on_day_of(self.clock.now(), cutoff)?;
        info!(%cutoff_at, cycle_id = session.cycle.cycle_id, state = %session.state(), "Poll loop started");

        let mut ticks = 0u64;
        loop {
            if self.clock.now() >= cutoff_at {
                info!(%cutoff_at, state = %session.state(), "Cutoff reached, stopping poll loop");
                break;
            }
            ticks += 1;

            let delay = match self.tick(session).await {
                Ok(_) => self.config.poll.interval(),
                Err(e) => self.recovery_delay(session.state(), &e),
            };
            tokio::time::sleep(delay).await;
        }

        Ok(RunSummary {
            ticks,
            cycles_completed: session.cycles_completed,
            last_cycle_id: session.cycle.cycle_id,
            final_state: session.state(),
        })
    }

    // ========================================================================
    // Tick
    // ========================================================================

    /// Run the controller for the current state once.
    ///
    /// Returns the new state if the cycle advanced.
    pub async fn tick(&self, session: &mut Session) -> LifecycleResult<Option<CycleState>> {
        let state = session.state();
        let now = self.clock.now();
        let started = Instant::now();
        let result = self.step(session, now).await;
        Metrics::tick_duration(state.as_str(), started.elapsed().as_secs_f64() * 1_000.0);

        let event = match result {
            Ok(Some(event)) => event,
            Ok(None) => return Ok(None),
            Err(e) => {
                self.record_error(session, &e, now);
                return Err(e);
            }
        };

        let next = state.transition(event).ok_or_else(|| {
            LifecycleError::InconsistentCycle(format!("no transition from {state} on {event:?}"))
        })?;
        session.cycle.state = next;
        session.last_error = None;

        info!(cycle_id = session.cycle.cycle_id, from = %state, to = %next, ?event, "Cycle transition");
        Metrics::cycle_state_set(next.as_str());
        let mut detail = json!({ "from": state, "to": next, "event": event });
        if let Some(reason) = restart_reason(event) {
            Metrics::cycle_restarted(reason.as_str());
            detail["reason"] = json!(reason);
        }
        self.journal.record(
            JournalEntry::new(now, session.cycle.cycle_id, next, JournalKind::Transition, "transition")
                .with_detail(detail),
        );
        self.save(session, now);
        Ok(Some(next))
    }

    async fn step(&self, session: &mut Session, now: DateTime<Utc>) -> LifecycleResult<Option<CycleEvent>> {
        let cycle = &mut session.cycle;

        match cycle.state {
            CycleState::AwaitingEntry => match self.entry.place(&session.plan, session.quantity).await? {
                EntryOutcome::Placed(legs) => {
                    cycle.entry_legs = Some(legs);
                    Ok(Some(CycleEvent::EntryPlaced))
                }
                EntryOutcome::Deferred(reason) => {
                    debug!(?reason, "Entry deferred");
                    Ok(None)
                }
            },

            CycleState::EntryPlaced => {
                let legs = cycle.entry_legs()?.clone();
                match self.fill.detect(&legs, now).await? {
                    FillOutcome::Filled { fill, sibling_cancelled } => {
                        self.journal.record(
                            JournalEntry::new(now, cycle.cycle_id, cycle.state, JournalKind::Decision, "entry filled")
                                .with_detail(json!({ "fill": fill, "sibling_cancelled": sibling_cancelled })),
                        );
                        cycle.first_fill = Some(fill);
                        Ok(Some(CycleEvent::EntryFilled))
                    }
                    FillOutcome::Pending => Ok(None),
                }
            }

            CycleState::EntryFilled => {
                let fill = cycle.first_fill()?.clone();
                let legs = self
                    .exit
                    .place(&fill, session.quantity, session.plan.lot_size)
                    .await?;
                cycle.exit_legs = Some(legs);
                Ok(Some(CycleEvent::ExitPlaced))
            }

            CycleState::ExitPlaced => {
                cycle.tracking = MonitorTracking::default();
                Ok(Some(CycleEvent::MonitorArmed))
            }

            CycleState::MonitoringExit => {
                let fill = cycle.first_fill()?.clone();
                let legs = cycle
                    .exit_legs
                    .as_mut()
                    .ok_or_else(|| LifecycleError::InconsistentCycle("exit legs missing".into()))?;
                match self.monitor.poll(&fill, legs, &mut cycle.tracking).await? {
                    MonitorOutcome::Pending => Ok(None),
                    MonitorOutcome::Progressed => {
                        cycle.trailing = Some(TrailingThresholds::new(&self.config.trailing, fill.entered_price));
                        Ok(Some(CycleEvent::TargetExecuted))
                    }
                    MonitorOutcome::Aborted => Ok(Some(CycleEvent::StopLossHit)),
                }
            }

            CycleState::Trailing => {
                let fill = cycle.first_fill()?.clone();
                let (Some(legs), Some(th)) = (cycle.exit_legs.as_mut(), cycle.trailing.as_mut()) else {
                    return Err(LifecycleError::InconsistentCycle("trailing records missing".into()));
                };
                match self.trailing.poll(&fill, legs, th).await? {
                    TrailingOutcome::Pending => Ok(None),
                    TrailingOutcome::Completed => Ok(Some(CycleEvent::TrailingCompleted)),
                    TrailingOutcome::Raised(raises) => {
                        let detail: Vec<_> = raises
                            .iter()
                            .map(|r| json!({ "order_name": r.order_name, "from": r.from, "to": r.to, "limit": r.limit }))
                            .collect();
                        self.journal.record(
                            JournalEntry::new(now, cycle.cycle_id, cycle.state, JournalKind::Decision, "stop-loss trailed")
                                .with_detail(json!({ "raises": detail, "step1": th.step1, "step2": th.step2 })),
                        );
                        self.save(session, now);
                        Ok(None)
                    }
                }
            }

            CycleState::Restarting => {
                let next_id = cycle.cycle_id + 1;
                info!(finished = cycle.cycle_id, next = next_id, "Discarding cycle records");
                session.cycle = CycleRecord::new(next_id);
                session.cycles_completed += 1;
                Metrics::cycle_started("restart", next_id);
                Ok(Some(CycleEvent::Restarted))
            }
        }
    }

    /// Log a failed tick and pick the wait before the next one.
    fn recovery_delay(&self, state: CycleState, e: &LifecycleError) -> Duration {
        let poll = &self.config.poll;
        if e.is_rate_limited() {
            warn!(error = %e, cooldown_ms = poll.rate_limit_cooldown_ms, "Rate limited, cooling down");
            return poll.rate_limit_cooldown();
        }
        if e.is_skippable() {
            warn!(error = %e, %state, retry_ms = poll.error_delay_ms, "Lookup failed, skipping tick");
            return poll.error_delay();
        }
        if e.needs_manual_action() {
            error!(error = %e, %state, "Manual action required; retrying until resolved");
            return poll.error_delay();
        }
        match e {
            LifecycleError::Precondition { .. } => {
                warn!(error = %e, "Entry blocked by pending orders");
                poll.interval()
            }
            _ => {
                error!(error = %e, %state, "Tick failed");
                poll.error_delay()
            }
        }
    }

    fn record_error(&self, session: &mut Session, e: &LifecycleError, now: DateTime<Utc>) {
        Metrics::tick_error(e.kind());
        let message = e.to_string();
        if session.last_error.as_deref() == Some(message.as_str()) {
            return;
        }
        self.journal.record(
            JournalEntry::new(now, session.cycle.cycle_id, session.state(), JournalKind::Error, message.clone())
                .with_detail(json!({ "kind": e.kind() })),
        );
        session.last_error = Some(message);
    }

    fn save(&self, session: &Session, now: DateTime<Utc>) {
        if let Err(e) = self.snapshots.save(&session.snapshot(now)) {
            warn!(error = %e, cycle_id = session.cycle.cycle_id, "Snapshot save failed");
            self.journal.record(JournalEntry::new(
                now,
                session.cycle.cycle_id,
                session.state(),
                JournalKind::Error,
                format!("snapshot save failed: {e}"),
            ));
        }
    }
}

fn restart_reason(event: CycleEvent) -> Option<RestartReason> {
    match event {
        CycleEvent::StopLossHit => Some(RestartReason::StopLossHit),
        CycleEvent::TrailingCompleted => Some(RestartReason::TrailingCompleted),
        _ => None,
    }
}
