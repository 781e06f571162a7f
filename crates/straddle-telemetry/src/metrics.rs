//! Prometheus metrics for the straddle engine.
//!
//! Covers:
//! - Cycle starts and restarts
//! - Legs placed, fills detected and compensating cancels
//! - Stop-loss rebase and trailing raises
//! - Failed ticks by error kind
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A registration failure
//! means duplicate metric names, a startup-time bug. These panics only occur
//! during static initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, register_int_gauge,
    CounterVec, Encoder, GaugeVec, HistogramVec, IntGauge, TextEncoder,
};

use crate::error::{TelemetryError, TelemetryResult};

/// Every cycle state, for the one-hot state gauge.
const CYCLE_STATES: [&str; 7] = [
    "awaiting_entry",
    "entry_placed",
    "entry_filled",
    "exit_placed",
    "monitoring_exit",
    "trailing",
    "restarting",
];

/// Cycles started.
/// Labels: origin (fresh/resumed/restart)
pub static CYCLES_STARTED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "straddle_cycles_started_total",
        "Total straddle cycles started",
        &["origin"]
    )
    .unwrap()
});

/// Cycle restarts.
/// Labels: reason (stop_loss_hit/trailing_completed)
pub static CYCLE_RESTARTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "straddle_cycle_restarts_total",
        "Total cycle restarts",
        &["reason"]
    )
    .unwrap()
});

/// Current cycle id.
pub static CYCLE_ID: Lazy<IntGauge> =
    Lazy::new(|| register_int_gauge!("straddle_cycle_id", "Current cycle id").unwrap());

/// Current cycle state (1=active, 0=inactive).
pub static CYCLE_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "straddle_cycle_state",
        "Cycle state machine current state (1=active, 0=inactive)",
        &["state"]
    )
    .unwrap()
});

/// Conditional orders created.
/// Labels: order_name
pub static LEGS_PLACED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "straddle_legs_placed_total",
        "Total conditional orders created",
        &["order_name"]
    )
    .unwrap()
});

/// Entry fills detected.
/// Labels: order_name
pub static FILLS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "straddle_fills_total",
        "Total entry fills detected",
        &["order_name"]
    )
    .unwrap()
});

/// Compensating cancels issued after a partial placement.
/// Labels: stage (entry/exit)
pub static COMPENSATING_CANCELS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "straddle_compensating_cancels_total",
        "Total compensating cancels after a failed placement",
        &["stage"]
    )
    .unwrap()
});

/// Stop-loss trigger moves.
/// Labels: order_name, kind (breakeven/trail)
pub static STOP_LOSS_MOVES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "straddle_stop_loss_moves_total",
        "Total stop-loss trigger modifications",
        &["order_name", "kind"]
    )
    .unwrap()
});

/// Failed orchestrator ticks.
/// Labels: kind (precondition/creation/quote/rate_limited/...)
pub static TICK_ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "straddle_tick_errors_total",
        "Total failed orchestrator ticks by error kind",
        &["kind"]
    )
    .unwrap()
});

/// Wall time of one orchestrator tick in milliseconds.
/// Labels: state
pub static TICK_DURATION_MS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "straddle_tick_duration_ms",
        "Orchestrator tick duration in milliseconds",
        &["state"],
        vec![1.0, 5.0, 10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0]
    )
    .unwrap()
});

/// Facade over the metric statics.
pub struct Metrics;

impl Metrics {
    /// Record a cycle start.
    pub fn cycle_started(origin: &str, cycle_id: u64) {
        CYCLES_STARTED_TOTAL.with_label_values(&[origin]).inc();
        CYCLE_ID.set(i64::try_from(cycle_id).unwrap_or(i64::MAX));
    }

    pub fn cycle_restarted(reason: &str) {
        CYCLE_RESTARTS_TOTAL.with_label_values(&[reason]).inc();
    }

    /// Set the active cycle state; all others drop to 0.
    pub fn cycle_state_set(state: &str) {
        for s in &CYCLE_STATES {
            CYCLE_STATE.with_label_values(&[s]).set(0.0);
        }
        CYCLE_STATE.with_label_values(&[state]).set(1.0);
    }

    pub fn leg_placed(order_name: &str) {
        LEGS_PLACED_TOTAL.with_label_values(&[order_name]).inc();
    }

    pub fn fill_detected(order_name: &str) {
        FILLS_TOTAL.with_label_values(&[order_name]).inc();
    }

    pub fn compensating_cancel(stage: &str) {
        COMPENSATING_CANCELS_TOTAL.with_label_values(&[stage]).inc();
    }

    /// Stop-loss moved to break-even after the target executed.
    pub fn stop_loss_breakeven(order_name: &str) {
        STOP_LOSS_MOVES_TOTAL
            .with_label_values(&[order_name, "breakeven"])
            .inc();
    }

    /// Stop-loss trailed up a threshold.
    pub fn stop_loss_trailed(order_name: &str) {
        STOP_LOSS_MOVES_TOTAL
            .with_label_values(&[order_name, "trail"])
            .inc();
    }

    pub fn tick_error(kind: &str) {
        TICK_ERRORS_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn tick_duration(state: &str, duration_ms: f64) {
        TICK_DURATION_MS
            .with_label_values(&[state])
            .observe(duration_ms);
    }

    /// Default registry in the Prometheus text exposition format.
    pub fn render() -> TelemetryResult<String> {
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&prometheus::gather(), &mut buf)
            .map_err(|e| TelemetryError::Encode(e.to_string()))?;
        String::from_utf8(buf).map_err(|e| TelemetryError::Encode(e.to_string()))
    }
}
