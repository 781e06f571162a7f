//! Shared fixtures for unit tests.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use straddle_core::{EntryLegs, EntryPlan, ExitLegSet, ExitParams, FirstFill, LegName, Price};
use straddle_gateway::MockGateway;

use crate::entry::{EntryController, EntryOutcome};
use crate::exit::ExitController;
use crate::policy::Clock;

/// Order-book date of [`now_ist_morning`].
pub const TODAY: &str = "16-Oct-2026";

/// 2026-10-16 10:00 IST.
pub fn now_ist_morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 16, 4, 30, 0).unwrap()
}

pub fn sample_plan() -> EntryPlan {
    EntryPlan {
        ce_symbol: "NIFTY20OCT2625000CE".to_string(),
        ce_token: "40001".to_string(),
        ce_entry_price: Price::new(dec!(98)),
        ce_entry_limit: Price::new(dec!(100)),
        pe_symbol: "NIFTY20OCT2625000PE".to_string(),
        pe_token: "40002".to_string(),
        pe_entry_price: Price::new(dec!(88)),
        pe_entry_limit: Price::new(dec!(90)),
        lot_size: 50,
    }
}

/// Place one lot of both entry legs through the real controller.
pub async fn placed_entry_legs(mock: &Arc<MockGateway>) -> EntryLegs {
    mock.set_ltp("40001", Price::new(dec!(95)));
    mock.set_ltp("40002", Price::new(dec!(85)));
    let ctl = EntryController::new(mock.clone(), "NFO");
    match ctl.place(&sample_plan(), 1).await.unwrap() {
        EntryOutcome::Placed(legs) => legs,
        other => panic!("entry not placed: {other:?}"),
    }
}

pub fn ce_fill(entered: Decimal) -> FirstFill {
    FirstFill {
        order_name: LegName::CeEntry,
        symbol: "NIFTY20OCT2625000CE".to_string(),
        token: "40001".to_string(),
        entered_price: Price::new(entered),
    }
}

/// Place a 2-lot exit set (40/40/40/20) for `fill`.
pub async fn placed_exit_legs(mock: &Arc<MockGateway>, fill: &FirstFill) -> ExitLegSet {
    let ctl = ExitController::new(mock.clone(), ExitParams::default());
    ctl.place(fill, 2, 50).await.unwrap()
}

/// Clock that moves forward by `step` on every read.
pub struct SteppingClock {
    now: Mutex<DateTime<Utc>>,
    step: Duration,
}

impl SteppingClock {
    pub fn new(start: DateTime<Utc>, step: Duration) -> Self {
        Self {
            now: Mutex::new(start),
            step,
        }
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> DateTime<Utc> {
        let mut now = self.now.lock();
        let current = *now;
        *now = current + self.step;
        current
    }
}

/// Wall clock that follows tokio's timer, so paused-time tests see sleeps
/// advance `now`.
pub struct TokioClock {
    start: DateTime<Utc>,
    origin: tokio::time::Instant,
}

impl TokioClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            start,
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        self.start + Duration::from_std(self.origin.elapsed()).unwrap()
    }
}
