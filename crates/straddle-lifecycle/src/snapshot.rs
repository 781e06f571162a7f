//! Crash-recovery snapshots.
//!
//! The orchestrator saves a [`CycleSnapshot`] after every state transition.
//! On start-up the snapshot for the current trading day, if any, is handed
//! to [`Orchestrator::resume`](crate::Orchestrator::resume) so the cycle
//! continues where it stopped instead of placing a second straddle.

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use straddle_core::EntryPlan;

use crate::cycle::CycleRecord;
use crate::error::LifecycleResult;

/// Everything needed to resume a run mid-cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleSnapshot {
    /// Market-local day the snapshot belongs to.
    pub trading_day: NaiveDate,
    pub plan: EntryPlan,
    /// Lots per entry leg.
    pub quantity: u32,
    pub cycle: CycleRecord,
    pub saved_at: DateTime<Utc>,
}

/// Storage for the latest snapshot of each trading day.
pub trait SnapshotStore: Send + Sync {
    /// Replace the stored snapshot for `snapshot.trading_day`.
    fn save(&self, snapshot: &CycleSnapshot) -> LifecycleResult<()>;

    /// Latest snapshot for `day`, if one was saved.
    fn load(&self, day: NaiveDate) -> LifecycleResult<Option<CycleSnapshot>>;
}

/// Store that keeps nothing.
#[derive(Debug, Default)]
pub struct NullSnapshotStore;

impl SnapshotStore for NullSnapshotStore {
    fn save(&self, _snapshot: &CycleSnapshot) -> LifecycleResult<()> {
        Ok(())
    }

    fn load(&self, _day: NaiveDate) -> LifecycleResult<Option<CycleSnapshot>> {
        Ok(None)
    }
}

/// In-memory store for tests.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    latest: Mutex<Option<CycleSnapshot>>,
    saves: Mutex<usize>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<CycleSnapshot> {
        self.latest.lock().clone()
    }

    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn save(&self, snapshot: &CycleSnapshot) -> LifecycleResult<()> {
        *self.latest.lock() = Some(snapshot.clone());
        *self.saves.lock() += 1;
        Ok(())
    }

    fn load(&self, day: NaiveDate) -> LifecycleResult<Option<CycleSnapshot>> {
        Ok(self.latest.lock().clone().filter(|s| s.trading_day == day))
    }
}
