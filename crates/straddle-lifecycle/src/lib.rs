//! Order lifecycle state machine for a two-leg options straddle.
//!
//! One cycle: place CE/PE entry rules, detect the first fill, place a
//! target plus three stop-loss slices, watch which executes first, trail the
//! surviving stop-losses, restart.
//!
//! # Key Components
//!
//! - [`Orchestrator`]: Poll loop, state dispatch, restart and cutoff
//! - [`EntryController`]: Both entry legs or neither (compensating cancel)
//! - [`FillDetector`]: First filled leg in today's order book wins
//! - [`ExitController`]: All-or-nothing four-leg exit set
//! - [`StopLossMonitor`]: Target vs SL-1 race
//! - [`TrailingController`]: Two-ladder stop-loss trailing
//! - [`CycleState`]: Explicit transition table
//! - [`SnapshotStore`] / [`DecisionJournal`]: Crash recovery and audit trail

pub mod cycle;
pub mod entry;
pub mod error;
pub mod exit;
pub mod fill;
pub mod journal;
pub mod monitor;
pub mod orchestrator;
pub mod policy;
pub mod snapshot;
pub mod state;
pub mod trailing;

#[cfg(test)]
pub(crate) mod test_support;

pub use cycle::CycleRecord;
pub use entry::{DeferReason, EntryController, EntryOutcome};
pub use error::{LifecycleError, LifecycleResult};
pub use exit::ExitController;
pub use fill::{FillDetector, FillOutcome};
pub use journal::{DecisionJournal, JournalEntry, JournalKind, MemoryJournal, NullJournal};
pub use monitor::{MonitorOutcome, MonitorTracking, StopLossMonitor};
pub use orchestrator::{Orchestrator, OrchestratorConfig, RunSummary, Session, DEFAULT_EXCHANGE};
pub use policy::{Clock, PollPolicy, SystemClock};
pub use snapshot::{CycleSnapshot, MemorySnapshotStore, NullSnapshotStore, SnapshotStore};
pub use state::{CycleEvent, CycleState, RestartReason};
pub use trailing::{
    decide, TrailDecision, TrailRaise, TrailingController, TrailingOutcome, TrailingParams,
    TrailingThresholds,
};
