//! Per-cycle records owned by the orchestrator.

use serde::{Deserialize, Serialize};
use straddle_core::{EntryLegs, ExitLegSet, FirstFill};

use crate::error::{LifecycleError, LifecycleResult};
use crate::monitor::MonitorTracking;
use crate::state::CycleState;
use crate::trailing::TrailingThresholds;

/// Everything one cycle has learned, discarded on restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleRecord {
    pub cycle_id: u64,
    pub state: CycleState,
    pub entry_legs: Option<EntryLegs>,
    pub first_fill: Option<FirstFill>,
    pub exit_legs: Option<ExitLegSet>,
    #[serde(default)]
    pub tracking: MonitorTracking,
    pub trailing: Option<TrailingThresholds>,
}

impl CycleRecord {
    pub fn new(cycle_id: u64) -> Self {
        Self {
            cycle_id,
            state: CycleState::AwaitingEntry,
            entry_legs: None,
            first_fill: None,
            exit_legs: None,
            tracking: MonitorTracking::default(),
            trailing: None,
        }
    }

    pub fn entry_legs(&self) -> LifecycleResult<&EntryLegs> {
        self.entry_legs
            .as_ref()
            .ok_or_else(|| missing(self.state, "entry legs"))
    }

    pub fn first_fill(&self) -> LifecycleResult<&FirstFill> {
        self.first_fill
            .as_ref()
            .ok_or_else(|| missing(self.state, "first fill"))
    }

    /// Check that the records required by `state` are present.
    pub fn validate(&self) -> LifecycleResult<()> {
        match self.state {
            CycleState::AwaitingEntry | CycleState::Restarting => Ok(()),
            CycleState::EntryPlaced => self.entry_legs().map(|_| ()),
            CycleState::EntryFilled => self.first_fill().map(|_| ()),
            CycleState::ExitPlaced | CycleState::MonitoringExit => {
                self.first_fill()?;
                self.exit_legs
                    .as_ref()
                    .map(|_| ())
                    .ok_or_else(|| missing(self.state, "exit legs"))
            }
            CycleState::Trailing => {
                self.first_fill()?;
                self.exit_legs
                    .as_ref()
                    .ok_or_else(|| missing(self.state, "exit legs"))?;
                self.trailing
                    .as_ref()
                    .map(|_| ())
                    .ok_or_else(|| missing(self.state, "trailing thresholds"))
            }
        }
    }
}

fn missing(state: CycleState, what: &str) -> LifecycleError {
    LifecycleError::InconsistentCycle(format!("{what} missing in state {state}"))
}
