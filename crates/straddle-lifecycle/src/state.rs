//! Cycle state machine.
//!
//! Every state change goes through [`CycleState::transition`]; a pair not in
//! the table yields `None` and the caller keeps its current state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the current cycle stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    /// No legs at the broker; waiting for prices inside the entry band.
    AwaitingEntry,
    /// CE and PE BUY rules resting; waiting for one to fill.
    EntryPlaced,
    /// One entry filled and its sibling cancelled.
    EntryFilled,
    /// Target and three stop-loss rules created.
    ExitPlaced,
    /// Watching target vs SL-1.
    MonitoringExit,
    /// Target executed; trailing SL-2/SL-3.
    Trailing,
    /// Cycle over; records are discarded on the next tick.
    Restarting,
}

/// Input that moves the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleEvent {
    EntryPlaced,
    EntryFilled,
    ExitPlaced,
    MonitorArmed,
    TargetExecuted,
    StopLossHit,
    TrailingCompleted,
    Restarted,
}

/// Why a cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartReason {
    /// SL-1 executed before the target.
    StopLossHit,
    /// Both trailed stop-losses left the book.
    TrailingCompleted,
}

impl RestartReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StopLossHit => "stop_loss_hit",
            Self::TrailingCompleted => "trailing_completed",
        }
    }
}

impl CycleState {
    /// Next state for `event`, or `None` if the event is not valid here.
    pub fn transition(self, event: CycleEvent) -> Option<Self> {
        use CycleEvent as E;
        use CycleState as S;
        match (self, event) {
            (S::AwaitingEntry, E::EntryPlaced) => Some(S::EntryPlaced),
            (S::EntryPlaced, E::EntryFilled) => Some(S::EntryFilled),
            (S::EntryFilled, E::ExitPlaced) => Some(S::ExitPlaced),
            (S::ExitPlaced, E::MonitorArmed) => Some(S::MonitoringExit),
            (S::MonitoringExit, E::TargetExecuted) => Some(S::Trailing),
            (S::MonitoringExit, E::StopLossHit) => Some(S::Restarting),
            (S::Trailing, E::TrailingCompleted) => Some(S::Restarting),
            (S::Restarting, E::Restarted) => Some(S::AwaitingEntry),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AwaitingEntry => "awaiting_entry",
            Self::EntryPlaced => "entry_placed",
            Self::EntryFilled => "entry_filled",
            Self::ExitPlaced => "exit_placed",
            Self::MonitoringExit => "monitoring_exit",
            Self::Trailing => "trailing",
            Self::Restarting => "restarting",
        }
    }
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [CycleState; 7] = [
        CycleState::AwaitingEntry,
        CycleState::EntryPlaced,
        CycleState::EntryFilled,
        CycleState::ExitPlaced,
        CycleState::MonitoringExit,
        CycleState::Trailing,
        CycleState::Restarting,
    ];

    const ALL_EVENTS: [CycleEvent; 8] = [
        CycleEvent::EntryPlaced,
        CycleEvent::EntryFilled,
        CycleEvent::ExitPlaced,
        CycleEvent::MonitorArmed,
        CycleEvent::TargetExecuted,
        CycleEvent::StopLossHit,
        CycleEvent::TrailingCompleted,
        CycleEvent::Restarted,
    ];

    fn rank(s: CycleState) -> usize {
        ALL_STATES.iter().position(|x| *x == s).unwrap()
    }

    #[test]
    fn test_happy_path() {
        let mut s = CycleState::AwaitingEntry;
        for e in [
            CycleEvent::EntryPlaced,
            CycleEvent::EntryFilled,
            CycleEvent::ExitPlaced,
            CycleEvent::MonitorArmed,
            CycleEvent::TargetExecuted,
            CycleEvent::TrailingCompleted,
            CycleEvent::Restarted,
        ] {
            s = s.transition(e).unwrap();
        }
        assert_eq!(s, CycleState::AwaitingEntry);
    }

    #[test]
    fn test_stop_loss_hit_skips_trailing() {
        assert_eq!(
            CycleState::MonitoringExit.transition(CycleEvent::StopLossHit),
            Some(CycleState::Restarting)
        );
        assert_eq!(CycleState::Trailing.transition(CycleEvent::StopLossHit), None);
    }

    #[test]
    fn test_transitions_only_move_forward() {
        // Forward by one rank, or from MonitoringExit straight to Restarting,
        // or the single wrap-around Restarting -> AwaitingEntry.
        for s in ALL_STATES {
            for e in ALL_EVENTS {
                if let Some(next) = s.transition(e) {
                    let ok = rank(next) == rank(s) + 1
                        || (s == CycleState::MonitoringExit && next == CycleState::Restarting)
                        || (s == CycleState::Restarting && next == CycleState::AwaitingEntry);
                    assert!(ok, "{s} --{e:?}--> {next}");
                }
            }
        }
    }

    #[test]
    fn test_each_state_has_single_exit_event_except_monitor() {
        for s in ALL_STATES {
            let exits = ALL_EVENTS.iter().filter(|e| s.transition(**e).is_some()).count();
            let expected = if s == CycleState::MonitoringExit { 2 } else { 1 };
            assert_eq!(exits, expected, "{s}");
        }
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(
            serde_json::to_string(&CycleState::MonitoringExit).unwrap(),
            "\"monitoring_exit\""
        );
    }
}
