//! Decision journal: the append-only record of every transition, controller
//! decision and error.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::state::CycleState;

/// What a journal line describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalKind {
    Transition,
    Decision,
    Error,
}

/// One journal line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub ts: DateTime<Utc>,
    pub cycle_id: u64,
    pub state: CycleState,
    pub kind: JournalKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub detail: serde_json::Value,
}

impl JournalEntry {
    pub fn new(
        ts: DateTime<Utc>,
        cycle_id: u64,
        state: CycleState,
        kind: JournalKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            ts,
            cycle_id,
            state,
            kind,
            message: message.into(),
            detail: serde_json::Value::Null,
        }
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}

/// Sink for journal entries.
///
/// Recording must not fail the caller; implementations log their own errors.
pub trait DecisionJournal: Send + Sync {
    fn record(&self, entry: JournalEntry);
}

/// Journal that drops everything.
#[derive(Debug, Default)]
pub struct NullJournal;

impl DecisionJournal for NullJournal {
    fn record(&self, _entry: JournalEntry) {}
}

/// In-memory journal for tests and inspection.
#[derive(Debug, Default)]
pub struct MemoryJournal {
    entries: Mutex<Vec<JournalEntry>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<JournalEntry> {
        self.entries.lock().clone()
    }

    pub fn count(&self, kind: JournalKind) -> usize {
        self.entries.lock().iter().filter(|e| e.kind == kind).count()
    }
}

impl DecisionJournal for MemoryJournal {
    fn record(&self, entry: JournalEntry) {
        self.entries.lock().push(entry);
    }
}
