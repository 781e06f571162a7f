//! JSON Lines decision journal.
//!
//! One line per [`JournalEntry`] in `journal_YYYY-MM-DD.jsonl`, keyed by the
//! market-local day of the entry. Files are opened in append mode, so a
//! restarted process keeps adding to the same day's file and a torn write
//! only damages its own line.
//!
//! Decisions are buffered; transitions and errors flush the buffer at once.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use straddle_core::MarketTime;
use straddle_lifecycle::{DecisionJournal, JournalEntry, JournalKind};
use tracing::{debug, info, warn};

use crate::error::PersistenceResult;

/// Open file for one trading day.
struct ActiveWriter {
    writer: BufWriter<File>,
    date: String,
    records_written: usize,
}

struct WriterState {
    buffer: Vec<JournalEntry>,
    active: Option<ActiveWriter>,
}

/// Append-only journal rooted at a directory.
pub struct JournalWriter {
    base_dir: PathBuf,
    market_time: MarketTime,
    max_buffer_size: usize,
    state: Mutex<WriterState>,
}

impl JournalWriter {
    pub fn new(base_dir: impl Into<PathBuf>, market_time: MarketTime, max_buffer_size: usize) -> PersistenceResult<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self {
            base_dir,
            market_time,
            max_buffer_size: max_buffer_size.max(1),
            state: Mutex::new(WriterState {
                buffer: Vec::with_capacity(max_buffer_size),
                active: None,
            }),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn file_for(&self, date: &str) -> PathBuf {
        self.base_dir.join(format!("journal_{date}.jsonl"))
    }

    /// Write all buffered entries.
    pub fn flush(&self) -> PersistenceResult<()> {
        let mut state = self.state.lock();
        self.flush_locked(&mut state)
    }

    fn flush_locked(&self, state: &mut WriterState) -> PersistenceResult<()> {
        if state.buffer.is_empty() {
            return Ok(());
        }

        let entries = std::mem::take(&mut state.buffer);
        let mut written = 0usize;
        let result: PersistenceResult<()> = entries.iter().try_for_each(|entry| {
            self.write_entry(state, entry)?;
            written += 1;
            Ok(())
        });
        if let Err(e) = result {
            // Keep what did not reach the file for the next flush.
            state.buffer = entries.into_iter().skip(written).collect();
            return Err(e);
        }
        if let Some(active) = state.active.as_mut() {
            active.writer.flush()?;
        }

        debug!(records = written, "Flushed journal entries");
        Ok(())
    }

    fn write_entry(&self, state: &mut WriterState, entry: &JournalEntry) -> PersistenceResult<()> {
        let date = self.market_time.trading_day(entry.ts).format("%Y-%m-%d").to_string();
        let line = serde_json::to_string(entry)?;
        let active = self.writer_for(state, &date)?;
        writeln!(active.writer, "{line}")?;
        active.records_written += 1;
        Ok(())
    }

    /// Entries waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.state.lock().buffer.len()
    }

    /// Writer for `date`, rotating the open file when the day changes.
    fn writer_for<'s>(&self, state: &'s mut WriterState, date: &str) -> PersistenceResult<&'s mut ActiveWriter> {
        let active = match state.active.take() {
            Some(active) if active.date == date => active,
            stale => {
                if let Some(old) = stale {
                    close_writer(old);
                }
                let path = self.file_for(date);
                info!(path = %path.display(), "Opening journal file (append mode)");
                let file = OpenOptions::new().create(true).append(true).open(&path)?;
                ActiveWriter {
                    writer: BufWriter::new(file),
                    date: date.to_string(),
                    records_written: 0,
                }
            }
        };
        Ok(state.active.insert(active))
    }

    /// Flush and close the open file.
    pub fn close(&self) -> PersistenceResult<()> {
        let mut state = self.state.lock();
        let result = self.flush_locked(&mut state);
        close_active(&mut state);
        result
    }
}

fn close_active(state: &mut WriterState) {
    if let Some(active) = state.active.take() {
        close_writer(active);
    }
}

fn close_writer(mut active: ActiveWriter) {
    if let Err(e) = active.writer.flush() {
        warn!(?e, "Failed to flush journal on close");
    }
    info!(date = %active.date, records = active.records_written, "Closed journal file");
}

impl DecisionJournal for JournalWriter {
    fn record(&self, entry: JournalEntry) {
        let urgent = entry.kind != JournalKind::Decision;
        let mut state = self.state.lock();
        state.buffer.push(entry);
        if urgent || state.buffer.len() >= self.max_buffer_size {
            if let Err(e) = self.flush_locked(&mut state) {
                warn!(error = %e, "Journal write failed");
            }
        }
    }
}

impl Drop for JournalWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(?e, "Failed to flush journal on drop");
        }
    }
}
