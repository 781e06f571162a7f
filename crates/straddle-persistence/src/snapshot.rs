//! JSON snapshot store.
//!
//! One file per trading day (`snapshot_YYYY-MM-DD.json`). Each save writes
//! a temp file in the same directory, syncs it and renames it over the old
//! snapshot, so a crash mid-write leaves the previous snapshot intact.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use straddle_lifecycle::{CycleSnapshot, LifecycleResult, SnapshotStore};
use tracing::{debug, info, warn};

use crate::error::{PersistenceError, PersistenceResult};

/// Snapshot store rooted at a directory.
#[derive(Debug, Clone)]
pub struct JsonSnapshotStore {
    base_dir: PathBuf,
}

impl JsonSnapshotStore {
    /// Create the store, creating `base_dir` if missing.
    pub fn new(base_dir: impl Into<PathBuf>) -> PersistenceResult<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)?;
        info!(dir = %base_dir.display(), "Snapshot store ready");
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn path_for(&self, day: NaiveDate) -> PathBuf {
        self.base_dir.join(format!("snapshot_{}.json", day.format("%Y-%m-%d")))
    }

    fn write(&self, snapshot: &CycleSnapshot) -> PersistenceResult<()> {
        let path = self.path_for(snapshot.trading_day);
        let tmp = path.with_extension("json.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer_pretty(&mut writer, snapshot)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        debug!(
            path = %path.display(),
            cycle_id = snapshot.cycle.cycle_id,
            state = %snapshot.cycle.state,
            "Snapshot written"
        );
        Ok(())
    }

    fn read(&self, day: NaiveDate) -> PersistenceResult<Option<CycleSnapshot>> {
        let path = self.path_for(day);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshot: CycleSnapshot = serde_json::from_slice(&bytes)?;
        if snapshot.trading_day != day {
            return Err(PersistenceError::DayMismatch {
                expected: day.to_string(),
                found: snapshot.trading_day.to_string(),
            });
        }
        Ok(Some(snapshot))
    }
}

impl SnapshotStore for JsonSnapshotStore {
    fn save(&self, snapshot: &CycleSnapshot) -> LifecycleResult<()> {
        self.write(snapshot).map_err(Into::into)
    }

    fn load(&self, day: NaiveDate) -> LifecycleResult<Option<CycleSnapshot>> {
        match self.read(day) {
            Ok(found) => Ok(found),
            Err(e) => {
                warn!(error = %e, day = %day, "Snapshot unreadable");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use straddle_core::{EntryPlan, Price};
    use straddle_lifecycle::{CycleRecord, CycleState, LifecycleError};
    use tempfile::TempDir;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    fn plan() -> EntryPlan {
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

    fn snapshot(cycle_id: u64) -> CycleSnapshot {
        CycleSnapshot {
            trading_day: day(),
            plan: plan(),
            quantity: 2,
            cycle: CycleRecord::new(cycle_id),
            saved_at: Utc::now(),
        }
    }

    #[test]
    fn test_load_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let store = JsonSnapshotStore::new(dir.path()).unwrap();
        assert!(store.load(day()).unwrap().is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = JsonSnapshotStore::new(dir.path()).unwrap();
        store.save(&snapshot(3)).unwrap();

        let loaded = store.load(day()).unwrap().unwrap();
        assert_eq!(loaded.cycle.cycle_id, 3);
        assert_eq!(loaded.cycle.state, CycleState::AwaitingEntry);
        assert_eq!(loaded.plan, plan());
        assert!(store.load(day().succ_opt().unwrap()).unwrap().is_none());
    }

    #[test]
    fn test_save_replaces_and_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let store = JsonSnapshotStore::new(dir.path()).unwrap();
        store.save(&snapshot(1)).unwrap();
        store.save(&snapshot(2)).unwrap();

        assert_eq!(store.load(day()).unwrap().unwrap().cycle.cycle_id, 2);
        let files: Vec<_> = fs::read_dir(dir.path()).unwrap().filter_map(|e| e.ok()).collect();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path(), store.path_for(day()));
    }

    #[test]
    fn test_corrupt_snapshot_is_persistence_error() {
        let dir = TempDir::new().unwrap();
        let store = JsonSnapshotStore::new(dir.path()).unwrap();
        fs::write(store.path_for(day()), b"{\"trading_day\":").unwrap();
        assert!(matches!(store.load(day()), Err(LifecycleError::Persistence(_))));
    }

    #[test]
    fn test_snapshot_under_wrong_day_rejected() {
        let dir = TempDir::new().unwrap();
        let store = JsonSnapshotStore::new(dir.path()).unwrap();
        store.save(&snapshot(1)).unwrap();
        let other = day().succ_opt().unwrap();
        fs::copy(store.path_for(day()), store.path_for(other)).unwrap();
        assert!(store.load(other).is_err());
    }

    #[test]
    fn test_new_creates_nested_dir() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("state").join("snapshots");
        let store = JsonSnapshotStore::new(&nested).unwrap();
        assert!(store.base_dir().is_dir());
    }
}
