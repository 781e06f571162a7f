//! File-backed persistence for the straddle lifecycle.
//!
//! - [`JsonSnapshotStore`]: one JSON snapshot per trading day, replaced
//!   atomically after every transition
//! - [`JournalWriter`]: append-only JSON Lines decision journal, one file
//!   per trading day

pub mod error;
pub mod journal;
pub mod snapshot;

pub use error::{PersistenceError, PersistenceResult};
pub use journal::JournalWriter;
pub use snapshot::JsonSnapshotStore;
