//! AR change queueing and batched synchronization

mod conflict;
mod engine;
mod policy;
mod queue;
mod updater;

pub use conflict::{resolve_conflicts, Resolution};
pub use engine::{RecordOutcome, SyncConfig, SyncEngine, SyncReport, SyncStatus, SyncThresholds};
pub use policy::{exceeds_threshold, is_critical, CRITICAL_MOVE_DISTANCE};
pub use queue::{ChangeQueue, Lane};
pub use updater::{BimUpdater, LoggingUpdater};
