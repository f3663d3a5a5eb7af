//! Checkpoint engine.
//!
//! - [`snapshot`] - Canonical, checksummed capture of a project's context
//! - [`store`] - Persisted checkpoint lifecycle and validation
//! - [`diff`] - Structured comparison of two checkpoints
//! - [`manager`] - Create / restore / compare / cleanup orchestration

pub mod diff;
pub mod manager;
pub mod snapshot;
pub mod store;

pub use diff::CheckpointComparison;
pub use manager::{CheckpointManager, RestoreSummary, VerifyReport, DEFAULT_KEEP_COUNT};
pub use snapshot::{build_snapshot, Snapshot, SnapshotPayload, SNAPSHOT_FORMAT_VERSION};
pub use store::{CheckpointMeta, CheckpointStore};
