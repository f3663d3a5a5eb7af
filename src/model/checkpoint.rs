//! Persisted checkpoint records.

use serde::{Deserialize, Serialize};

/// A durable, named snapshot of a project's context.
///
/// `snapshot_data` holds the canonical payload text exactly as it was
/// checksummed; it is never re-serialized after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Store-assigned id
    pub id: i64,

    /// Owning project id
    pub project_id: String,

    /// Human label
    pub name: String,

    /// Git branch at capture time
    pub branch: Option<String>,

    /// What the agent was doing when the checkpoint was taken
    pub last_command: Option<String>,

    /// Suggested next step after restoring
    pub next_action: Option<String>,

    /// Canonical serialized payload
    pub snapshot_data: String,

    /// SHA-256 hex digest of `snapshot_data`
    pub checksum: String,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,
}

/// Insert payload for a checkpoint. The backend assigns the id.
#[derive(Debug, Clone)]
pub struct NewCheckpoint {
    pub project_id: String,
    pub name: String,
    pub branch: Option<String>,
    pub last_command: Option<String>,
    pub next_action: Option<String>,
    pub snapshot_data: String,
    pub checksum: String,
    pub created_at: i64,
}
