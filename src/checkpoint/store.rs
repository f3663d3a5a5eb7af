//! Durable checkpoint lifecycle and integrity checks.

use crate::checkpoint::snapshot::{checksum, Snapshot, SnapshotPayload};
use crate::error::Result;
use crate::model::{Checkpoint, NewCheckpoint};
use crate::storage::traits::CheckpointBackend;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Optional labels attached to a checkpoint at creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub name: Option<String>,
    pub branch: Option<String>,
    pub last_command: Option<String>,
    pub next_action: Option<String>,
}

/// Name used when the caller gives none.
#[must_use]
pub fn default_checkpoint_name() -> String {
    format!("Checkpoint {}", local_timestamp())
}

/// Name for a checkpoint taken by the autosave scheduler.
#[must_use]
pub fn auto_checkpoint_name(trigger: &str) -> String {
    format!("Auto-save: {trigger} - {}", local_timestamp())
}

/// Human-readable local time for checkpoint names.
#[must_use]
pub fn local_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Checkpoint operations over a backing store.
pub struct CheckpointStore<'a, B: CheckpointBackend + ?Sized> {
    backend: &'a B,
}

impl<'a, B: CheckpointBackend + ?Sized> CheckpointStore<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// Persist a snapshot. Either the full row is stored or nothing is.
    ///
    /// # Errors
    ///
    /// Returns the backend error; the caller decides whether to retry.
    pub fn create(&self, snapshot: &Snapshot, meta: CheckpointMeta) -> Result<Checkpoint> {
        let name = meta
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(default_checkpoint_name);

        let checkpoint = self.backend.insert_checkpoint(&NewCheckpoint {
            project_id: snapshot.project_id.clone(),
            name,
            branch: meta.branch,
            last_command: meta.last_command,
            next_action: meta.next_action,
            snapshot_data: snapshot.snapshot_data.clone(),
            checksum: snapshot.checksum.clone(),
            created_at: snapshot.created_at,
        })?;

        debug!(id = checkpoint.id, name = %checkpoint.name, "Stored checkpoint");
        Ok(checkpoint)
    }

    /// Newest first; equal timestamps fall back to the higher id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend query fails.
    pub fn list_by_project(&self, project_id: &str) -> Result<Vec<Checkpoint>> {
        self.backend.list_checkpoints(project_id)
    }

    /// # Errors
    ///
    /// Returns an error if the backend query fails.
    pub fn latest(&self, project_id: &str) -> Result<Option<Checkpoint>> {
        self.backend.latest_checkpoint(project_id)
    }

    /// # Errors
    ///
    /// Returns an error if the backend query fails.
    pub fn find_by_id(&self, id: i64) -> Result<Option<Checkpoint>> {
        self.backend.find_checkpoint(id)
    }

    /// Remove a checkpoint. Deleting a missing id is a no-op returning `false`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend delete fails.
    pub fn delete(&self, id: i64) -> Result<bool> {
        self.backend.delete_checkpoint(id)
    }

    /// Whether the stored payload is intact and parseable.
    #[must_use]
    pub fn validate(&self, checkpoint: &Checkpoint) -> bool {
        verify(checkpoint).is_ok()
    }
}

/// Check a stored checkpoint and return its parsed payload.
///
/// The error is a human-readable reason, never a store failure.
///
/// # Errors
///
/// Returns the reason when the checksum mismatches or the payload does not
/// parse.
pub fn verify(checkpoint: &Checkpoint) -> std::result::Result<SnapshotPayload, String> {
    let actual = checksum(&checkpoint.snapshot_data);
    if actual != checkpoint.checksum {
        warn!(id = checkpoint.id, "Checkpoint checksum mismatch");
        return Err(format!(
            "checksum mismatch (stored {}, computed {actual})",
            checkpoint.checksum
        ));
    }

    SnapshotPayload::parse(&checkpoint.snapshot_data).map_err(|e| {
        warn!(id = checkpoint.id, error = %e, "Checkpoint payload does not parse");
        format!("payload does not parse: {e}")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::IssueContext;
    use crate::storage::traits::ProjectRegistry;
    use crate::storage::{SharedStorage, SqliteStorage};

    fn setup() -> (SharedStorage, String) {
        let storage = SharedStorage::new(SqliteStorage::open_memory().unwrap(), "test");
        let project = storage.resolve_project("/work/app").unwrap();
        (storage, project.id)
    }

    fn snapshot(project_id: &str) -> Snapshot {
        let payload = SnapshotPayload::new(
            Some(IssueContext {
                number: 7,
                title: "Fix login".into(),
                requirements: vec!["no plaintext".into()],
                design_decisions: vec!["argon2".into()],
            }),
            None,
            None,
        );
        Snapshot::from_payload(project_id, payload).unwrap()
    }

    #[test]
    fn test_create_uses_default_name() {
        let (storage, project_id) = setup();
        let store = CheckpointStore::new(&storage);

        let cp = store.create(&snapshot(&project_id), CheckpointMeta::default()).unwrap();
        assert!(cp.name.starts_with("Checkpoint "));
        assert!(cp.id > 0);

        let named = store
            .create(
                &snapshot(&project_id),
                CheckpointMeta {
                    name: Some("before refactor".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(named.name, "before refactor");
    }

    #[test]
    fn test_unmodified_checkpoint_is_valid() {
        let (storage, project_id) = setup();
        let store = CheckpointStore::new(&storage);

        let cp = store.create(&snapshot(&project_id), CheckpointMeta::default()).unwrap();
        let fetched = store.find_by_id(cp.id).unwrap().unwrap();
        assert!(store.validate(&fetched));
    }

    #[test]
    fn test_any_byte_mutation_is_invalid() {
        let (storage, project_id) = setup();
        let store = CheckpointStore::new(&storage);
        let cp = store.create(&snapshot(&project_id), CheckpointMeta::default()).unwrap();

        let bytes = cp.snapshot_data.as_bytes();
        for i in 0..bytes.len() {
            let mut mutated = bytes.to_vec();
            mutated[i] = if mutated[i] == b'x' { b'y' } else { b'x' };
            let mut copy = cp.clone();
            copy.snapshot_data = String::from_utf8(mutated).unwrap();
            assert!(!store.validate(&copy), "mutation at byte {i} went unnoticed");
        }
    }

    #[test]
    fn test_matching_checksum_over_garbage_is_invalid() {
        let (storage, _) = setup();
        let store = CheckpointStore::new(&storage);

        let mut cp = Checkpoint {
            id: 1,
            project_id: "p".into(),
            name: "n".into(),
            branch: None,
            last_command: None,
            next_action: None,
            snapshot_data: "{not json".into(),
            checksum: String::new(),
            created_at: 0,
        };
        cp.checksum = checksum(&cp.snapshot_data);

        assert!(!store.validate(&cp));
        assert!(verify(&cp).unwrap_err().contains("does not parse"));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (storage, project_id) = setup();
        let store = CheckpointStore::new(&storage);
        let cp = store.create(&snapshot(&project_id), CheckpointMeta::default()).unwrap();

        assert!(store.delete(cp.id).unwrap());
        assert!(!store.delete(cp.id).unwrap());
        assert!(store.latest(&project_id).unwrap().is_none());
    }
}
