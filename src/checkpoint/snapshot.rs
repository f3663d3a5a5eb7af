//! Point-in-time capture of a project's working context.
//!
//! # Canonical payload (format version 1)
//!
//! ```text
//! {"format_version":1,"issue":<IssueContext|null>,"tasks":<TaskList|null>,"session":<SessionState|null>}
//! ```
//!
//! Keys appear in exactly that order, nested structs serialize their fields
//! in declaration order, and no whitespace is emitted. The checksum is the
//! SHA-256 of these exact bytes. The stored text is what gets verified; it is
//! never re-serialized after creation.

use crate::error::{Error, Result};
use crate::model::{IssueContext, SessionState, TaskList};
use crate::storage::traits::{ContextStore, ProjectRegistry};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

/// Version written into every payload.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// The three context parts, each optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotPayload {
    pub format_version: u32,
    pub issue: Option<IssueContext>,
    pub tasks: Option<TaskList>,
    pub session: Option<SessionState>,
}

impl SnapshotPayload {
    /// Payload in the current format.
    #[must_use]
    pub fn new(
        issue: Option<IssueContext>,
        tasks: Option<TaskList>,
        session: Option<SessionState>,
    ) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            issue,
            tasks,
            session,
        }
    }

    /// Serialize to the canonical text.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_canonical_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse stored payload text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a payload, or was written by a
    /// newer format version.
    pub fn parse(data: &str) -> Result<Self> {
        let payload: Self = serde_json::from_str(data)?;
        if payload.format_version == 0 || payload.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(Error::InvalidArgument(format!(
                "unsupported snapshot format version {}",
                payload.format_version
            )));
        }
        Ok(payload)
    }

    /// True when no part was captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.issue.is_none() && self.tasks.is_none() && self.session.is_none()
    }
}

/// A checksummed snapshot, not yet persisted.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub project_id: String,
    /// Capture timestamp (Unix milliseconds)
    pub created_at: i64,
    pub payload: SnapshotPayload,
    /// Canonical text of `payload`
    pub snapshot_data: String,
    pub checksum: String,
}

impl Snapshot {
    /// Serialize and checksum a payload.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn from_payload(project_id: &str, payload: SnapshotPayload) -> Result<Self> {
        let snapshot_data = payload.to_canonical_json()?;
        let checksum = checksum(&snapshot_data);

        Ok(Self {
            project_id: project_id.to_string(),
            created_at: chrono::Utc::now().timestamp_millis(),
            payload,
            snapshot_data,
            checksum,
        })
    }
}

/// SHA-256 hex digest of stored payload text.
#[must_use]
pub fn checksum(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Capture the current context of the project at `project_path`.
///
/// Absent parts stay absent; nothing is defaulted.
///
/// # Errors
///
/// Returns [`Error::ProjectNotFound`] if the path is not a registered
/// project, or any error from the context store.
pub fn build_snapshot<S>(store: &S, project_path: &str) -> Result<Snapshot>
where
    S: ProjectRegistry + ContextStore + ?Sized,
{
    let project = store
        .find_project(project_path)?
        .ok_or_else(|| Error::ProjectNotFound {
            id: project_path.to_string(),
        })?;

    let payload = SnapshotPayload::new(
        store.get_issue_context(&project.id)?,
        store.get_tasks(&project.id)?,
        store.get_session_state(&project.id)?,
    );

    let snapshot = Snapshot::from_payload(&project.id, payload)?;
    debug!(
        project = %project_path,
        checksum = %snapshot.checksum,
        bytes = snapshot.snapshot_data.len(),
        "Built snapshot"
    );
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Task, TaskStatus};
    use crate::storage::{SharedStorage, SqliteStorage};

    fn issue() -> IssueContext {
        IssueContext {
            number: 42,
            title: "Add autosave".into(),
            requirements: vec!["retry on failure".into()],
            design_decisions: vec![],
        }
    }

    #[test]
    fn test_canonical_key_order() {
        let payload = SnapshotPayload::new(Some(issue()), None, None);
        let json = payload.to_canonical_json().unwrap();

        assert!(json.starts_with(r#"{"format_version":1,"issue":{"number":42,"title":"#));
        assert!(json.ends_with(r#""tasks":null,"session":null}"#));
    }

    #[test]
    fn test_checksum_is_stable_and_content_sensitive() {
        let a = Snapshot::from_payload("p", SnapshotPayload::new(Some(issue()), None, None))
            .unwrap();
        let b = Snapshot::from_payload("p", SnapshotPayload::new(Some(issue()), None, None))
            .unwrap();
        assert_eq!(a.checksum, b.checksum);
        assert_eq!(a.checksum.len(), 64);

        let mut other = issue();
        other.title.push('!');
        let c = Snapshot::from_payload("p", SnapshotPayload::new(Some(other), None, None))
            .unwrap();
        assert_ne!(a.checksum, c.checksum);
    }

    #[test]
    fn test_parse_rejects_future_version() {
        let data = r#"{"format_version":2,"issue":null,"tasks":null,"session":null}"#;
        assert!(SnapshotPayload::parse(data).is_err());

        let data = r#"{"format_version":1,"issue":null,"tasks":null,"session":null}"#;
        assert!(SnapshotPayload::parse(data).unwrap().is_empty());
    }

    #[test]
    fn test_build_snapshot_unknown_project() {
        let storage = SharedStorage::new(SqliteStorage::open_memory().unwrap(), "test");
        let err = build_snapshot(&storage, "/missing").unwrap_err();
        assert!(matches!(err, Error::ProjectNotFound { .. }));
    }

    #[test]
    fn test_build_snapshot_keeps_absent_parts_absent() {
        let storage = SharedStorage::new(SqliteStorage::open_memory().unwrap(), "test");
        let project = storage.resolve_project("/work/app").unwrap();

        let tasks = TaskList::from_tasks([Task {
            id: "t1".into(),
            description: "write tests".into(),
            status: TaskStatus::Pending,
            priority: 0,
            created_at: 1,
            completed_at: None,
        }]);
        storage.save_tasks(&project.id, &tasks).unwrap();

        let snapshot = build_snapshot(&storage, "/work/app").unwrap();
        assert_eq!(snapshot.project_id, project.id);
        assert!(snapshot.payload.issue.is_none());
        assert!(snapshot.payload.session.is_none());
        assert_eq!(snapshot.payload.tasks, Some(tasks));
        assert_eq!(snapshot.checksum, checksum(&snapshot.snapshot_data));
    }
}
