//! Collaborator interfaces consumed by the checkpoint engine.
//!
//! The engine never touches SQL directly. It reads and writes context,
//! resolves projects, and persists checkpoints only through these traits,
//! which keeps it testable with in-memory spies.
//!
//! All methods take `&self`: implementations shared with the autosave
//! scheduler must be `Send + Sync` and handle their own locking.

use crate::error::Result;
use crate::model::{Checkpoint, IssueContext, NewCheckpoint, Project, SessionState, TaskList};

/// Read/write access to a project's working context.
///
/// Getters return `Ok(None)` when nothing has been saved yet. Every `save_*`
/// is a full replace of that part.
pub trait ContextStore: Send + Sync {
    fn get_issue_context(&self, project_id: &str) -> Result<Option<IssueContext>>;
    fn get_tasks(&self, project_id: &str) -> Result<Option<TaskList>>;
    fn get_session_state(&self, project_id: &str) -> Result<Option<SessionState>>;

    fn save_issue_context(&self, project_id: &str, issue: &IssueContext) -> Result<()>;
    fn save_tasks(&self, project_id: &str, tasks: &TaskList) -> Result<()>;
    fn save_session_state(&self, project_id: &str, session: &SessionState) -> Result<()>;
}

/// Durable checkpoint rows keyed by a numeric id.
pub trait CheckpointBackend: Send + Sync {
    /// Insert atomically and return the stored row.
    fn insert_checkpoint(&self, checkpoint: &NewCheckpoint) -> Result<Checkpoint>;

    /// All checkpoints of a project, newest first.
    fn list_checkpoints(&self, project_id: &str) -> Result<Vec<Checkpoint>>;

    fn latest_checkpoint(&self, project_id: &str) -> Result<Option<Checkpoint>>;

    fn find_checkpoint(&self, id: i64) -> Result<Option<Checkpoint>>;

    /// Returns whether a row was removed.
    fn delete_checkpoint(&self, id: i64) -> Result<bool>;

    /// Note a successful restore in the audit trail, if the backend keeps one.
    fn record_restore(&self, _id: i64) -> Result<()> {
        Ok(())
    }
}

/// Maps project paths to stable internal ids.
pub trait ProjectRegistry: Send + Sync {
    fn find_project(&self, project_path: &str) -> Result<Option<Project>>;

    /// Find the project for `project_path`, creating it on first reference.
    fn resolve_project(&self, project_path: &str) -> Result<Project>;

    fn list_projects(&self) -> Result<Vec<Project>>;

    /// Delete a project together with its context and checkpoints.
    fn delete_project(&self, project_path: &str) -> Result<bool>;
}

/// Everything the checkpoint manager needs from persistence.
pub trait Persistence: ContextStore + CheckpointBackend + ProjectRegistry {}

impl<T: ContextStore + CheckpointBackend + ProjectRegistry> Persistence for T {}
