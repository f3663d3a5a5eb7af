//! Thread-safe handle implementing the collaborator traits over SQLite.
//!
//! `rusqlite::Connection` is `Send` but not `Sync`, so the autosave service
//! cannot share a bare [`SqliteStorage`] across tasks. [`SharedStorage`]
//! serializes access through a mutex and stamps every mutation with a fixed
//! actor name for the audit trail.

use crate::error::{Error, Result};
use crate::model::{Checkpoint, IssueContext, NewCheckpoint, Project, SessionState, TaskList};
use crate::storage::sqlite::SqliteStorage;
use crate::storage::traits::{CheckpointBackend, ContextStore, ProjectRegistry};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Mutex-guarded [`SqliteStorage`] usable from the autosave scheduler.
#[derive(Debug)]
pub struct SharedStorage {
    inner: Mutex<SqliteStorage>,
    actor: String,
}

impl SharedStorage {
    /// Wrap an open storage handle. `actor` is recorded on every audit event.
    pub fn new(storage: SqliteStorage, actor: impl Into<String>) -> Self {
        Self {
            inner: Mutex::new(storage),
            actor: actor.into(),
        }
    }

    /// Actor name used for audit events.
    #[must_use]
    pub fn actor(&self) -> &str {
        &self.actor
    }

    /// Lock the underlying storage.
    ///
    /// # Errors
    ///
    /// Returns an error if a previous holder panicked mid-transaction.
    pub fn lock(&self) -> Result<MutexGuard<'_, SqliteStorage>> {
        self.inner
            .lock()
            .map_err(|_| Error::Other("storage lock poisoned".to_string()))
    }
}

impl ContextStore for SharedStorage {
    fn get_issue_context(&self, project_id: &str) -> Result<Option<IssueContext>> {
        self.lock()?.get_issue_context(project_id)
    }

    fn get_tasks(&self, project_id: &str) -> Result<Option<TaskList>> {
        self.lock()?.get_tasks(project_id)
    }

    fn get_session_state(&self, project_id: &str) -> Result<Option<SessionState>> {
        self.lock()?.get_session_state(project_id)
    }

    fn save_issue_context(&self, project_id: &str, issue: &IssueContext) -> Result<()> {
        self.lock()?.save_issue_context(project_id, issue, &self.actor)
    }

    fn save_tasks(&self, project_id: &str, tasks: &TaskList) -> Result<()> {
        self.lock()?.save_tasks(project_id, tasks, &self.actor)
    }

    fn save_session_state(&self, project_id: &str, session: &SessionState) -> Result<()> {
        self.lock()?.save_session_state(project_id, session, &self.actor)
    }
}

impl CheckpointBackend for SharedStorage {
    fn insert_checkpoint(&self, checkpoint: &NewCheckpoint) -> Result<Checkpoint> {
        self.lock()?.insert_checkpoint(checkpoint, &self.actor)
    }

    fn list_checkpoints(&self, project_id: &str) -> Result<Vec<Checkpoint>> {
        self.lock()?.list_checkpoints(project_id)
    }

    fn latest_checkpoint(&self, project_id: &str) -> Result<Option<Checkpoint>> {
        self.lock()?.latest_checkpoint(project_id)
    }

    fn find_checkpoint(&self, id: i64) -> Result<Option<Checkpoint>> {
        self.lock()?.get_checkpoint(id)
    }

    fn delete_checkpoint(&self, id: i64) -> Result<bool> {
        self.lock()?.delete_checkpoint(id, &self.actor)
    }

    fn record_restore(&self, id: i64) -> Result<()> {
        self.lock()?.record_restore(id, &self.actor)
    }
}

impl ProjectRegistry for SharedStorage {
    fn find_project(&self, project_path: &str) -> Result<Option<Project>> {
        self.lock()?.get_project_by_path(project_path)
    }

    fn resolve_project(&self, project_path: &str) -> Result<Project> {
        let mut storage = self.lock()?;

        if let Some(project) = storage.get_project_by_path(project_path)? {
            storage.touch_project(&project.id)?;
            return Ok(project);
        }

        let project = Project::new(
            project_path.to_string(),
            Project::name_from_path(project_path),
        );
        storage.create_project(&project, &self.actor)?;
        debug!(project = %project_path, id = %project.id, "Registered new project");
        Ok(project)
    }

    fn list_projects(&self) -> Result<Vec<Project>> {
        self.lock()?.list_projects()
    }

    fn delete_project(&self, project_path: &str) -> Result<bool> {
        let mut storage = self.lock()?;
        match storage.get_project_by_path(project_path)? {
            Some(project) => storage.delete_project(&project.id, &self.actor),
            None => Ok(false),
        }
    }
}
