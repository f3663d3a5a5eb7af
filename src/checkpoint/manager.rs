//! Checkpoint orchestration: snapshot, persist, restore, compare, prune.
//!
//! Every operation addresses a project by its directory path and reaches
//! persistence only through the [`Persistence`] collaborator.

use crate::checkpoint::diff::{self, CheckpointComparison};
use crate::checkpoint::snapshot::build_snapshot;
use crate::checkpoint::store::{self, auto_checkpoint_name, CheckpointMeta, CheckpointStore};
use crate::error::{Error, Result};
use crate::model::Checkpoint;
use crate::storage::traits::Persistence;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

/// How many checkpoints `cleanup_old_checkpoints` keeps by default.
pub const DEFAULT_KEEP_COUNT: usize = 10;

const DEFAULT_NEXT_ACTION: &str = "Continue from checkpoint";

/// Which parts a restore wrote back.
#[derive(Debug, Clone, Serialize)]
pub struct RestoreSummary {
    pub checkpoint_id: i64,
    pub name: String,
    pub issue: bool,
    pub tasks: bool,
    pub session: bool,
}

/// Result of an integrity check.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub checkpoint_id: i64,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Checkpoint operations over a shared persistence handle.
pub struct CheckpointManager<S: Persistence> {
    storage: Arc<S>,
}

impl<S: Persistence> Clone for CheckpointManager<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
        }
    }
}

impl<S: Persistence> CheckpointManager<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    #[must_use]
    pub fn storage(&self) -> &S {
        &self.storage
    }

    fn store(&self) -> CheckpointStore<'_, S> {
        CheckpointStore::new(self.storage.as_ref())
    }

    /// Snapshot the project's current context and persist it.
    ///
    /// `branch` and `last_command` fall back to the session's branch and
    /// current task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProjectNotFound`] for an unknown path, or the store
    /// error if persisting fails.
    pub fn create_checkpoint(&self, project_path: &str, meta: CheckpointMeta) -> Result<Checkpoint> {
        info!(project = %project_path, name = ?meta.name, "Creating checkpoint");

        let snapshot = build_snapshot(self.storage.as_ref(), project_path)?;
        let session = snapshot.payload.session.as_ref();

        let meta = CheckpointMeta {
            branch: meta.branch.or_else(|| session.map(|s| s.branch.clone())),
            last_command: meta
                .last_command
                .or_else(|| session.map(|s| s.current_task.clone())),
            next_action: meta
                .next_action
                .or_else(|| Some(DEFAULT_NEXT_ACTION.to_string())),
            name: meta.name,
        };

        let checkpoint = self.store().create(&snapshot, meta)?;
        info!(
            project = %project_path,
            id = checkpoint.id,
            name = %checkpoint.name,
            "Checkpoint created"
        );
        Ok(checkpoint)
    }

    /// Create a checkpoint named after the trigger that caused it.
    ///
    /// # Errors
    ///
    /// Same as [`Self::create_checkpoint`].
    pub fn create_auto_checkpoint(&self, project_path: &str, trigger: &str) -> Result<Checkpoint> {
        self.create_checkpoint(
            project_path,
            CheckpointMeta {
                name: Some(auto_checkpoint_name(trigger)),
                ..CheckpointMeta::default()
            },
        )
    }

    /// Checkpoints of a project, newest first. Unknown projects have none.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    pub fn list_checkpoints(&self, project_path: &str) -> Result<Vec<Checkpoint>> {
        match self.storage.find_project(project_path)? {
            Some(project) => self.store().list_by_project(&project.id),
            None => Ok(Vec::new()),
        }
    }

    /// # Errors
    ///
    /// Returns an error if the store query fails.
    pub fn latest_checkpoint(&self, project_path: &str) -> Result<Option<Checkpoint>> {
        match self.storage.find_project(project_path)? {
            Some(project) => self.store().latest(&project.id),
            None => Ok(None),
        }
    }

    /// # Errors
    ///
    /// Returns [`Error::CheckpointNotFound`] if no row has this id.
    pub fn get_checkpoint(&self, id: i64) -> Result<Checkpoint> {
        self.store()
            .find_by_id(id)?
            .ok_or_else(|| Error::CheckpointNotFound { id: id.to_string() })
    }

    /// Write a checkpoint's context back into the live store.
    ///
    /// Nothing is written unless the checkpoint passes validation. Parts
    /// absent from the checkpoint are left untouched. Failures surface
    /// immediately.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CheckpointNotFound`] if the id is unknown or belongs
    /// to another project, [`Error::CorruptCheckpoint`] if validation fails,
    /// or the first store error hit while writing.
    pub fn restore_checkpoint(&self, project_path: &str, id: i64) -> Result<RestoreSummary> {
        info!(project = %project_path, id, "Restoring checkpoint");

        let project = self
            .storage
            .find_project(project_path)?
            .ok_or_else(|| Error::ProjectNotFound {
                id: project_path.to_string(),
            })?;

        let checkpoint = self.get_checkpoint(id)?;
        if checkpoint.project_id != project.id {
            return Err(Error::CheckpointNotFound { id: id.to_string() });
        }

        let payload = store::verify(&checkpoint).map_err(|reason| {
            error!(project = %project_path, id, %reason, "Refusing to restore corrupt checkpoint");
            Error::CorruptCheckpoint {
                id: id.to_string(),
                reason,
            }
        })?;

        if let Some(issue) = &payload.issue {
            self.storage.save_issue_context(&project.id, issue)?;
        }
        if let Some(tasks) = &payload.tasks {
            self.storage.save_tasks(&project.id, tasks)?;
        }
        if let Some(session) = &payload.session {
            let mut session = session.clone();
            session.last_checkpoint = Some(checkpoint.created_at);
            self.storage.save_session_state(&project.id, &session)?;
        }
        self.storage.record_restore(id)?;

        info!(project = %project_path, id, name = %checkpoint.name, "Checkpoint restored");
        Ok(RestoreSummary {
            checkpoint_id: id,
            name: checkpoint.name,
            issue: payload.issue.is_some(),
            tasks: payload.tasks.is_some(),
            session: payload.session.is_some(),
        })
    }

    /// # Errors
    ///
    /// Returns [`Error::CheckpointNotFound`] if nothing was deleted.
    pub fn delete_checkpoint(&self, id: i64) -> Result<()> {
        if !self.store().delete(id)? {
            return Err(Error::CheckpointNotFound { id: id.to_string() });
        }
        info!(id, "Checkpoint deleted");
        Ok(())
    }

    /// Diff two checkpoints, `first` being the older side.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CheckpointNotFound`] for a missing id or
    /// [`Error::CorruptCheckpoint`] if either payload fails validation.
    pub fn compare_checkpoints(&self, first: i64, second: i64) -> Result<CheckpointComparison> {
        let a = self.get_checkpoint(first)?;
        let b = self.get_checkpoint(second)?;

        let parse = |cp: &Checkpoint| {
            store::verify(cp).map_err(|reason| Error::CorruptCheckpoint {
                id: cp.id.to_string(),
                reason,
            })
        };
        let payload_a = parse(&a)?;
        let payload_b = parse(&b)?;

        Ok(diff::compare(&a, &payload_a, &b, &payload_b))
    }

    /// # Errors
    ///
    /// Returns [`Error::CheckpointNotFound`] if the id is unknown.
    pub fn verify_checkpoint(&self, id: i64) -> Result<VerifyReport> {
        let checkpoint = self.get_checkpoint(id)?;
        let reason = store::verify(&checkpoint).err();
        Ok(VerifyReport {
            checkpoint_id: id,
            valid: reason.is_none(),
            reason,
        })
    }

    /// Delete all but the newest `keep` checkpoints. Returns how many went.
    ///
    /// Best effort: failures are logged and stop the sweep.
    pub fn cleanup_old_checkpoints(&self, project_path: &str, keep: usize) -> usize {
        let checkpoints = match self.list_checkpoints(project_path) {
            Ok(list) => list,
            Err(e) => {
                warn!(project = %project_path, error = %e, "Checkpoint cleanup failed");
                return 0;
            }
        };

        let mut deleted = 0;
        for checkpoint in checkpoints.iter().skip(keep) {
            match self.store().delete(checkpoint.id) {
                Ok(true) => deleted += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(project = %project_path, id = checkpoint.id, error = %e, "Checkpoint cleanup failed");
                    break;
                }
            }
        }

        if deleted > 0 {
            info!(project = %project_path, deleted, remaining = keep, "Cleaned up old checkpoints");
        }
        deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        IssueContext, NewCheckpoint, Project, SessionState, Task, TaskList, TaskStatus,
    };
    use crate::storage::traits::{CheckpointBackend, ContextStore, ProjectRegistry};
    use crate::storage::{SharedStorage, SqliteStorage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PATH: &str = "/work/app";

    /// Delegates to SQLite and counts context writes.
    struct SpyStore {
        inner: SharedStorage,
        saves: AtomicUsize,
    }

    impl SpyStore {
        fn new() -> Self {
            Self {
                inner: SharedStorage::new(SqliteStorage::open_memory().unwrap(), "test"),
                saves: AtomicUsize::new(0),
            }
        }

        fn saves(&self) -> usize {
            self.saves.load(Ordering::SeqCst)
        }
    }

    impl ContextStore for SpyStore {
        fn get_issue_context(&self, p: &str) -> Result<Option<IssueContext>> {
            self.inner.get_issue_context(p)
        }
        fn get_tasks(&self, p: &str) -> Result<Option<TaskList>> {
            self.inner.get_tasks(p)
        }
        fn get_session_state(&self, p: &str) -> Result<Option<SessionState>> {
            self.inner.get_session_state(p)
        }
        fn save_issue_context(&self, p: &str, issue: &IssueContext) -> Result<()> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            self.inner.save_issue_context(p, issue)
        }
        fn save_tasks(&self, p: &str, tasks: &TaskList) -> Result<()> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            self.inner.save_tasks(p, tasks)
        }
        fn save_session_state(&self, p: &str, session: &SessionState) -> Result<()> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            self.inner.save_session_state(p, session)
        }
    }

    impl CheckpointBackend for SpyStore {
        fn insert_checkpoint(&self, cp: &NewCheckpoint) -> Result<Checkpoint> {
            self.inner.insert_checkpoint(cp)
        }
        fn list_checkpoints(&self, p: &str) -> Result<Vec<Checkpoint>> {
            self.inner.list_checkpoints(p)
        }
        fn latest_checkpoint(&self, p: &str) -> Result<Option<Checkpoint>> {
            self.inner.latest_checkpoint(p)
        }
        fn find_checkpoint(&self, id: i64) -> Result<Option<Checkpoint>> {
            self.inner.find_checkpoint(id)
        }
        fn delete_checkpoint(&self, id: i64) -> Result<bool> {
            self.inner.delete_checkpoint(id)
        }
    }

    impl ProjectRegistry for SpyStore {
        fn find_project(&self, path: &str) -> Result<Option<Project>> {
            self.inner.find_project(path)
        }
        fn resolve_project(&self, path: &str) -> Result<Project> {
            self.inner.resolve_project(path)
        }
        fn list_projects(&self) -> Result<Vec<Project>> {
            self.inner.list_projects()
        }
        fn delete_project(&self, path: &str) -> Result<bool> {
            self.inner.delete_project(path)
        }
    }

    fn task(id: &str, status: TaskStatus) -> Task {
        Task {
            id: id.into(),
            description: format!("task {id}"),
            status,
            priority: 0,
            created_at: 0,
            completed_at: None,
        }
    }

    fn seeded() -> (CheckpointManager<SpyStore>, String) {
        let spy = SpyStore::new();
        let project = spy.inner.resolve_project(PATH).unwrap();
        spy.inner
            .save_issue_context(
                &project.id,
                &IssueContext {
                    number: 12,
                    title: "Autosave".into(),
                    requirements: vec![],
                    design_decisions: vec![],
                },
            )
            .unwrap();
        spy.inner
            .save_session_state(
                &project.id,
                &SessionState {
                    current_task: "wire the scheduler".into(),
                    branch: "feat/autosave".into(),
                    modified_files: vec!["src/lib.rs".into()],
                    last_checkpoint: None,
                },
            )
            .unwrap();
        (CheckpointManager::new(Arc::new(spy)), project.id)
    }

    #[test]
    fn test_create_fills_metadata_from_session() {
        let (manager, _) = seeded();
        let cp = manager.create_checkpoint(PATH, CheckpointMeta::default()).unwrap();

        assert_eq!(cp.branch.as_deref(), Some("feat/autosave"));
        assert_eq!(cp.last_command.as_deref(), Some("wire the scheduler"));
        assert_eq!(cp.next_action.as_deref(), Some("Continue from checkpoint"));
    }

    #[test]
    fn test_create_for_unknown_project() {
        let manager = CheckpointManager::new(Arc::new(SpyStore::new()));
        let err = manager
            .create_checkpoint("/nope", CheckpointMeta::default())
            .unwrap_err();
        assert!(matches!(err, Error::ProjectNotFound { .. }));
    }

    #[test]
    fn test_three_creates_list_newest_first() {
        let (manager, _) = seeded();
        let ids: Vec<i64> = (0..3)
            .map(|_| manager.create_checkpoint(PATH, CheckpointMeta::default()).unwrap().id)
            .collect();

        let listed: Vec<i64> = manager.list_checkpoints(PATH).unwrap().iter().map(|c| c.id).collect();
        assert_eq!(listed, vec![ids[2], ids[1], ids[0]]);
        assert_eq!(manager.latest_checkpoint(PATH).unwrap().unwrap().id, ids[2]);
    }

    #[test]
    fn test_restore_corrupt_checkpoint_writes_nothing() {
        let (manager, _) = seeded();
        let cp = manager.create_checkpoint(PATH, CheckpointMeta::default()).unwrap();

        manager
            .storage()
            .inner
            .lock()
            .unwrap()
            .conn()
            .execute(
                "UPDATE checkpoints SET snapshot_data = replace(snapshot_data, 'Autosave', 'Autosav3') WHERE id = ?1",
                [cp.id],
            )
            .unwrap();

        let err = manager.restore_checkpoint(PATH, cp.id).unwrap_err();
        assert!(matches!(err, Error::CorruptCheckpoint { .. }));
        assert_eq!(manager.storage().saves(), 0);
    }

    #[test]
    fn test_restore_leaves_absent_parts_untouched() {
        let (manager, project_id) = seeded();
        let cp = manager.create_checkpoint(PATH, CheckpointMeta::default()).unwrap();

        // Tasks did not exist at checkpoint time; add some afterwards.
        let live_tasks = TaskList::from_tasks([task("t9", TaskStatus::Pending)]);
        manager.storage().inner.save_tasks(&project_id, &live_tasks).unwrap();
        manager
            .storage()
            .inner
            .save_issue_context(
                &project_id,
                &IssueContext {
                    number: 99,
                    title: "Something else".into(),
                    requirements: vec![],
                    design_decisions: vec![],
                },
            )
            .unwrap();

        let summary = manager.restore_checkpoint(PATH, cp.id).unwrap();
        assert!(summary.issue && summary.session && !summary.tasks);
        assert_eq!(manager.storage().saves(), 2);

        let store = &manager.storage().inner;
        assert_eq!(store.get_issue_context(&project_id).unwrap().unwrap().number, 12);
        assert_eq!(store.get_tasks(&project_id).unwrap(), Some(live_tasks));
        assert_eq!(
            store.get_session_state(&project_id).unwrap().unwrap().last_checkpoint,
            Some(cp.created_at)
        );
    }

    #[test]
    fn test_restore_unknown_checkpoint() {
        let (manager, _) = seeded();
        let err = manager.restore_checkpoint(PATH, 404).unwrap_err();
        assert!(matches!(err, Error::CheckpointNotFound { .. }));
    }

    #[test]
    fn test_compare_detects_completed_count() {
        let (manager, project_id) = seeded();
        let store = &manager.storage().inner;

        store
            .save_tasks(&project_id, &TaskList::from_tasks([task("t1", TaskStatus::Pending)]))
            .unwrap();
        let first = manager.create_checkpoint(PATH, CheckpointMeta::default()).unwrap();

        store
            .save_tasks(&project_id, &TaskList::from_tasks([task("t1", TaskStatus::Completed)]))
            .unwrap();
        let second = manager.create_checkpoint(PATH, CheckpointMeta::default()).unwrap();

        let cmp = manager.compare_checkpoints(first.id, second.id).unwrap();
        assert!(!cmp.differences.issue.changed);
        let tasks = cmp.differences.tasks.differences.unwrap();
        assert_ne!(tasks.completed.count1, tasks.completed.count2);
    }

    #[test]
    fn test_delete_and_verify() {
        let (manager, _) = seeded();
        let cp = manager.create_checkpoint(PATH, CheckpointMeta::default()).unwrap();

        assert!(manager.verify_checkpoint(cp.id).unwrap().valid);
        manager.delete_checkpoint(cp.id).unwrap();
        assert!(matches!(
            manager.delete_checkpoint(cp.id),
            Err(Error::CheckpointNotFound { .. })
        ));
    }

    #[test]
    fn test_cleanup_keeps_newest() {
        let (manager, _) = seeded();
        let ids: Vec<i64> = (0..5)
            .map(|_| manager.create_auto_checkpoint(PATH, "manual").unwrap().id)
            .collect();

        assert_eq!(manager.cleanup_old_checkpoints(PATH, 2), 3);
        let left: Vec<i64> = manager.list_checkpoints(PATH).unwrap().iter().map(|c| c.id).collect();
        assert_eq!(left, vec![ids[4], ids[3]]);
        assert_eq!(manager.cleanup_old_checkpoints(PATH, 2), 0);
    }

    #[test]
    fn test_auto_checkpoint_name() {
        let (manager, _) = seeded();
        let cp = manager.create_auto_checkpoint(PATH, "task_complete").unwrap();
        assert!(cp.name.starts_with("Auto-save: task_complete - "));
    }
}
