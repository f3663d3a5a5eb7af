//! SQLite storage implementation.
//!
//! This module provides the main storage backend for devctx using SQLite.
//! It follows the MutationContext pattern for transaction discipline and audit logging.

use crate::error::{Error, Result};
use crate::model::{
    Checkpoint, IssueContext, NewCheckpoint, Project, SessionState, Task, TaskList,
};
use crate::storage::events::{insert_event, Event, EventType};
use crate::storage::schema::apply_schema;
use rusqlite::{Connection, OptionalExtension, Row, Transaction};
use std::path::Path;
use std::time::Duration;

const CHECKPOINT_COLUMNS: &str = "id, project_id, name, branch_name, last_command, next_action,
     snapshot_data, checksum, created_at";

/// SQLite-based storage backend.
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Connection,
}

/// Context for a mutation operation, tracking side effects.
///
/// Passed to mutation closures to record audit events that are written
/// in the same transaction as the mutation itself.
pub struct MutationContext {
    /// Name of the operation being performed.
    pub op_name: String,
    /// Actor performing the operation (agent ID, user, autosave, etc.).
    pub actor: String,
    /// Events to write at the end of the transaction.
    pub events: Vec<Event>,
}

impl MutationContext {
    /// Create a new mutation context.
    #[must_use]
    pub fn new(op_name: &str, actor: &str) -> Self {
        Self {
            op_name: op_name.to_string(),
            actor: actor.to_string(),
            events: Vec::new(),
        }
    }

    /// Record an event for this operation.
    pub fn record_event(&mut self, entity_type: &str, entity_id: &str, event_type: EventType) {
        self.events
            .push(Event::new(entity_type, entity_id, event_type, &self.actor));
    }

    /// Record an event with a free-form comment.
    pub fn record_comment(
        &mut self,
        entity_type: &str,
        entity_id: &str,
        event_type: EventType,
        comment: &str,
    ) {
        self.events.push(
            Event::new(entity_type, entity_id, event_type, &self.actor).with_comment(comment),
        );
    }
}

impl SqliteStorage {
    /// Open a database at the given path.
    ///
    /// Creates the database and applies schema if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a database with an optional busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open_with_timeout(path: &Path, timeout_ms: Option<u64>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        if let Some(timeout) = timeout_ms {
            conn.busy_timeout(Duration::from_millis(timeout))?;
        } else {
            // Default 5 second timeout
            conn.busy_timeout(Duration::from_secs(5))?;
        }

        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Get a reference to the underlying connection (for read operations).
    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Execute a mutation with the transaction protocol.
    ///
    /// This method:
    /// 1. Begins an IMMEDIATE transaction (for write locking)
    /// 2. Executes the mutation closure
    /// 3. Writes audit events
    /// 4. Commits (or rolls back on error)
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails. The transaction is rolled back on error.
    pub fn mutate<F, R>(&mut self, op: &str, actor: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction, &mut MutationContext) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let mut ctx = MutationContext::new(op, actor);

        let result = f(&tx, &mut ctx)?;

        for event in &ctx.events {
            insert_event(&tx, event)?;
        }

        tx.commit()?;

        Ok(result)
    }

    // ==================
    // Project Operations
    // ==================

    /// Insert a project record.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails (including a duplicate path).
    pub fn create_project(&mut self, project: &Project, actor: &str) -> Result<()> {
        self.mutate("create_project", actor, |tx, ctx| {
            tx.execute(
                "INSERT INTO projects (id, project_path, name, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    project.id,
                    project.project_path,
                    project.name,
                    project.created_at,
                    project.updated_at
                ],
            )?;

            ctx.record_event("project", &project.id, EventType::ProjectCreated);
            Ok(())
        })
    }

    /// Look up a project by its directory path.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_project_by_path(&self, project_path: &str) -> Result<Option<Project>> {
        self.conn
            .query_row(
                "SELECT id, project_path, name, created_at, updated_at
                 FROM projects WHERE project_path = ?1",
                [project_path],
                map_project,
            )
            .optional()
            .map_err(Error::from)
    }

    /// List all projects, most recently touched first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, project_path, name, created_at, updated_at
             FROM projects ORDER BY updated_at DESC",
        )?;
        let rows = stmt.query_map([], map_project)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    /// Bump a project's `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn touch_project(&mut self, project_id: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        self.conn.execute(
            "UPDATE projects SET updated_at = ?1 WHERE id = ?2",
            rusqlite::params![now, project_id],
        )?;
        Ok(())
    }

    /// Delete a project. Context rows and checkpoints go with it (FK cascade).
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn delete_project(&mut self, project_id: &str, actor: &str) -> Result<bool> {
        self.mutate("delete_project", actor, |tx, ctx| {
            let rows = tx.execute("DELETE FROM projects WHERE id = ?1", [project_id])?;
            if rows > 0 {
                ctx.record_event("project", project_id, EventType::ProjectDeleted);
            }
            Ok(rows > 0)
        })
    }

    // ==================
    // Context Operations
    // ==================

    /// Get the issue context for a project.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or stored JSON is malformed.
    pub fn get_issue_context(&self, project_id: &str) -> Result<Option<IssueContext>> {
        let row = self
            .conn
            .query_row(
                "SELECT issue_number, title, requirements, design_decisions
                 FROM issue_context WHERE project_id = ?1",
                [project_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(number, title, requirements, design_decisions)| -> Result<IssueContext> {
            Ok(IssueContext {
                number,
                title,
                requirements: serde_json::from_str(&requirements)?,
                design_decisions: serde_json::from_str(&design_decisions)?,
            })
        })
        .transpose()
    }

    /// Replace the issue context for a project.
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub fn save_issue_context(
        &mut self,
        project_id: &str,
        issue: &IssueContext,
        actor: &str,
    ) -> Result<()> {
        let requirements = serde_json::to_string(&issue.requirements)?;
        let design_decisions = serde_json::to_string(&issue.design_decisions)?;
        let now = chrono::Utc::now().timestamp_millis();

        self.mutate("save_issue_context", actor, |tx, ctx| {
            tx.execute(
                "INSERT INTO issue_context (project_id, issue_number, title, requirements, design_decisions, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(project_id) DO UPDATE SET
                   issue_number = excluded.issue_number,
                   title = excluded.title,
                   requirements = excluded.requirements,
                   design_decisions = excluded.design_decisions,
                   updated_at = excluded.updated_at",
                rusqlite::params![
                    project_id,
                    issue.number,
                    issue.title,
                    requirements,
                    design_decisions,
                    now
                ],
            )?;

            ctx.record_event("project", project_id, EventType::IssueSaved);
            Ok(())
        })
    }

    /// Get the task list for a project.
    ///
    /// Returns `None` when the project has no task rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a stored status is unknown.
    pub fn get_tasks(&self, project_id: &str) -> Result<Option<TaskList>> {
        let mut stmt = self.conn.prepare(
            "SELECT task_id, description, status, priority, created_at, completed_at
             FROM tasks WHERE project_id = ?1
             ORDER BY position",
        )?;

        let rows = stmt.query_map([project_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i32>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, Option<i64>>(5)?,
            ))
        })?;

        let mut tasks = Vec::new();
        for row in rows {
            let (id, description, status, priority, created_at, completed_at) = row?;
            tasks.push(Task {
                id,
                description,
                status: status.parse()?,
                priority,
                created_at,
                completed_at,
            });
        }

        if tasks.is_empty() {
            return Ok(None);
        }
        Ok(Some(TaskList::from_tasks(tasks)))
    }

    /// Replace every task of a project.
    ///
    /// # Errors
    ///
    /// Returns an error if any insert fails; nothing is changed in that case.
    pub fn save_tasks(&mut self, project_id: &str, tasks: &TaskList, actor: &str) -> Result<()> {
        self.mutate("save_tasks", actor, |tx, ctx| {
            tx.execute("DELETE FROM tasks WHERE project_id = ?1", [project_id])?;

            for (position, task) in tasks.all_tasks().into_iter().enumerate() {
                tx.execute(
                    "INSERT INTO tasks (project_id, task_id, position, description, status, priority, created_at, completed_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    rusqlite::params![
                        project_id,
                        task.id,
                        i64::try_from(position).unwrap_or(i64::MAX),
                        task.description,
                        task.status.as_str(),
                        task.priority,
                        task.created_at,
                        task.completed_at,
                    ],
                )?;
            }

            ctx.record_event("project", project_id, EventType::TasksSaved);
            Ok(())
        })
    }

    /// Get the session state for a project.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or stored JSON is malformed.
    pub fn get_session_state(&self, project_id: &str) -> Result<Option<SessionState>> {
        let row = self
            .conn
            .query_row(
                "SELECT current_task, branch, modified_files, last_checkpoint
                 FROM session_state WHERE project_id = ?1",
                [project_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<i64>>(3)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(current_task, branch, modified_files, last_checkpoint)| -> Result<SessionState> {
            Ok(SessionState {
                current_task,
                branch,
                modified_files: serde_json::from_str(&modified_files)?,
                last_checkpoint,
            })
        })
        .transpose()
    }

    /// Replace the session state for a project.
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub fn save_session_state(
        &mut self,
        project_id: &str,
        session: &SessionState,
        actor: &str,
    ) -> Result<()> {
        let modified_files = serde_json::to_string(&session.modified_files)?;
        let now = chrono::Utc::now().timestamp_millis();

        self.mutate("save_session_state", actor, |tx, ctx| {
            tx.execute(
                "INSERT INTO session_state (project_id, current_task, branch, modified_files, last_checkpoint, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(project_id) DO UPDATE SET
                   current_task = excluded.current_task,
                   branch = excluded.branch,
                   modified_files = excluded.modified_files,
                   last_checkpoint = excluded.last_checkpoint,
                   updated_at = excluded.updated_at",
                rusqlite::params![
                    project_id,
                    session.current_task,
                    session.branch,
                    modified_files,
                    session.last_checkpoint,
                    now
                ],
            )?;

            ctx.record_event("project", project_id, EventType::SessionSaved);
            Ok(())
        })
    }

    // ======================
    // Checkpoint Operations
    // ======================

    /// Insert a checkpoint and return the stored row.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails. Nothing is written in that case.
    pub fn insert_checkpoint(&mut self, new: &NewCheckpoint, actor: &str) -> Result<Checkpoint> {
        self.mutate("create_checkpoint", actor, |tx, ctx| {
            tx.execute(
                "INSERT INTO checkpoints (project_id, name, branch_name, last_command, next_action, snapshot_data, checksum, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    new.project_id,
                    new.name,
                    new.branch,
                    new.last_command,
                    new.next_action,
                    new.snapshot_data,
                    new.checksum,
                    new.created_at,
                ],
            )?;
            let id = tx.last_insert_rowid();

            ctx.record_comment("checkpoint", &id.to_string(), EventType::CheckpointCreated, &new.name);

            Ok(Checkpoint {
                id,
                project_id: new.project_id.clone(),
                name: new.name.clone(),
                branch: new.branch.clone(),
                last_command: new.last_command.clone(),
                next_action: new.next_action.clone(),
                snapshot_data: new.snapshot_data.clone(),
                checksum: new.checksum.clone(),
                created_at: new.created_at,
            })
        })
    }

    /// List checkpoints for a project, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_checkpoints(&self, project_id: &str) -> Result<Vec<Checkpoint>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CHECKPOINT_COLUMNS} FROM checkpoints
             WHERE project_id = ?1
             ORDER BY created_at DESC, id DESC"
        ))?;

        let rows = stmt.query_map([project_id], map_checkpoint)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    /// Get the newest checkpoint for a project.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn latest_checkpoint(&self, project_id: &str) -> Result<Option<Checkpoint>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {CHECKPOINT_COLUMNS} FROM checkpoints
                     WHERE project_id = ?1
                     ORDER BY created_at DESC, id DESC
                     LIMIT 1"
                ),
                [project_id],
                map_checkpoint,
            )
            .optional()
            .map_err(Error::from)
    }

    /// Get a checkpoint by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_checkpoint(&self, id: i64) -> Result<Option<Checkpoint>> {
        self.conn
            .query_row(
                &format!("SELECT {CHECKPOINT_COLUMNS} FROM checkpoints WHERE id = ?1"),
                [id],
                map_checkpoint,
            )
            .optional()
            .map_err(Error::from)
    }

    /// Delete a checkpoint. Returns whether a row was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn delete_checkpoint(&mut self, id: i64, actor: &str) -> Result<bool> {
        self.mutate("delete_checkpoint", actor, |tx, ctx| {
            let rows = tx.execute("DELETE FROM checkpoints WHERE id = ?1", [id])?;
            if rows > 0 {
                ctx.record_event("checkpoint", &id.to_string(), EventType::CheckpointDeleted);
            }
            Ok(rows > 0)
        })
    }

    /// Record that a checkpoint was restored (audit only).
    ///
    /// # Errors
    ///
    /// Returns an error if the event insert fails.
    pub fn record_restore(&mut self, id: i64, actor: &str) -> Result<()> {
        self.mutate("restore_checkpoint", actor, |_tx, ctx| {
            ctx.record_event("checkpoint", &id.to_string(), EventType::CheckpointRestored);
            Ok(())
        })
    }
}

fn map_project(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        project_path: row.get(1)?,
        name: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn map_checkpoint(row: &Row<'_>) -> rusqlite::Result<Checkpoint> {
    Ok(Checkpoint {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        branch: row.get(3)?,
        last_command: row.get(4)?,
        next_action: row.get(5)?,
        snapshot_data: row.get(6)?,
        checksum: row.get(7)?,
        created_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TaskStatus;

    fn storage_with_project() -> (SqliteStorage, Project) {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let project = Project::new("/test/project".into(), "project".into());
        storage.create_project(&project, "test").unwrap();
        (storage, project)
    }

    fn new_checkpoint(project_id: &str, name: &str, created_at: i64) -> NewCheckpoint {
        NewCheckpoint {
            project_id: project_id.to_string(),
            name: name.to_string(),
            branch: Some("main".into()),
            last_command: None,
            next_action: None,
            snapshot_data: "{}".into(),
            checksum: "abc".into(),
            created_at,
        }
    }

    #[test]
    fn test_open_memory() {
        let storage = SqliteStorage::open_memory();
        assert!(storage.is_ok());
    }

    #[test]
    fn test_project_lookup_by_path() {
        let (storage, project) = storage_with_project();

        let found = storage.get_project_by_path("/test/project").unwrap();
        assert_eq!(found, Some(project));
        assert!(storage.get_project_by_path("/other").unwrap().is_none());
    }

    #[test]
    fn test_context_absent_until_saved() {
        let (storage, project) = storage_with_project();

        assert!(storage.get_issue_context(&project.id).unwrap().is_none());
        assert!(storage.get_tasks(&project.id).unwrap().is_none());
        assert!(storage.get_session_state(&project.id).unwrap().is_none());
    }

    #[test]
    fn test_issue_context_full_replace() {
        let (mut storage, project) = storage_with_project();

        let first = IssueContext {
            number: 1,
            title: "First".into(),
            requirements: vec!["a".into(), "b".into()],
            design_decisions: vec![],
        };
        storage.save_issue_context(&project.id, &first, "t").unwrap();

        let second = IssueContext {
            number: 2,
            title: "Second".into(),
            requirements: vec!["c".into()],
            design_decisions: vec!["use sqlite".into()],
        };
        storage.save_issue_context(&project.id, &second, "t").unwrap();

        assert_eq!(storage.get_issue_context(&project.id).unwrap(), Some(second));
    }

    #[test]
    fn test_tasks_replace_and_group() {
        let (mut storage, project) = storage_with_project();

        let task = |id: &str, status| Task {
            id: id.into(),
            description: id.into(),
            status,
            priority: 1,
            created_at: 10,
            completed_at: None,
        };
        let list = TaskList {
            completed: vec![task("t1", TaskStatus::Completed)],
            in_progress: Some(task("t2", TaskStatus::InProgress)),
            pending: vec![task("t3", TaskStatus::Pending), task("t4", TaskStatus::Pending)],
        };
        storage.save_tasks(&project.id, &list, "t").unwrap();
        assert_eq!(storage.get_tasks(&project.id).unwrap(), Some(list));

        let shorter = TaskList {
            completed: vec![],
            in_progress: None,
            pending: vec![task("t9", TaskStatus::Pending)],
        };
        storage.save_tasks(&project.id, &shorter, "t").unwrap();
        assert_eq!(storage.get_tasks(&project.id).unwrap(), Some(shorter));
    }

    #[test]
    fn test_session_state_round_trip() {
        let (mut storage, project) = storage_with_project();

        let session = SessionState {
            current_task: "wire up scheduler".into(),
            branch: "feature/autosave".into(),
            modified_files: vec!["src/lib.rs".into()],
            last_checkpoint: Some(1_700_000_000_000),
        };
        storage.save_session_state(&project.id, &session, "t").unwrap();
        assert_eq!(storage.get_session_state(&project.id).unwrap(), Some(session));
    }

    #[test]
    fn test_checkpoints_newest_first_with_tie_break() {
        let (mut storage, project) = storage_with_project();

        let a = storage.insert_checkpoint(&new_checkpoint(&project.id, "a", 100), "t").unwrap();
        let b = storage.insert_checkpoint(&new_checkpoint(&project.id, "b", 200), "t").unwrap();
        let c = storage.insert_checkpoint(&new_checkpoint(&project.id, "c", 200), "t").unwrap();

        let ids: Vec<i64> = storage
            .list_checkpoints(&project.id)
            .unwrap()
            .iter()
            .map(|cp| cp.id)
            .collect();
        assert_eq!(ids, vec![c.id, b.id, a.id]);
        assert_eq!(storage.latest_checkpoint(&project.id).unwrap().unwrap().id, c.id);
    }

    #[test]
    fn test_delete_checkpoint_reports_removal() {
        let (mut storage, project) = storage_with_project();
        let cp = storage.insert_checkpoint(&new_checkpoint(&project.id, "x", 1), "t").unwrap();

        assert!(storage.delete_checkpoint(cp.id, "t").unwrap());
        assert!(!storage.delete_checkpoint(cp.id, "t").unwrap());
        assert!(storage.get_checkpoint(cp.id).unwrap().is_none());
    }

    #[test]
    fn test_delete_project_cascades() {
        let (mut storage, project) = storage_with_project();
        storage.insert_checkpoint(&new_checkpoint(&project.id, "x", 1), "t").unwrap();
        storage
            .save_session_state(
                &project.id,
                &SessionState {
                    current_task: "x".into(),
                    branch: "main".into(),
                    modified_files: vec![],
                    last_checkpoint: None,
                },
                "t",
            )
            .unwrap();

        assert!(storage.delete_project(&project.id, "t").unwrap());
        assert!(storage.list_checkpoints(&project.id).unwrap().is_empty());
        assert!(storage.get_session_state(&project.id).unwrap().is_none());
    }
}
