//! Working context captured by checkpoints.
//!
//! Three independent parts make up a project's context: the issue being
//! worked on, the task list, and the session state. Each may be absent.
//!
//! Field declaration order in these structs is part of the checkpoint
//! checksum format (see [`crate::checkpoint::snapshot`]). Reordering fields
//! requires bumping the snapshot format version.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The issue currently being worked on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueContext {
    pub number: i64,
    pub title: String,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub design_decisions: Vec<String>,
}

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    /// Storage string for this status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            other => Err(crate::error::Error::InvalidArgument(format!(
                "unknown task status '{other}'"
            ))),
        }
    }
}

/// A single task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: i32,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,
    /// Completion timestamp (Unix milliseconds)
    #[serde(default)]
    pub completed_at: Option<i64>,
}

/// Tasks grouped by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskList {
    #[serde(default)]
    pub completed: Vec<Task>,
    #[serde(default)]
    pub in_progress: Option<Task>,
    #[serde(default)]
    pub pending: Vec<Task>,
}

impl TaskList {
    /// Group a flat list of tasks by status.
    ///
    /// If several tasks claim `in_progress`, the first one wins and the rest
    /// are treated as pending.
    #[must_use]
    pub fn from_tasks(tasks: impl IntoIterator<Item = Task>) -> Self {
        let mut list = Self::default();
        for task in tasks {
            match task.status {
                TaskStatus::Completed => list.completed.push(task),
                TaskStatus::InProgress if list.in_progress.is_none() => {
                    list.in_progress = Some(task);
                }
                TaskStatus::InProgress | TaskStatus::Pending => list.pending.push(task),
            }
        }
        list
    }

    /// Flatten back into storage order: completed, in-progress, pending.
    #[must_use]
    pub fn all_tasks(&self) -> Vec<&Task> {
        self.completed
            .iter()
            .chain(self.in_progress.iter())
            .chain(self.pending.iter())
            .collect()
    }

    /// Ids of every task, in storage order.
    #[must_use]
    pub fn task_ids(&self) -> Vec<String> {
        self.all_tasks().into_iter().map(|t| t.id.clone()).collect()
    }

    /// True when the list holds no tasks at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.completed.is_empty() && self.in_progress.is_none() && self.pending.is_empty()
    }
}

/// Session state: what the agent was doing when the snapshot was taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub current_task: String,
    pub branch: String,
    #[serde(default)]
    pub modified_files: Vec<String>,
    /// Unix milliseconds of the last checkpoint taken in this session
    #[serde(default)]
    pub last_checkpoint: Option<i64>,
}
