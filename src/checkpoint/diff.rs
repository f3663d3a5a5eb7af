//! Structured differences between two checkpoints.
//!
//! Pure computation over already-parsed payloads. List fields are compared
//! as sets by value; each reported element keeps the order of the side it
//! came from.

use crate::checkpoint::snapshot::SnapshotPayload;
use crate::model::{Checkpoint, IssueContext, SessionState, TaskList};
use serde::Serialize;
use std::collections::HashSet;

/// Identifying fields of one compared checkpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CheckpointSummary {
    pub id: i64,
    pub name: String,
    pub created_at: i64,
    pub branch: Option<String>,
}

impl From<&Checkpoint> for CheckpointSummary {
    fn from(cp: &Checkpoint) -> Self {
        Self {
            id: cp.id,
            name: cp.name.clone(),
            created_at: cp.created_at,
            branch: cp.branch.clone(),
        }
    }
}

/// Full comparison result.
#[derive(Debug, Clone, Serialize)]
pub struct CheckpointComparison {
    pub checkpoint1: CheckpointSummary,
    pub checkpoint2: CheckpointSummary,
    pub differences: PayloadDiff,
}

#[derive(Debug, Clone, Serialize)]
pub struct PayloadDiff {
    pub issue: PartDiff<IssueDifferences>,
    pub tasks: PartDiff<TaskDifferences>,
    pub session: PartDiff<SessionDifferences>,
}

/// Diff of one context part.
///
/// `added` means the part exists only in the second checkpoint, `removed`
/// only in the first. `differences` is present when both exist and differ.
#[derive(Debug, Clone, Serialize)]
pub struct PartDiff<D> {
    pub changed: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub added: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub removed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub differences: Option<D>,
}

impl<D> PartDiff<D> {
    fn unchanged() -> Self {
        Self {
            changed: false,
            added: false,
            removed: false,
            differences: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ListDelta {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CountDelta {
    pub count1: usize,
    pub count2: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InProgressDelta {
    pub task1: Option<String>,
    pub task2: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssueDifferences {
    pub number: bool,
    pub title: bool,
    pub requirements: ListDelta,
    pub design_decisions: ListDelta,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskDifferences {
    pub completed: CountDelta,
    pub in_progress: InProgressDelta,
    pub pending: CountDelta,
    pub added_tasks: Vec<String>,
    pub removed_tasks: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionDifferences {
    pub current_task: bool,
    pub branch: bool,
    pub modified_files: ListDelta,
}

/// Compare two checkpoints whose payloads have already been parsed.
#[must_use]
pub fn compare(
    first: &Checkpoint,
    first_payload: &SnapshotPayload,
    second: &Checkpoint,
    second_payload: &SnapshotPayload,
) -> CheckpointComparison {
    CheckpointComparison {
        checkpoint1: first.into(),
        checkpoint2: second.into(),
        differences: diff_payloads(first_payload, second_payload),
    }
}

#[must_use]
pub fn diff_payloads(a: &SnapshotPayload, b: &SnapshotPayload) -> PayloadDiff {
    PayloadDiff {
        issue: diff_part(a.issue.as_ref(), b.issue.as_ref(), diff_issue),
        tasks: diff_part(a.tasks.as_ref(), b.tasks.as_ref(), diff_tasks),
        session: diff_part(a.session.as_ref(), b.session.as_ref(), diff_session),
    }
}

fn diff_part<T, D>(a: Option<&T>, b: Option<&T>, fields: impl FnOnce(&T, &T) -> D) -> PartDiff<D>
where
    T: PartialEq,
{
    match (a, b) {
        (None, None) => PartDiff::unchanged(),
        (a, b @ None) | (a @ None, b) => PartDiff {
            changed: true,
            added: a.is_none(),
            removed: b.is_none(),
            differences: None,
        },
        (Some(a), Some(b)) if a == b => PartDiff::unchanged(),
        (Some(a), Some(b)) => PartDiff {
            changed: true,
            added: false,
            removed: false,
            differences: Some(fields(a, b)),
        },
    }
}

fn diff_issue(a: &IssueContext, b: &IssueContext) -> IssueDifferences {
    IssueDifferences {
        number: a.number != b.number,
        title: a.title != b.title,
        requirements: list_delta(&a.requirements, &b.requirements),
        design_decisions: list_delta(&a.design_decisions, &b.design_decisions),
    }
}

fn diff_tasks(a: &TaskList, b: &TaskList) -> TaskDifferences {
    let ids = list_delta(&a.task_ids(), &b.task_ids());

    TaskDifferences {
        completed: CountDelta {
            count1: a.completed.len(),
            count2: b.completed.len(),
        },
        in_progress: InProgressDelta {
            task1: a.in_progress.as_ref().map(|t| t.description.clone()),
            task2: b.in_progress.as_ref().map(|t| t.description.clone()),
        },
        pending: CountDelta {
            count1: a.pending.len(),
            count2: b.pending.len(),
        },
        added_tasks: ids.added,
        removed_tasks: ids.removed,
    }
}

fn diff_session(a: &SessionState, b: &SessionState) -> SessionDifferences {
    SessionDifferences {
        current_task: a.current_task != b.current_task,
        branch: a.branch != b.branch,
        modified_files: list_delta(&a.modified_files, &b.modified_files),
    }
}

fn list_delta(before: &[String], after: &[String]) -> ListDelta {
    let before_set: HashSet<&str> = before.iter().map(String::as_str).collect();
    let after_set: HashSet<&str> = after.iter().map(String::as_str).collect();

    ListDelta {
        added: after
            .iter()
            .filter(|s| !before_set.contains(s.as_str()))
            .cloned()
            .collect(),
        removed: before
            .iter()
            .filter(|s| !after_set.contains(s.as_str()))
            .cloned()
            .collect(),
    }
}
