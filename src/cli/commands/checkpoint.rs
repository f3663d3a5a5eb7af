//! Checkpoint command implementations.

use crate::checkpoint::diff::{ListDelta, PartDiff};
use crate::checkpoint::{CheckpointComparison, CheckpointManager, CheckpointMeta, SnapshotPayload};
use crate::cli::commands::{format_timestamp, print_json, CommandContext};
use crate::cli::CheckpointCommands;
use crate::error::Result;
use crate::model::Checkpoint;
use crate::storage::events::get_events;
use crate::storage::SharedStorage;
use colored::Colorize;
use serde::Serialize;

/// Output for checkpoint list.
#[derive(Serialize)]
struct CheckpointListOutput {
    checkpoints: Vec<CheckpointInfo>,
    count: usize,
}

#[derive(Serialize)]
struct CheckpointInfo {
    id: i64,
    name: String,
    branch: Option<String>,
    last_command: Option<String>,
    next_action: Option<String>,
    checksum: String,
    created_at: i64,
}

impl From<&Checkpoint> for CheckpointInfo {
    fn from(cp: &Checkpoint) -> Self {
        Self {
            id: cp.id,
            name: cp.name.clone(),
            branch: cp.branch.clone(),
            last_command: cp.last_command.clone(),
            next_action: cp.next_action.clone(),
            checksum: cp.checksum.clone(),
            created_at: cp.created_at,
        }
    }
}

/// Output for checkpoint show.
#[derive(Serialize)]
struct CheckpointShowOutput {
    #[serde(flatten)]
    checkpoint: CheckpointInfo,
    payload: Option<SnapshotPayload>,
    history: Vec<HistoryEntry>,
}

/// One audit event touching a checkpoint.
#[derive(Serialize)]
struct HistoryEntry {
    event: &'static str,
    actor: String,
    created_at: i64,
}

#[derive(Serialize)]
struct CleanupOutput {
    deleted: usize,
    kept: usize,
}

#[derive(Serialize)]
struct DeleteOutput {
    id: i64,
    deleted: bool,
}

/// Execute checkpoint commands.
///
/// # Errors
///
/// Returns an error if the database is missing or the operation fails.
pub fn execute(command: &CheckpointCommands, ctx: &CommandContext<'_>) -> Result<()> {
    let manager = CheckpointManager::new(ctx.open_storage()?);
    let project_path = ctx.project_path()?;

    match command {
        CheckpointCommands::Create {
            name,
            branch,
            last_command,
            next_action,
        } => {
            let meta = CheckpointMeta {
                name: name.clone(),
                branch: branch.clone(),
                last_command: last_command.clone(),
                next_action: next_action.clone(),
            };
            create(&manager, &project_path, meta, ctx.json)
        }
        CheckpointCommands::List { limit } => list(&manager, &project_path, *limit, ctx.json),
        CheckpointCommands::Show { id } => show(&manager, *id, ctx.json),
        CheckpointCommands::Restore { id } => restore(&manager, &project_path, *id, ctx.json),
        CheckpointCommands::Delete { id } => delete(&manager, *id, ctx.json),
        CheckpointCommands::Compare { first, second } => {
            compare(&manager, *first, *second, ctx.json)
        }
        CheckpointCommands::Verify { id } => verify(&manager, *id, ctx.json),
        CheckpointCommands::Cleanup { keep } => cleanup(&manager, &project_path, *keep, ctx.json),
    }
}

fn create(
    manager: &CheckpointManager<SharedStorage>,
    project_path: &str,
    meta: CheckpointMeta,
    json: bool,
) -> Result<()> {
    let checkpoint = manager.create_checkpoint(project_path, meta)?;

    if json {
        return print_json(&CheckpointInfo::from(&checkpoint));
    }

    println!(
        "{} {} {}",
        "Created checkpoint".green(),
        checkpoint.id.to_string().bold(),
        checkpoint.name
    );
    if let Some(branch) = &checkpoint.branch {
        println!("  Branch: {branch}");
    }
    println!("  Checksum: {}", checkpoint.checksum.dimmed());
    Ok(())
}

fn list(
    manager: &CheckpointManager<SharedStorage>,
    project_path: &str,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let mut checkpoints = manager.list_checkpoints(project_path)?;
    if let Some(limit) = limit {
        checkpoints.truncate(limit);
    }

    if json {
        let output = CheckpointListOutput {
            count: checkpoints.len(),
            checkpoints: checkpoints.iter().map(CheckpointInfo::from).collect(),
        };
        return print_json(&output);
    }

    if checkpoints.is_empty() {
        println!("No checkpoints found.");
        return Ok(());
    }

    println!("Checkpoints ({}):", checkpoints.len());
    println!();
    for cp in &checkpoints {
        println!(
            "  {:>5}  {}  {}",
            cp.id.to_string().bold(),
            format_timestamp(cp.created_at).dimmed(),
            cp.name
        );
        if let Some(branch) = &cp.branch {
            println!("         Branch: {branch}");
        }
    }
    Ok(())
}

fn show(manager: &CheckpointManager<SharedStorage>, id: i64, json: bool) -> Result<()> {
    let checkpoint = manager.get_checkpoint(id)?;
    let payload = SnapshotPayload::parse(&checkpoint.snapshot_data).ok();
    let history: Vec<HistoryEntry> = {
        let storage = manager.storage().lock()?;
        get_events(storage.conn(), "checkpoint", &id.to_string(), None)?
            .into_iter()
            .map(|e| HistoryEntry {
                event: e.event_type.as_str(),
                actor: e.actor,
                created_at: e.created_at,
            })
            .collect()
    };

    if json {
        let output = CheckpointShowOutput {
            checkpoint: CheckpointInfo::from(&checkpoint),
            payload,
            history,
        };
        return print_json(&output);
    }

    println!("{} {}", checkpoint.id.to_string().bold(), checkpoint.name.bold());
    println!("  Created:  {}", format_timestamp(checkpoint.created_at));
    if let Some(branch) = &checkpoint.branch {
        println!("  Branch:   {branch}");
    }
    if let Some(last) = &checkpoint.last_command {
        println!("  Last:     {last}");
    }
    if let Some(next) = &checkpoint.next_action {
        println!("  Next:     {next}");
    }
    println!("  Checksum: {}", checkpoint.checksum.dimmed());
    for entry in &history {
        println!(
            "  {} {} by {}",
            format_timestamp(entry.created_at).dimmed(),
            entry.event,
            entry.actor
        );
    }

    let Some(payload) = payload else {
        println!("  {}", "Payload is unreadable".red());
        return Ok(());
    };

    println!();
    match &payload.issue {
        Some(issue) => println!("  Issue:    #{} {}", issue.number, issue.title),
        None => println!("  Issue:    {}", "(none)".dimmed()),
    }
    match &payload.tasks {
        Some(tasks) => {
            println!(
                "  Tasks:    {} completed, {} pending",
                tasks.completed.len(),
                tasks.pending.len()
            );
            if let Some(task) = &tasks.in_progress {
                println!("            in progress: {}", task.description);
            }
        }
        None => println!("  Tasks:    {}", "(none)".dimmed()),
    }
    match &payload.session {
        Some(session) => println!(
            "  Session:  {} on {} ({} modified files)",
            session.current_task,
            session.branch,
            session.modified_files.len()
        ),
        None => println!("  Session:  {}", "(none)".dimmed()),
    }
    Ok(())
}

fn restore(
    manager: &CheckpointManager<SharedStorage>,
    project_path: &str,
    id: i64,
    json: bool,
) -> Result<()> {
    let summary = manager.restore_checkpoint(project_path, id)?;

    if json {
        return print_json(&summary);
    }

    println!(
        "{} {} {}",
        "Restored checkpoint".green(),
        summary.checkpoint_id.to_string().bold(),
        summary.name
    );
    let restored: Vec<&str> = [
        (summary.issue, "issue"),
        (summary.tasks, "tasks"),
        (summary.session, "session"),
    ]
    .into_iter()
    .filter_map(|(present, part)| present.then_some(part))
    .collect();
    if restored.is_empty() {
        println!("  Checkpoint held no context; nothing written.");
    } else {
        println!("  Restored: {}", restored.join(", "));
    }
    Ok(())
}

fn delete(manager: &CheckpointManager<SharedStorage>, id: i64, json: bool) -> Result<()> {
    manager.delete_checkpoint(id)?;

    if json {
        return print_json(&DeleteOutput { id, deleted: true });
    }

    println!("Deleted checkpoint {id}");
    Ok(())
}

fn compare(
    manager: &CheckpointManager<SharedStorage>,
    first: i64,
    second: i64,
    json: bool,
) -> Result<()> {
    let comparison = manager.compare_checkpoints(first, second)?;

    if json {
        return print_json(&comparison);
    }

    print_comparison(&comparison);
    Ok(())
}

fn print_comparison(comparison: &CheckpointComparison) {
    let a = &comparison.checkpoint1;
    let b = &comparison.checkpoint2;
    println!("{} {} → {} {}", a.id.to_string().bold(), a.name, b.id.to_string().bold(), b.name);
    println!();

    let diff = &comparison.differences;
    print_part("Issue", &diff.issue, |d| {
        if d.number {
            println!("    number changed");
        }
        if d.title {
            println!("    title changed");
        }
        print_list_delta("requirements", &d.requirements);
        print_list_delta("design decisions", &d.design_decisions);
    });
    print_part("Tasks", &diff.tasks, |d| {
        println!("    completed: {} → {}", d.completed.count1, d.completed.count2);
        println!("    pending:   {} → {}", d.pending.count1, d.pending.count2);
        if d.in_progress.task1 != d.in_progress.task2 {
            println!(
                "    in progress: {} → {}",
                d.in_progress.task1.as_deref().unwrap_or("-"),
                d.in_progress.task2.as_deref().unwrap_or("-")
            );
        }
        for id in &d.added_tasks {
            println!("    {} {id}", "+".green());
        }
        for id in &d.removed_tasks {
            println!("    {} {id}", "-".red());
        }
    });
    print_part("Session", &diff.session, |d| {
        if d.current_task {
            println!("    current task changed");
        }
        if d.branch {
            println!("    branch changed");
        }
        print_list_delta("modified files", &d.modified_files);
    });
}

fn print_part<D>(label: &str, part: &PartDiff<D>, details: impl FnOnce(&D)) {
    if !part.changed {
        println!("  {label}: {}", "unchanged".dimmed());
        return;
    }
    if part.added {
        println!("  {label}: {}", "added".green());
    } else if part.removed {
        println!("  {label}: {}", "removed".red());
    } else {
        println!("  {label}: {}", "changed".yellow());
    }
    if let Some(d) = &part.differences {
        details(d);
    }
}

fn print_list_delta(label: &str, delta: &ListDelta) {
    for item in &delta.added {
        println!("    {} {label}: {item}", "+".green());
    }
    for item in &delta.removed {
        println!("    {} {label}: {item}", "-".red());
    }
}

fn verify(manager: &CheckpointManager<SharedStorage>, id: i64, json: bool) -> Result<()> {
    let report = manager.verify_checkpoint(id)?;

    if json {
        return print_json(&report);
    }

    if report.valid {
        println!("Checkpoint {id}: {}", "valid".green());
    } else {
        println!(
            "Checkpoint {id}: {} ({})",
            "corrupt".red().bold(),
            report.reason.as_deref().unwrap_or("unknown")
        );
    }
    Ok(())
}

fn cleanup(
    manager: &CheckpointManager<SharedStorage>,
    project_path: &str,
    keep: usize,
    json: bool,
) -> Result<()> {
    let deleted = manager.cleanup_old_checkpoints(project_path, keep);
    let kept = manager.list_checkpoints(project_path)?.len();

    if json {
        return print_json(&CleanupOutput { deleted, kept });
    }

    println!("Deleted {deleted} old checkpoint(s); {kept} kept.");
    Ok(())
}
