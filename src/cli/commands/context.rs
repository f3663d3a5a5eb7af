//! Working context commands.
//!
//! Each part is shown when called bare and replaced wholesale with `--set`:
//! - `devctx context issue --set '{"number":42,"title":"..."}'`
//! - `devctx context tasks --set '[{"id":"t1",...}]'`
//! - `devctx context session --set '{"current_task":"...","branch":"main"}'`

use crate::cli::commands::{print_json, CommandContext};
use crate::cli::ContextCommands;
use crate::error::{Error, Result};
use crate::model::{IssueContext, SessionState, Task, TaskList};
use crate::storage::traits::{ContextStore, ProjectRegistry};
use crate::storage::SharedStorage;
use colored::Colorize;
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct ContextOutput {
    project_path: String,
    issue: Option<IssueContext>,
    tasks: Option<TaskList>,
    session: Option<SessionState>,
}

/// `--set` for tasks accepts either shape.
#[derive(Deserialize)]
#[serde(untagged)]
enum TasksInput {
    Grouped(TaskList),
    Flat(Vec<Task>),
}

impl From<TasksInput> for TaskList {
    fn from(input: TasksInput) -> Self {
        match input {
            TasksInput::Grouped(list) => list,
            TasksInput::Flat(tasks) => TaskList::from_tasks(tasks),
        }
    }
}

/// Execute context commands.
///
/// # Errors
///
/// Returns an error if the database is missing, the JSON is invalid, or a
/// store operation fails.
pub fn execute(command: &ContextCommands, ctx: &CommandContext<'_>) -> Result<()> {
    let storage = ctx.open_storage()?;
    let project_path = ctx.project_path()?;

    match command {
        ContextCommands::Show => show(&storage, &project_path, ctx.json),
        ContextCommands::Issue { set: Some(raw) } => {
            let issue: IssueContext = parse_json("issue", raw)?;
            let project = storage.resolve_project(&project_path)?;
            storage.save_issue_context(&project.id, &issue)?;
            report_saved("issue", ctx.json, &issue)
        }
        ContextCommands::Tasks { set: Some(raw) } => {
            let tasks: TaskList = parse_json::<TasksInput>("tasks", raw)?.into();
            let project = storage.resolve_project(&project_path)?;
            storage.save_tasks(&project.id, &tasks)?;
            report_saved("tasks", ctx.json, &tasks)
        }
        ContextCommands::Session { set: Some(raw) } => {
            let session: SessionState = parse_json("session", raw)?;
            let project = storage.resolve_project(&project_path)?;
            storage.save_session_state(&project.id, &session)?;
            report_saved("session", ctx.json, &session)
        }
        ContextCommands::Issue { set: None }
        | ContextCommands::Tasks { set: None }
        | ContextCommands::Session { set: None } => {
            let context = load(&storage, &project_path)?;
            let part = match command {
                ContextCommands::Issue { .. } => serde_json::to_value(&context.issue)?,
                ContextCommands::Tasks { .. } => serde_json::to_value(&context.tasks)?,
                _ => serde_json::to_value(&context.session)?,
            };
            if ctx.json {
                print_json(&part)
            } else {
                println!("{}", serde_json::to_string_pretty(&part)?);
                Ok(())
            }
        }
    }
}

fn parse_json<T: for<'de> Deserialize<'de>>(part: &str, raw: &str) -> Result<T> {
    serde_json::from_str(raw)
        .map_err(|e| Error::InvalidArgument(format!("invalid {part} JSON: {e}")))
}

fn report_saved<T: Serialize>(part: &str, json: bool, value: &T) -> Result<()> {
    if json {
        return print_json(value);
    }
    println!("{} {part}", "Saved".green());
    Ok(())
}

fn load(storage: &SharedStorage, project_path: &str) -> Result<ContextOutput> {
    let project = storage
        .find_project(project_path)?
        .ok_or_else(|| Error::ProjectNotFound {
            id: project_path.to_string(),
        })?;

    Ok(ContextOutput {
        project_path: project.project_path,
        issue: storage.get_issue_context(&project.id)?,
        tasks: storage.get_tasks(&project.id)?,
        session: storage.get_session_state(&project.id)?,
    })
}

fn show(storage: &SharedStorage, project_path: &str, json: bool) -> Result<()> {
    let context = load(storage, project_path)?;

    if json {
        return print_json(&context);
    }

    println!("{}", context.project_path.bold());
    println!();

    println!("{}", "Issue".cyan().bold());
    match &context.issue {
        Some(issue) => {
            println!("  #{} {}", issue.number, issue.title);
            for req in &issue.requirements {
                println!("  - {req}");
            }
        }
        None => println!("  {}", "(none)".dimmed()),
    }

    println!("{}", "Tasks".cyan().bold());
    match &context.tasks {
        Some(tasks) if !tasks.is_empty() => {
            for task in &tasks.completed {
                println!("  {} {}", "✓".green(), task.description);
            }
            if let Some(task) = &tasks.in_progress {
                println!("  {} {}", "▶".yellow(), task.description);
            }
            for task in &tasks.pending {
                println!("  {} {}", "○".dimmed(), task.description);
            }
        }
        _ => println!("  {}", "(none)".dimmed()),
    }

    println!("{}", "Session".cyan().bold());
    match &context.session {
        Some(session) => {
            println!("  {} on {}", session.current_task, session.branch);
            if !session.modified_files.is_empty() {
                println!("  Modified: {}", session.modified_files.join(", "));
            }
        }
        None => println!("  {}", "(none)".dimmed()),
    }
    Ok(())
}
