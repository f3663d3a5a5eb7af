//! Project registry commands.
//!
//! - `devctx project init` - Register the current project
//! - `devctx project list` - List all projects
//! - `devctx project delete --force` - Delete a project and its checkpoints

use crate::cli::commands::{format_timestamp, print_json, CommandContext};
use crate::cli::ProjectCommands;
use crate::error::{Error, Result};
use crate::model::Project;
use crate::storage::traits::ProjectRegistry;
use crate::storage::SharedStorage;
use colored::Colorize;
use serde::Serialize;

#[derive(Serialize)]
struct ProjectOutput {
    id: String,
    project_path: String,
    name: String,
    created_at: String,
    updated_at: String,
}

impl From<Project> for ProjectOutput {
    fn from(p: Project) -> Self {
        Self {
            id: p.id,
            project_path: p.project_path,
            name: p.name,
            created_at: format_timestamp(p.created_at),
            updated_at: format_timestamp(p.updated_at),
        }
    }
}

#[derive(Serialize)]
struct ProjectListOutput {
    projects: Vec<ProjectOutput>,
    count: usize,
}

#[derive(Serialize)]
struct DeleteOutput {
    project_path: String,
    deleted: bool,
}

/// Execute a project command.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or the operation fails.
pub fn execute(command: &ProjectCommands, ctx: &CommandContext<'_>) -> Result<()> {
    match command {
        ProjectCommands::Init => init(ctx),
        ProjectCommands::List => {
            let storage = ctx.open_storage()?;
            list(&storage, ctx.json)
        }
        ProjectCommands::Delete { force } => delete(ctx, *force),
    }
}

fn init(ctx: &CommandContext<'_>) -> Result<()> {
    let storage = ctx.open_or_create_storage()?;
    let project_path = ctx.project_path()?;

    let existed = storage.find_project(&project_path)?.is_some();
    let project = storage.resolve_project(&project_path)?;

    if ctx.json {
        return print_json(&ProjectOutput::from(project));
    }

    if existed {
        println!("Project already registered");
    } else {
        println!("{} {}", "Registered project".green(), project.name.bold());
    }
    println!("  ID:   {}", project.id);
    println!("  Path: {}", project.project_path);
    Ok(())
}

fn list(storage: &SharedStorage, json: bool) -> Result<()> {
    let projects = storage.list_projects()?;

    if json {
        let output = ProjectListOutput {
            count: projects.len(),
            projects: projects.into_iter().map(ProjectOutput::from).collect(),
        };
        return print_json(&output);
    }

    if projects.is_empty() {
        println!("No projects found.");
        return Ok(());
    }

    println!("Projects ({}):", projects.len());
    println!();
    for p in &projects {
        println!("  {}  {}", p.name.bold(), p.project_path.dimmed());
    }
    Ok(())
}

fn delete(ctx: &CommandContext<'_>, force: bool) -> Result<()> {
    let storage = ctx.open_storage()?;
    let project_path = ctx.project_path()?;

    if !force {
        return Err(Error::InvalidArgument(
            "deleting a project removes its context and every checkpoint; pass --force"
                .to_string(),
        ));
    }

    if !storage.delete_project(&project_path)? {
        return Err(Error::ProjectNotFound { id: project_path });
    }

    if ctx.json {
        return print_json(&DeleteOutput {
            project_path,
            deleted: true,
        });
    }

    println!("Deleted project {project_path}");
    Ok(())
}
