//! Autosave commands.
//!
//! - `devctx autosave run` - Run the scheduler in the foreground until Ctrl-C
//! - `devctx autosave trigger <kind>` - Offer one event and wait for the save
//! - `devctx autosave config` - Show effective settings

use crate::autosave::{AutosaveConfig, AutosaveService, AutosaveStatus, SaveEvent, TriggerKind};
use crate::checkpoint::CheckpointManager;
use crate::cli::commands::{print_json, CommandContext};
use crate::cli::AutosaveCommands;
use crate::config::{load_settings, settings_path, Settings};
use crate::error::Result;
use crate::model::Checkpoint;
use crate::storage::traits::ProjectRegistry;
use crate::storage::SharedStorage;
use colored::Colorize;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

#[derive(Serialize)]
struct TriggerOutput {
    accepted: bool,
    kind: String,
    checkpoint: Option<Checkpoint>,
    status: Option<AutosaveStatus>,
}

#[derive(Serialize)]
struct ConfigOutput {
    path: Option<String>,
    #[serde(flatten)]
    settings: Settings,
}

/// Execute autosave commands.
///
/// # Errors
///
/// Returns an error if settings are invalid, the database is missing, or
/// the runtime cannot be built.
pub fn execute(command: &AutosaveCommands, ctx: &CommandContext<'_>) -> Result<()> {
    match command {
        AutosaveCommands::Run {
            interval,
            triggers,
        } => {
            let mut config = load_settings()?.auto_save.to_autosave_config()?;
            if let Some(minutes) = interval {
                config.interval_minutes = *minutes;
            }
            if !triggers.is_empty() {
                config.triggers = triggers
                    .iter()
                    .map(|t| t.parse::<TriggerKind>())
                    .collect::<Result<_>>()?;
            }
            config.validate()?;
            runtime()?.block_on(run(ctx, config))
        }
        AutosaveCommands::Trigger { kind } => {
            let kind: TriggerKind = kind.parse()?;
            let config = load_settings()?.auto_save.to_autosave_config()?;
            runtime()?.block_on(trigger(ctx, config, kind))
        }
        AutosaveCommands::Config => show_config(ctx.json),
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

/// Build a scheduler whose sink writes checkpoints to the database.
fn service_for(
    ctx: &CommandContext<'_>,
) -> Result<(AutosaveService, CheckpointManager<SharedStorage>, String)> {
    let storage = ctx.open_storage()?;
    let project_path = ctx.project_path()?;
    storage.resolve_project(&project_path)?;

    let manager = CheckpointManager::new(storage);
    let service = AutosaveService::new(Arc::new(manager.clone()));
    Ok((service, manager, project_path))
}

async fn run(ctx: &CommandContext<'_>, config: AutosaveConfig) -> Result<()> {
    let (service, _manager, project_path) = service_for(ctx)?;

    service.register(&project_path, config.clone())?;
    service.start()?;

    if !ctx.json {
        println!(
            "{} {} (every {} min; triggers: {})",
            "Autosave running for".green(),
            project_path.bold(),
            config.interval_minutes,
            config
                .triggers
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );
        println!("Press Ctrl-C to stop.");
    }

    tokio::signal::ctrl_c().await?;
    info!("Interrupt received");
    service.shutdown().await;

    let status = service.status(&project_path);
    if ctx.json {
        return print_json(&status);
    }
    if let Some(status) = status {
        println!(
            "Stopped. {} consecutive failure(s), {} queued.",
            status.consecutive_failures, status.queue_length
        );
    }
    Ok(())
}

async fn trigger(ctx: &CommandContext<'_>, config: AutosaveConfig, kind: TriggerKind) -> Result<()> {
    let (service, manager, project_path) = service_for(ctx)?;

    // One-shot: no timer
    let config = AutosaveConfig {
        interval_minutes: 0,
        ..config
    };
    service.register(&project_path, config)?;

    let before = manager.latest_checkpoint(&project_path)?.map(|cp| cp.id);
    let event = SaveEvent::new(kind.clone(), project_path.clone()).with_metadata("source", "cli");
    let accepted = service.trigger_save(event).await;
    service.shutdown().await;

    let checkpoint = manager
        .latest_checkpoint(&project_path)?
        .filter(|cp| Some(cp.id) != before);
    let status = service.status(&project_path);

    if ctx.json {
        return print_json(&TriggerOutput {
            accepted,
            kind: kind.to_string(),
            checkpoint,
            status,
        });
    }

    if !accepted {
        println!("Trigger '{kind}' not accepted (autosave disabled or trigger not enabled)");
        return Ok(());
    }
    match checkpoint {
        Some(cp) => println!(
            "{} {} {}",
            "Saved checkpoint".green(),
            cp.id.to_string().bold(),
            cp.name
        ),
        None => {
            let failures = status.map_or(0, |s| s.consecutive_failures);
            println!("{} after retries ({failures} consecutive failure(s))", "Save failed".red());
        }
    }
    Ok(())
}

fn show_config(json: bool) -> Result<()> {
    let settings = load_settings()?;
    let config = settings.auto_save.to_autosave_config()?;
    let path = settings_path().map(|p| p.to_string_lossy().to_string());

    if json {
        return print_json(&ConfigOutput { path, settings });
    }

    if let Some(path) = path {
        println!("Settings file: {}", path.dimmed());
    }
    println!("  enabled:     {}", config.enabled);
    println!("  interval:    {} min", config.interval_minutes);
    println!(
        "  triggers:    {}",
        config
            .triggers
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("  max retries: {}", config.max_retries);
    println!("  retry delay: {} ms", config.retry_delay_ms);
    Ok(())
}
