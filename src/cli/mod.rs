//! CLI definitions using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// devctx - Persistent working context with autosave checkpoints
#[derive(Parser, Debug)]
#[command(name = "devctx", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (default: ~/.devctx/data/devctx.db)
    #[arg(long, global = true, env = "DEVCTX_DB")]
    pub db: Option<PathBuf>,

    /// Project directory (default: git root or current directory)
    #[arg(long, global = true, env = "DEVCTX_PROJECT")]
    pub project: Option<PathBuf>,

    /// Actor name for audit trail
    #[arg(long, global = true, env = "DEVCTX_ACTOR")]
    pub actor: Option<String>,

    /// Output as JSON (for agent integration)
    #[arg(long, alias = "robot", global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print version information
    Version,

    /// Project registry
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },

    /// Show or replace the working context
    Context {
        #[command(subcommand)]
        command: ContextCommands,
    },

    /// Checkpoint management
    Checkpoint {
        #[command(subcommand)]
        command: CheckpointCommands,
    },

    /// Autosave scheduler
    Autosave {
        #[command(subcommand)]
        command: AutosaveCommands,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

// ============================================================================
// Project Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum ProjectCommands {
    /// Register the project (creates the database on first use)
    Init,

    /// List all projects
    List,

    /// Delete the project with its context and checkpoints
    Delete {
        /// Required: deletion cascades to every checkpoint
        #[arg(long)]
        force: bool,
    },
}

// ============================================================================
// Context Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum ContextCommands {
    /// Show all three context parts
    Show,

    /// Show or set the issue context
    Issue {
        /// Replace with this JSON object
        #[arg(long)]
        set: Option<String>,
    },

    /// Show or set the task list
    Tasks {
        /// Replace with this JSON (a task list object or an array of tasks)
        #[arg(long)]
        set: Option<String>,
    },

    /// Show or set the session state
    Session {
        /// Replace with this JSON object
        #[arg(long)]
        set: Option<String>,
    },
}

// ============================================================================
// Checkpoint Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum CheckpointCommands {
    /// Create a checkpoint of the current context
    Create {
        /// Checkpoint name (default: "Checkpoint <timestamp>")
        name: Option<String>,

        /// Branch to record (default: session branch)
        #[arg(long)]
        branch: Option<String>,

        /// What was being done (default: session current task)
        #[arg(long)]
        last_command: Option<String>,

        /// Suggested next step after restoring
        #[arg(long)]
        next_action: Option<String>,
    },

    /// List checkpoints, newest first
    List {
        /// Maximum checkpoints to show
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show a checkpoint and its payload
    Show {
        /// Checkpoint ID
        id: i64,
    },

    /// Restore the context saved in a checkpoint
    Restore {
        /// Checkpoint ID
        id: i64,
    },

    /// Delete a checkpoint
    Delete {
        /// Checkpoint ID
        id: i64,
    },

    /// Compare two checkpoints
    Compare {
        /// Older checkpoint ID
        first: i64,

        /// Newer checkpoint ID
        second: i64,
    },

    /// Check a checkpoint's integrity
    Verify {
        /// Checkpoint ID
        id: i64,
    },

    /// Delete all but the newest checkpoints
    Cleanup {
        /// How many to keep
        #[arg(long, default_value_t = crate::checkpoint::DEFAULT_KEEP_COUNT)]
        keep: usize,
    },
}

// ============================================================================
// Autosave Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum AutosaveCommands {
    /// Run the scheduler for this project until Ctrl-C
    Run {
        /// Minutes between interval saves (overrides config)
        #[arg(long)]
        interval: Option<u64>,

        /// Accepted trigger kinds (overrides config; repeatable)
        #[arg(long = "trigger")]
        triggers: Vec<String>,
    },

    /// Offer one event to the scheduler and wait for it to be saved
    Trigger {
        /// Trigger kind (manual, task_complete, test_pass, checkpoint, or custom)
        kind: String,
    },

    /// Show effective autosave settings
    Config,
}
