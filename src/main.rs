//! devctx CLI entry point.

use clap::Parser;
use devctx::cli::commands::{self, CommandContext};
use devctx::cli::{Cli, Commands};
use devctx::error::Error;
use std::process::ExitCode;

/// Rewrite named flags to positional args for agent ergonomics.
///
/// Agents naturally generate `--id 7` instead of positional `7`. This
/// preprocessor converts known flag patterns so both forms work.
fn preprocess_args(args: impl Iterator<Item = String>) -> Vec<String> {
    // Only flags that shadow positional args; real named flags go through clap.
    const POSITIONAL_ALIASES: &[&str] = &[
        "--id",   // checkpoint show/restore/delete/verify
        "--name", // checkpoint create
        "--kind", // autosave trigger
    ];

    let mut result = Vec::new();
    let mut iter = args.peekable();

    while let Some(arg) = iter.next() {
        if POSITIONAL_ALIASES.contains(&arg.as_str()) {
            if let Some(value) = iter.next() {
                result.push(value);
            }
        } else if let Some(value) = POSITIONAL_ALIASES
            .iter()
            .find_map(|f| arg.strip_prefix(f).and_then(|rest| rest.strip_prefix('=')))
        {
            result.push(value.to_string());
        } else {
            result.push(arg);
        }
    }

    result
}

fn main() -> ExitCode {
    let args = preprocess_args(std::env::args());
    let cli = Cli::parse_from(args);

    if cli.no_color {
        colored::control::set_override(false);
    }

    init_tracing(cli.verbose, cli.quiet);

    // Resolve effective JSON mode: --json OR non-TTY stdout
    let json = cli.json || !std::io::IsTerminal::is_terminal(&std::io::stdout());

    match run(&cli, json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,rusqlite=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli, json: bool) -> Result<(), Error> {
    let ctx = CommandContext {
        db_path: cli.db.as_ref(),
        project: cli.project.as_ref(),
        actor: cli.actor.as_deref(),
        json,
    };

    match &cli.command {
        Commands::Version => commands::version::execute(json),
        Commands::Project { command } => commands::project::execute(command, &ctx),
        Commands::Context { command } => commands::context::execute(command, &ctx),
        Commands::Checkpoint { command } => commands::checkpoint::execute(command, &ctx),
        Commands::Autosave { command } => commands::autosave::execute(command, &ctx),
        Commands::Completions { shell } => commands::completions::execute(shell),
    }
}

#[cfg(test)]
mod tests {
    use super::preprocess_args;

    fn args(list: &[&str]) -> Vec<String> {
        preprocess_args(list.iter().map(ToString::to_string))
    }

    #[test]
    fn test_named_flag_becomes_positional() {
        assert_eq!(
            args(&["devctx", "checkpoint", "restore", "--id", "7"]),
            ["devctx", "checkpoint", "restore", "7"]
        );
    }

    #[test]
    fn test_equals_form() {
        assert_eq!(
            args(&["devctx", "checkpoint", "create", "--name=before refactor"]),
            ["devctx", "checkpoint", "create", "before refactor"]
        );
    }

    #[test]
    fn test_other_flags_untouched() {
        assert_eq!(
            args(&["devctx", "checkpoint", "create", "--next-action", "x"]),
            ["devctx", "checkpoint", "create", "--next-action", "x"]
        );
    }
}
