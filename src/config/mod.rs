//! Configuration management.
//!
//! This module provides functions for locating the devctx home directory,
//! resolving the database path, and identifying the current project.
//!
//! # Architecture
//!
//! devctx uses a **global database**: one SQLite file at
//! `~/.devctx/data/devctx.db` holds the context and checkpoints of every
//! project, keyed by project path. User settings live next to it in
//! `~/.devctx/config.json` (see [`settings`]).

pub mod settings;

pub use settings::{load_settings, settings_path, AutoSaveSettings, Settings};

use std::path::{Path, PathBuf};

/// Get the global devctx directory location (`~/.devctx/`).
#[must_use]
pub fn global_devctx_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".devctx"))
}

/// Check if test mode is enabled.
///
/// Test mode is enabled by setting `DEVCTX_TEST_DB=1` (or any non-empty
/// value other than `0`/`false`). It redirects all database operations to an
/// isolated test database.
#[must_use]
pub fn is_test_mode() -> bool {
    std::env::var("DEVCTX_TEST_DB").is_ok_and(|v| is_truthy(&v))
}

fn is_truthy(value: &str) -> bool {
    !value.is_empty() && value != "0" && !value.eq_ignore_ascii_case("false")
}

/// Get the test database path (`~/.devctx/test/devctx.db`).
#[must_use]
pub fn test_db_path() -> Option<PathBuf> {
    global_devctx_dir().map(|dir| dir.join("test").join("devctx.db"))
}

/// Resolve the database path.
///
/// Priority:
/// 1. If `explicit_path` is provided, use it directly
/// 2. `DEVCTX_TEST_DB` environment variable → uses test database
/// 3. `DEVCTX_DB` environment variable
/// 4. Global location: `~/.devctx/data/devctx.db`
///
/// # Returns
///
/// Returns the path to the database file, or `None` if no home directory
/// could be determined.
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    if is_test_mode() {
        return test_db_path();
    }

    if let Ok(db_path) = std::env::var("DEVCTX_DB") {
        if !db_path.trim().is_empty() {
            return Some(PathBuf::from(db_path));
        }
    }

    global_devctx_dir().map(|dir| dir.join("data").join("devctx.db"))
}

/// Get the current project path.
///
/// The git repository root when inside one, so every subdirectory maps to
/// the same project; otherwise the current directory.
#[must_use]
pub fn current_project_path() -> Option<PathBuf> {
    git_toplevel().or_else(|| std::env::current_dir().ok())
}

/// Get the git repository root directory.
fn git_toplevel() -> Option<PathBuf> {
    std::process::Command::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| PathBuf::from(String::from_utf8_lossy(&o.stdout).trim().to_string()))
}

/// Get the current git branch name.
///
/// Returns `None` if not in a git repository or if git command fails.
#[must_use]
pub fn current_git_branch() -> Option<String> {
    std::process::Command::new("git")
        .args(["rev-parse", "--abbrev-ref", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Get the default actor name.
///
/// Priority:
/// 1. `DEVCTX_ACTOR` environment variable
/// 2. Git user name
/// 3. System username
/// 4. "unknown"
#[must_use]
pub fn default_actor() -> String {
    if let Ok(actor) = std::env::var("DEVCTX_ACTOR") {
        if !actor.is_empty() {
            return actor;
        }
    }

    if let Ok(output) = std::process::Command::new("git")
        .args(["config", "user.name"])
        .output()
    {
        if output.status.success() {
            let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if !name.is_empty() {
                return name;
            }
        }
    }

    if let Ok(user) = std::env::var("USER") {
        return user;
    }

    "unknown".to_string()
}
