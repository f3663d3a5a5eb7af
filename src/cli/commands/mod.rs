//! Command implementations.

pub mod autosave;
pub mod checkpoint;
pub mod completions;
pub mod context;
pub mod project;
pub mod version;

use crate::config::{current_project_path, default_actor, resolve_db_path};
use crate::error::{Error, Result};
use crate::storage::{SharedStorage, SqliteStorage};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Global options every command handler needs.
#[derive(Debug, Clone, Copy)]
pub struct CommandContext<'a> {
    pub db_path: Option<&'a PathBuf>,
    pub project: Option<&'a PathBuf>,
    pub actor: Option<&'a str>,
    pub json: bool,
}

impl CommandContext<'_> {
    /// Open the existing database.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotInitialized`] if the database file does not exist.
    pub fn open_storage(&self) -> Result<Arc<SharedStorage>> {
        let db_path = self.db_file()?;
        if !db_path.exists() {
            return Err(Error::NotInitialized);
        }
        self.open_at(&db_path)
    }

    /// Open the database, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or schema cannot be created.
    pub fn open_or_create_storage(&self) -> Result<Arc<SharedStorage>> {
        let db_path = self.db_file()?;
        self.open_at(&db_path)
    }

    fn db_file(&self) -> Result<PathBuf> {
        resolve_db_path(self.db_path.map(PathBuf::as_path)).ok_or(Error::NotInitialized)
    }

    fn open_at(&self, db_path: &Path) -> Result<Arc<SharedStorage>> {
        let storage = SqliteStorage::open(db_path)?;
        let actor = self.actor.map_or_else(default_actor, ToString::to_string);
        Ok(Arc::new(SharedStorage::new(storage, actor)))
    }

    /// The project path commands operate on, canonicalized when possible.
    ///
    /// # Errors
    ///
    /// Returns an error if no project directory can be determined.
    pub fn project_path(&self) -> Result<String> {
        let path = match self.project {
            Some(p) => p.clone(),
            None => current_project_path().ok_or_else(|| {
                Error::InvalidArgument("cannot determine the project directory".to_string())
            })?,
        };

        let path = std::fs::canonicalize(&path).unwrap_or(path);
        Ok(path.to_string_lossy().to_string())
    }
}

/// Format a Unix-millisecond timestamp in local time.
#[must_use]
pub fn format_timestamp(ts: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ts)
        .map(|dt| {
            dt.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| ts.to_string())
}

/// Print a value as one line of JSON.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}
