//! Project model for devctx.
//!
//! Projects represent distinct codebases/directories. All working context and
//! every checkpoint is scoped to exactly one project.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// A project in devctx.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Stable internal identifier (`proj_` + 12 hex chars)
    pub id: String,

    /// Absolute path to the project directory
    pub project_path: String,

    /// Display name for the project
    pub name: String,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,

    /// Last access timestamp (Unix milliseconds)
    pub updated_at: i64,
}

impl Project {
    /// Create a new project record with a fresh id.
    pub fn new(project_path: String, name: String) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        let id = format!("proj_{}", &uuid::Uuid::new_v4().simple().to_string()[..12]);

        Self {
            id,
            project_path,
            name,
            created_at: now,
            updated_at: now,
        }
    }

    /// Derive a display name from the last path component.
    #[must_use]
    pub fn name_from_path(project_path: &str) -> String {
        Path::new(project_path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| project_path.to_string())
    }
}
