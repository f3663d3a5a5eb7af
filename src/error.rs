//! Error types for devctx.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=store, 3=not_found, 4=validation, 5=integrity, etc.)
//! - Transience flags that drive autosave retry
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use thiserror::Error;

/// Result type alias for devctx operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
///
/// Each code maps to a SCREAMING_SNAKE string and a category-based
/// exit code. Agents match on the string; shell scripts on the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Store (exit 2)
    NotInitialized,
    DatabaseError,

    // Not Found (exit 3)
    ProjectNotFound,
    CheckpointNotFound,

    // Validation (exit 4)
    InvalidArgument,

    // Integrity (exit 5)
    CorruptCheckpoint,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::ProjectNotFound => "PROJECT_NOT_FOUND",
            Self::CheckpointNotFound => "CHECKPOINT_NOT_FOUND",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::CorruptCheckpoint => "CORRUPT_CHECKPOINT",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-8).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::NotInitialized | Self::DatabaseError => 2,
            Self::ProjectNotFound | Self::CheckpointNotFound => 3,
            Self::InvalidArgument => 4,
            Self::CorruptCheckpoint => 5,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether the same call may succeed if simply repeated.
    ///
    /// Only store-level failures qualify. A corrupt checkpoint or a missing
    /// project will fail identically on every attempt.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::DatabaseError | Self::IoError)
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in devctx operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not initialized: run `devctx project init` first")]
    NotInitialized,

    #[error("Project not found: {id}")]
    ProjectNotFound { id: String },

    #[error("Checkpoint not found: {id}")]
    CheckpointNotFound { id: String },

    #[error("Checkpoint {id} is corrupted: {reason}")]
    CorruptCheckpoint { id: String, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Store temporarily unavailable: {0}")]
    TransientStore(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized => ErrorCode::NotInitialized,
            Self::Database(_) | Self::TransientStore(_) => ErrorCode::DatabaseError,
            Self::ProjectNotFound { .. } => ErrorCode::ProjectNotFound,
            Self::CheckpointNotFound { .. } => ErrorCode::CheckpointNotFound,
            Self::CorruptCheckpoint { .. } => ErrorCode::CorruptCheckpoint,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Whether a queued autosave should retry after this error.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        self.error_code().is_retryable()
    }

    /// Context-aware recovery hint for agents and humans.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotInitialized => {
                Some("Run `devctx project init` in your project directory".to_string())
            }

            Self::ProjectNotFound { id } => Some(format!(
                "No project registered for '{id}'. Use `devctx project list` to see known projects."
            )),

            Self::CheckpointNotFound { id } => Some(format!(
                "No checkpoint with ID '{id}'. Use `devctx checkpoint list` to see available checkpoints."
            )),

            Self::CorruptCheckpoint { .. } => Some(
                "Live context was left untouched. Pick an older checkpoint from `devctx checkpoint list`."
                    .to_string(),
            ),

            Self::Config(_) => Some(
                "Check the autoSave section of ~/.devctx/config.json \
                 (interval in minutes, retryDelay in milliseconds)"
                    .to_string(),
            ),

            Self::Database(_)
            | Self::TransientStore(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::InvalidArgument(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    ///
    /// Includes error code, message, retryability, exit code, and
    /// optional recovery hint. Agents parse this instead of stderr text.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_are_transient() {
        assert!(Error::TransientStore("locked".into()).is_transient());
        assert!(Error::Database(rusqlite::Error::InvalidQuery).is_transient());
    }

    #[test]
    fn test_integrity_and_lookup_errors_are_not_transient() {
        let corrupt = Error::CorruptCheckpoint {
            id: "7".into(),
            reason: "checksum mismatch".into(),
        };
        assert!(!corrupt.is_transient());
        assert!(!Error::ProjectNotFound { id: "/p".into() }.is_transient());
        assert!(!Error::Config("bad".into()).is_transient());
    }

    #[test]
    fn test_structured_json_shape() {
        let err = Error::CheckpointNotFound { id: "42".into() };
        let json = err.to_structured_json();

        assert_eq!(json["error"]["code"], "CHECKPOINT_NOT_FOUND");
        assert_eq!(json["error"]["exit_code"], 3);
        assert_eq!(json["error"]["retryable"], false);
        assert!(json["error"]["hint"].as_str().unwrap().contains("42"));
    }

    #[test]
    fn test_corrupt_checkpoint_exit_code() {
        let err = Error::CorruptCheckpoint {
            id: "1".into(),
            reason: "bad".into(),
        };
        assert_eq!(err.exit_code(), 5);
        assert_eq!(err.error_code().as_str(), "CORRUPT_CHECKPOINT");
    }
}
