//! Autosave configuration, trigger kinds and save events.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Longest accepted timer period (one day).
pub const MAX_INTERVAL_MINUTES: u64 = 24 * 60;

/// Upper bound on attempts per save.
pub const MAX_RETRIES: u32 = 10;

/// Upper bound on the base backoff delay (five minutes).
pub const MAX_RETRY_DELAY_MS: u64 = 5 * 60 * 1000;

/// What caused a save.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum TriggerKind {
    Interval,
    Manual,
    TaskComplete,
    TestPass,
    Checkpoint,
    Custom(String),
}

impl TriggerKind {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Interval => "interval",
            Self::Manual => "manual",
            Self::TaskComplete => "task_complete",
            Self::TestPass => "test_pass",
            Self::Checkpoint => "checkpoint",
            Self::Custom(name) => name,
        }
    }

    /// Kinds that pass the gate regardless of the configured trigger set.
    #[must_use]
    pub const fn is_always_accepted(&self) -> bool {
        matches!(self, Self::Interval | Self::Manual)
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        Ok(match s {
            "interval" => Self::Interval,
            "manual" => Self::Manual,
            "task_complete" => Self::TaskComplete,
            "test_pass" => Self::TestPass,
            "checkpoint" => Self::Checkpoint,
            "" => return Err(Error::Config("trigger kind must not be empty".to_string())),
            other => {
                if !other
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
                {
                    return Err(Error::Config(format!("invalid trigger kind '{other}'")));
                }
                Self::Custom(other.to_string())
            }
        })
    }
}

impl TryFrom<String> for TriggerKind {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<TriggerKind> for String {
    fn from(kind: TriggerKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Per-project autosave settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutosaveConfig {
    pub enabled: bool,
    /// Timer period; 0 disables the timer but keeps event triggers.
    pub interval_minutes: u64,
    /// Kinds accepted besides `interval` and `manual`.
    pub triggers: BTreeSet<TriggerKind>,
    /// Attempts per save; 0 is treated as 1.
    pub max_retries: u32,
    /// Base backoff; attempt `n` waits `retry_delay_ms * n`.
    pub retry_delay_ms: u64,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: 5,
            triggers: [
                TriggerKind::TaskComplete,
                TriggerKind::TestPass,
                TriggerKind::Checkpoint,
            ]
            .into_iter()
            .collect(),
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl AutosaveConfig {
    /// Reject values the scheduler cannot honor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.interval_minutes > MAX_INTERVAL_MINUTES {
            return Err(Error::Config(format!(
                "interval must be at most {MAX_INTERVAL_MINUTES} minutes, got {}",
                self.interval_minutes
            )));
        }
        if self.max_retries > MAX_RETRIES {
            return Err(Error::Config(format!(
                "maxRetries must be at most {MAX_RETRIES}, got {}",
                self.max_retries
            )));
        }
        if self.retry_delay_ms > MAX_RETRY_DELAY_MS {
            return Err(Error::Config(format!(
                "retryDelay must be at most {MAX_RETRY_DELAY_MS} ms, got {}",
                self.retry_delay_ms
            )));
        }
        Ok(())
    }

    /// Gate policy for incoming events.
    #[must_use]
    pub fn accepts(&self, kind: &TriggerKind) -> bool {
        kind.is_always_accepted() || self.triggers.contains(kind)
    }

    /// Whether registering this config arms a timer.
    #[must_use]
    pub const fn wants_timer(&self) -> bool {
        self.enabled && self.interval_minutes > 0
    }
}

/// A request to save one project. Immutable once queued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveEvent {
    pub kind: TriggerKind,
    pub project_path: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Unix milliseconds
    pub created_at: i64,
}

impl SaveEvent {
    pub fn new(kind: TriggerKind, project_path: impl Into<String>) -> Self {
        Self {
            kind,
            project_path: project_path.into(),
            metadata: Map::new(),
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}
