//! User settings from `~/.devctx/config.json`.
//!
//! ```json
//! {
//!   "autoSave": {
//!     "enabled": true,
//!     "interval": 5,
//!     "triggers": ["task_complete", "test_pass", "checkpoint"],
//!     "maxRetries": 3,
//!     "retryDelay": 1000
//!   }
//! }
//! ```
//!
//! Missing keys take their defaults. `DEVCTX_AUTOSAVE_ENABLED` and
//! `DEVCTX_AUTOSAVE_INTERVAL` override the file.

use crate::autosave::{AutosaveConfig, TriggerKind};
use crate::config::global_devctx_dir;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Top-level settings document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub auto_save: AutoSaveSettings,
}

/// The `autoSave` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AutoSaveSettings {
    pub enabled: bool,
    /// Minutes between interval saves
    pub interval: u64,
    pub triggers: Vec<TriggerKind>,
    pub max_retries: u32,
    /// Milliseconds
    pub retry_delay: u64,
}

impl Default for AutoSaveSettings {
    fn default() -> Self {
        let defaults = AutosaveConfig::default();
        Self {
            enabled: defaults.enabled,
            interval: defaults.interval_minutes,
            triggers: defaults.triggers.into_iter().collect(),
            max_retries: defaults.max_retries,
            retry_delay: defaults.retry_delay_ms,
        }
    }
}

impl AutoSaveSettings {
    /// Convert to a validated scheduler config.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a value is out of range.
    pub fn to_autosave_config(&self) -> Result<AutosaveConfig> {
        let config = AutosaveConfig {
            enabled: self.enabled,
            interval_minutes: self.interval,
            triggers: self.triggers.iter().cloned().collect(),
            max_retries: self.max_retries,
            retry_delay_ms: self.retry_delay,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Default settings file location.
#[must_use]
pub fn settings_path() -> Option<PathBuf> {
    global_devctx_dir().map(|dir| dir.join("config.json"))
}

/// Load settings from the default location with environment overrides.
///
/// # Errors
///
/// Returns [`Error::Config`] if the file or an override is malformed.
pub fn load_settings() -> Result<Settings> {
    let settings = match settings_path() {
        Some(path) => load_settings_from(&path)?,
        None => Settings::default(),
    };
    apply_env_overrides(settings, |key| std::env::var(key).ok())
}

/// Load settings from a file. A missing file yields defaults.
///
/// # Errors
///
/// Returns [`Error::Config`] if the file exists but cannot be read or parsed.
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No settings file; using defaults");
            return Ok(Settings::default());
        }
        Err(e) => {
            return Err(Error::Config(format!(
                "cannot read {}: {e}",
                path.display()
            )));
        }
    };

    let settings = serde_json::from_str(&raw)
        .map_err(|e| Error::Config(format!("invalid {}: {e}", path.display())))?;
    debug!(path = %path.display(), "Loaded settings");
    Ok(settings)
}

/// Apply `DEVCTX_AUTOSAVE_*` overrides using `lookup` to read variables.
///
/// # Errors
///
/// Returns [`Error::Config`] if an override does not parse.
pub fn apply_env_overrides(
    mut settings: Settings,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Settings> {
    if let Some(raw) = lookup("DEVCTX_AUTOSAVE_ENABLED") {
        settings.auto_save.enabled = match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            other => {
                return Err(Error::Config(format!(
                    "DEVCTX_AUTOSAVE_ENABLED must be a boolean, got '{other}'"
                )));
            }
        };
    }

    if let Some(raw) = lookup("DEVCTX_AUTOSAVE_INTERVAL") {
        settings.auto_save.interval = raw.trim().parse().map_err(|_| {
            Error::Config(format!(
                "DEVCTX_AUTOSAVE_INTERVAL must be a number of minutes, got '{raw}'"
            ))
        })?;
    }

    Ok(settings)
}
