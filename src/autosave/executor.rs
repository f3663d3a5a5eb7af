//! Execution of one queued save with bounded retry.
//!
//! Each save runs an explicit state machine:
//!
//! ```text
//! Pending -> Attempting -> Succeeded
//!                |
//!                +-> BackoffWait -> Attempting ...
//!                |
//!                +-> Exhausted
//! ```
//!
//! Only transient errors move to `BackoffWait`. Failed attempt `n` waits
//! `retry_delay * n` before attempt `n + 1`. The sink is synchronous, so
//! each attempt runs on the blocking pool.

use crate::autosave::config::{AutosaveConfig, SaveEvent};
use crate::checkpoint::store::{auto_checkpoint_name, CheckpointMeta};
use crate::checkpoint::CheckpointManager;
use crate::error::{Error, Result};
use crate::model::Checkpoint;
use crate::storage::traits::Persistence;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Destination of autosave checkpoints.
///
/// Implementations either store a complete checkpoint or return an error;
/// there is no partial result.
pub trait CheckpointSink: Send + Sync {
    fn save_checkpoint(&self, project_path: &str, name: &str) -> Result<Checkpoint>;
}

impl<S: Persistence> CheckpointSink for CheckpointManager<S> {
    fn save_checkpoint(&self, project_path: &str, name: &str) -> Result<Checkpoint> {
        self.create_checkpoint(
            project_path,
            CheckpointMeta {
                name: Some(name.to_string()),
                ..CheckpointMeta::default()
            },
        )
    }
}

/// Attempt budget and backoff base for one save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub fn from_config(config: &AutosaveConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            base_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }

    /// Wait after failed attempt `attempt` (1-based).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

/// States of one in-flight save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptState {
    Pending,
    Attempting { attempt: u32 },
    BackoffWait { attempt: u32, delay: Duration },
    Succeeded { attempt: u32, checkpoint_id: i64 },
    Exhausted { attempt: u32, error: String },
}

/// Terminal result of one save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SaveOutcome {
    Saved { checkpoint_id: i64, attempts: u32 },
    Failed { attempts: u32, error: String },
}

impl SaveOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Saved { .. })
    }
}

/// Run one save to completion, including retries.
pub async fn execute_save(
    sink: Arc<dyn CheckpointSink>,
    event: &SaveEvent,
    policy: RetryPolicy,
) -> SaveOutcome {
    let project = event.project_path.as_str();
    let name = auto_checkpoint_name(event.kind.as_str());
    let mut state = AttemptState::Pending;

    loop {
        state = match state {
            AttemptState::Pending => AttemptState::Attempting { attempt: 1 },

            AttemptState::Attempting { attempt } => {
                info!(project, kind = %event.kind, attempt, "Executing auto-save");
                match attempt_save(&sink, project, &name).await {
                    Ok(checkpoint) => AttemptState::Succeeded {
                        attempt,
                        checkpoint_id: checkpoint.id,
                    },
                    Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                        warn!(
                            project,
                            attempt,
                            max_attempts = policy.max_attempts,
                            error = %e,
                            "Auto-save attempt failed"
                        );
                        AttemptState::BackoffWait {
                            attempt,
                            delay: policy.backoff(attempt),
                        }
                    }
                    Err(e) => AttemptState::Exhausted {
                        attempt,
                        error: e.to_string(),
                    },
                }
            }

            AttemptState::BackoffWait { attempt, delay } => {
                debug!(project, ?delay, "Backing off");
                tokio::time::sleep(delay).await;
                AttemptState::Attempting {
                    attempt: attempt + 1,
                }
            }

            AttemptState::Succeeded {
                attempt,
                checkpoint_id,
            } => {
                info!(project, checkpoint_id, attempts = attempt, "Auto-save completed");
                return SaveOutcome::Saved {
                    checkpoint_id,
                    attempts: attempt,
                };
            }

            AttemptState::Exhausted { attempt, error } => {
                error!(project, attempts = attempt, %error, "Auto-save failed");
                return SaveOutcome::Failed {
                    attempts: attempt,
                    error,
                };
            }
        };
    }
}

/// One sink call, off the async workers.
async fn attempt_save(sink: &Arc<dyn CheckpointSink>, project: &str, name: &str) -> Result<Checkpoint> {
    let sink = Arc::clone(sink);
    let (project, name) = (project.to_string(), name.to_string());
    tokio::task::spawn_blocking(move || sink.save_checkpoint(&project, &name))
        .await
        .map_err(|e| Error::Other(format!("save task failed: {e}")))?
}
