//! Autosave scheduling.
//!
//! - [`config`] - Per-project settings, trigger kinds, save events
//! - [`executor`] - One save with retry and linear backoff
//! - [`service`] - Timers, gate policy, per-project FIFO queues, circuit breaker

pub mod config;
pub mod executor;
pub mod service;

pub use config::{AutosaveConfig, SaveEvent, TriggerKind};
pub use executor::{execute_save, CheckpointSink, RetryPolicy, SaveOutcome};
pub use service::{AutosaveService, AutosaveStatus, SchedulerCommand, FAILURE_THRESHOLD};
