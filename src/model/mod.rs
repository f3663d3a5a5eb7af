//! Data models for devctx.
//!
//! This module contains all domain models:
//! - Project
//! - IssueContext, TaskList, SessionState (working context)
//! - Checkpoint

pub mod checkpoint;
pub mod context;
pub mod project;

pub use checkpoint::{Checkpoint, NewCheckpoint};
pub use context::{IssueContext, SessionState, Task, TaskList, TaskStatus};
pub use project::Project;
