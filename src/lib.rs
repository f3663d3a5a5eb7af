//! devctx - Persistent working context with autosave checkpoints
//!
//! This crate provides the core functionality for the `devctx` CLI tool.
//!
//! # Architecture
//!
//! - [`autosave`] - Autosave scheduler, save queue and retrying executor
//! - [`checkpoint`] - Snapshots, checkpoint store, restore and diff
//! - [`cli`] - Command-line interface using clap
//! - [`model`] - Data types (Project, IssueContext, TaskList, SessionState, Checkpoint)
//! - [`storage`] - SQLite database layer
//! - [`config`] - Configuration management
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod autosave;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod storage;

pub use error::{Error, Result};
