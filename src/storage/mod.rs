//! SQLite storage layer for devctx.
//!
//! This module provides the persistence collaborator used by the checkpoint
//! engine:
//! - WAL mode for concurrent reads
//! - Transaction discipline for atomic writes
//! - Audit events for history
//!
//! # Submodules
//!
//! - [`traits`] - Collaborator interfaces the engine depends on
//! - [`events`] - Audit event storage
//! - [`schema`] - Database schema definitions
//! - [`sqlite`] - Main SQLite storage implementation
//! - [`shared`] - Thread-safe trait implementation over [`SqliteStorage`]

pub mod events;
pub mod schema;
pub mod shared;
pub mod sqlite;
pub mod traits;

pub use shared::SharedStorage;
pub use sqlite::{MutationContext, SqliteStorage};
pub use traits::{CheckpointBackend, ContextStore, Persistence, ProjectRegistry};
