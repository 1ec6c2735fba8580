//! Volatile task registry.
//!
//! Maps task ids to their lifecycle state. Entries are created by the
//! submission path, mutated only by the worker that owns the task, read by
//! any number of pollers, and reaped after a retention period once terminal.

pub mod reaper;
pub mod store;
pub mod task;

use thiserror::Error;

pub use reaper::TaskReaper;
pub use store::{RegistryCounts, TaskRegistry};
pub use task::{
    BatchItem, ProgressView, Stage, TaskEvent, TaskKind, TaskOutcome, TaskResult, TaskSnapshot,
    TaskStatus,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("Task already exists: {0}")]
    DuplicateKey(String),

    #[error("Task {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: TaskStatus,
        to: TaskStatus,
    },
}
