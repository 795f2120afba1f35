//! Error types for sandbox operations.
//!
//! These never reach callers of [`RunCoordinator::run`](crate::RunCoordinator::run);
//! the coordinator folds them into a `runtime` [`ExecutionError`](codeyard_types::ExecutionError).

use thiserror::Error;

/// Errors that can occur while creating or driving an isolated context.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// The isolated context could not be created.
    #[error("Failed to create isolated context: {0}")]
    ContextCreation(String),

    /// The context thread could not be spawned.
    #[error("Failed to spawn context thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),

    /// The coordinator was closed before the run got a slot.
    #[error("Run coordinator is closed")]
    Closed,
}

/// Result type for sandbox operations.
pub type SandboxResult<T> = std::result::Result<T, SandboxError>;
