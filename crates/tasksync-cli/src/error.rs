use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] tasksync_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Owner ID cannot be empty")]
    EmptyOwner,
    #[error("Task ID cannot be empty")]
    EmptyTaskId,
    #[error("No sync operations provided")]
    EmptyBatch,
    #[error("Invalid sync batch: {0}")]
    InvalidBatch(String),
    #[error("Task not found: {0}")]
    TaskNotFound(String),
}
