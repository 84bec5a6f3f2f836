//! Error types for the watcher system.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from watcher and dispatcher operations.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to initialize watcher: {reason}")]
    InitFailed { reason: String },

    #[error("Cannot watch path {path}: {reason}")]
    PathWatchFailed { path: PathBuf, reason: String },

    #[error("Worker pool is shut down")]
    PoolShutdown,

    #[error("Failed to spawn worker thread: {reason}")]
    ThreadSpawn { reason: String },
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::InitFailed {
            reason: e.to_string(),
        }
    }
}
