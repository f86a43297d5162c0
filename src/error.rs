//! Error Types
//!
//! Manager-level and configuration errors. Task failures are not errors:
//! they travel through the task's own success flag.

use thiserror::Error;

/// Errors raised by the task manager itself
#[derive(Error, Debug)]
pub enum ManagerError {
    /// No signal event could be taken from the pool; the worker must not start
    #[error("Signal event unavailable: pool '{pool}' exhausted (capacity {capacity})")]
    EventUnavailable { pool: String, capacity: usize },

    #[error("Manager already running: {0}")]
    AlreadyRunning(String),

    #[error("Manager not initialized: {0}")]
    NotInitialized(String),

    #[error("Failed to spawn worker thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),

    #[error("Worker thread panicked: {0}")]
    WorkerPanicked(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type alias for manager operations
pub type ManagerResult<T> = Result<T, ManagerError>;

impl From<ManagerError> for String {
    fn from(err: ManagerError) -> String {
        err.to_string()
    }
}
