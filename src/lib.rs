//! Worker-thread task manager.
//!
//! Producers queue serial or parallel tasks from any thread; a dedicated
//! worker thread ticks them; a single consumer thread finalizes the results
//! through `AsyncTaskManager::game_tick`.

pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod tasks;

pub use config::ManagerConfig;
pub use context::TaskContext;
pub use error::{ConfigError, ManagerError, ManagerResult};
pub use tasks::{
    AsyncItem, AsyncTask, AsyncTaskManager, ManagerThread, TaskEvent, TaskId, TaskMode,
    TaskOutcome,
};
