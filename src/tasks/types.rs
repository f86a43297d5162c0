//! Task Types
//!
//! Interfaces implemented by asynchronous work items, plus the ids, modes
//! and lifecycle events the manager reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Identity of an item admitted to a manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(uuid::Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How an item was admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskMode {
    /// Single-file in-queue, one at a time
    Serial,
    /// Ticked alongside every other parallel task
    Parallel,
    /// Delivered straight to the out-queue, never ticked
    Event,
}

impl fmt::Display for TaskMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskMode::Serial => "serial",
            TaskMode::Parallel => "parallel",
            TaskMode::Event => "event",
        };
        f.write_str(name)
    }
}

/// Anything that can sit in the out-queue.
///
/// `finalize` and `trigger_delegates` run on the consumer thread only,
/// in that order, after which the item is dropped.
pub trait AsyncItem: Send {
    /// Human-readable description used in log lines
    fn describe(&self) -> String;

    /// Time since the item was created or initialized
    fn elapsed(&self) -> Duration;

    /// Apply results that are not safe to touch from the worker thread
    fn finalize(&mut self) {}

    /// Fire completion callbacks
    fn trigger_delegates(&mut self) {}
}

/// A unit of asynchronous work ticked by the worker thread.
///
/// `initialize` is called exactly once: on the worker thread for serial
/// tasks, on the admitting thread for parallel tasks. `tick` is called until
/// `is_done` reports true and never afterwards. Cancellation and timeouts
/// are the task's own business: flip internal state so the next `tick`
/// completes.
pub trait AsyncTask: AsyncItem {
    fn initialize(&mut self) {}

    fn tick(&mut self);

    fn is_done(&self) -> bool;

    fn was_successful(&self) -> bool;
}

/// Result handed to completion delegates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    /// Task description at completion
    pub description: String,
    /// Whether the task reported success
    pub success: bool,
    /// Elapsed time when delegates fired
    pub elapsed: Duration,
}

/// Out-queue entry payload: a finished task or a standalone event
pub enum CompletedItem {
    Task(Box<dyn AsyncTask>),
    Event(Box<dyn AsyncItem>),
}

impl CompletedItem {
    pub fn describe(&self) -> String {
        match self {
            Self::Task(task) => task.describe(),
            Self::Event(item) => item.describe(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            Self::Task(task) => task.elapsed(),
            Self::Event(item) => item.elapsed(),
        }
    }

    pub fn finalize(&mut self) {
        match self {
            Self::Task(task) => task.finalize(),
            Self::Event(item) => item.finalize(),
        }
    }

    pub fn trigger_delegates(&mut self) {
        match self {
            Self::Task(task) => task.trigger_delegates(),
            Self::Event(item) => item.trigger_delegates(),
        }
    }
}

/// Lifecycle events broadcast to subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TaskEvent {
    /// Admitted to a manager collection
    Queued {
        id: TaskId,
        description: String,
        mode: TaskMode,
    },
    /// `initialize` ran
    Started { id: TaskId, mode: TaskMode },
    /// Reported done and moved to the out-queue
    Completed {
        id: TaskId,
        description: String,
        mode: TaskMode,
        success: bool,
        elapsed_ms: u64,
        completed_at: DateTime<Utc>,
    },
    /// Finalized and delegates fired on the consumer thread
    Finalized { id: TaskId, description: String },
    /// Dropped during shutdown without completing
    Discarded { id: TaskId, description: String },
}

impl TaskEvent {
    /// Id of the item this event is about
    pub fn task_id(&self) -> TaskId {
        match self {
            Self::Queued { id, .. } => *id,
            Self::Started { id, .. } => *id,
            Self::Completed { id, .. } => *id,
            Self::Finalized { id, .. } => *id,
            Self::Discarded { id, .. } => *id,
        }
    }

    /// Channel-style name, e.g. `task:completed`
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Queued { .. } => "task:queued",
            Self::Started { .. } => "task:started",
            Self::Completed { .. } => "task:completed",
            Self::Finalized { .. } => "task:finalized",
            Self::Discarded { .. } => "task:discarded",
        }
    }
}

/// Point-in-time counts for a manager
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerStats {
    /// Serial tasks waiting in the in-queue
    pub queued: usize,
    /// 1 while a serial task is active
    pub active: usize,
    /// Parallel tasks in flight
    pub parallel: usize,
    /// Items waiting for the consumer
    pub pending_finalize: usize,
    /// Tasks that reported done since creation
    pub completed_total: u64,
    /// Of those, tasks that reported failure
    pub failed_total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_ids_unique() {
        let a = TaskId::new();
        let b = TaskId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string().len(), 36);
    }

    #[test]
    fn test_event_serialization() {
        let id = TaskId::new();
        let event = TaskEvent::Queued {
            id,
            description: "Login".to_string(),
            mode: TaskMode::Serial,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "queued");
        assert_eq!(json["mode"], "serial");
        assert_eq!(event.task_id(), id);
        assert_eq!(event.event_name(), "task:queued");
    }

    #[test]
    fn test_mode_display() {
        assert_eq!(TaskMode::Parallel.to_string(), "parallel");
        assert_eq!(TaskMode::Event.to_string(), "event");
    }
}
