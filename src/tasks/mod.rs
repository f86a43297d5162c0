//! Tasks Module
//!
//! Worker-thread task manager: serial and parallel queues on a dedicated
//! thread, with completed work handed back to a single consumer thread.

pub mod basic;
pub mod event;
pub mod manager;
pub mod queue;
pub mod thread;
pub mod types;

pub use basic::{completion_channel, Delegate, GenericEvent, GenericTask, TaskState, TaskStep};
pub use event::{EventPool, SignalEvent};
pub use manager::{AsyncTaskManager, OnlineTick, ShutdownReport};
pub use queue::{ParallelTaskSet, TaskQueue};
pub use thread::ManagerThread;
pub use types::{AsyncItem, AsyncTask, ManagerStats, TaskEvent, TaskId, TaskMode, TaskOutcome};
