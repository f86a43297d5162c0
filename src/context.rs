//! Task Context
//!
//! Explicit owner of the state managers share: the signal event pool and
//! the invocation counter used to name worker threads.

use log::debug;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::config::ManagerConfig;
use crate::tasks::event::EventPool;
use crate::tasks::manager::AsyncTaskManager;

/// Context that builds task managers
pub struct TaskContext {
    events: Arc<EventPool>,
    invocations: AtomicU32,
}

impl TaskContext {
    /// Create a context whose pool hands out at most `event_capacity` events
    pub fn new(name: impl Into<String>, event_capacity: usize) -> Self {
        Self {
            events: Arc::new(EventPool::new(name, event_capacity)),
            invocations: AtomicU32::new(0),
        }
    }

    /// Create a context sized from configuration
    pub fn from_config(name: impl Into<String>, config: &ManagerConfig) -> Self {
        Self::new(name, config.event_pool_capacity())
    }

    /// Build a manager for an owning subsystem
    pub fn create_manager(&self, name: impl Into<String>, config: ManagerConfig) -> AsyncTaskManager {
        let invocation = self.invocations.fetch_add(1, Ordering::Relaxed);
        let name = name.into();
        debug!("Creating task manager '{}' (invocation {})", name, invocation);
        AsyncTaskManager::new(name, invocation, config, self.events.clone())
    }

    pub fn event_pool(&self) -> &Arc<EventPool> {
        &self.events
    }

    /// Managers created so far
    pub fn invocation_count(&self) -> u32 {
        self.invocations.load(Ordering::Relaxed)
    }
}

impl Default for TaskContext {
    fn default() -> Self {
        Self::from_config("default", &ManagerConfig::default())
    }
}
