//! Manager Thread
//!
//! Spawns the worker thread for a manager and owns the ordered shutdown:
//! stop, join, exit, then drain.

use log::{error, info, warn};
use std::any::Any;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::manager::{AsyncTaskManager, ShutdownReport};
use crate::error::{ManagerError, ManagerResult};

/// Running worker thread for one manager. Shut it down (or drop it) on the
/// consumer thread: the drain finalizes items and fires their delegates.
pub struct ManagerThread {
    manager: Arc<AsyncTaskManager>,
    handle: Option<JoinHandle<u32>>,
}

impl ManagerThread {
    /// Initialize the manager and start its worker thread
    pub fn spawn(manager: Arc<AsyncTaskManager>) -> ManagerResult<Self> {
        manager.init()?;

        let worker = manager.clone();
        let spawned = thread::Builder::new()
            .name(manager.thread_name())
            .spawn(move || worker.run());

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                manager.exit();
                return Err(ManagerError::ThreadSpawn(e));
            }
        };

        info!("Started {}", manager.thread_name());
        Ok(Self {
            manager,
            handle: Some(handle),
        })
    }

    pub fn manager(&self) -> &Arc<AsyncTaskManager> {
        &self.manager
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Stop and join the worker, release its event, then finalize completed
    /// items and discard unfinished ones. Consumer thread only.
    pub fn shutdown(mut self) -> ManagerResult<ShutdownReport> {
        self.finish()
    }

    fn finish(&mut self) -> ManagerResult<ShutdownReport> {
        let Some(handle) = self.handle.take() else {
            return Err(ManagerError::NotInitialized(self.manager.name().to_string()));
        };

        self.manager.stop();
        let joined = handle.join();
        self.manager.exit();
        let report = self.manager.drain_after_shutdown();

        match joined {
            Ok(0) => Ok(report),
            Ok(code) => {
                warn!("{} exited with code {}", self.manager.thread_name(), code);
                Ok(report)
            }
            Err(panic) => Err(ManagerError::WorkerPanicked(panic_message(panic.as_ref()))),
        }
    }
}

impl Drop for ManagerThread {
    fn drop(&mut self) {
        if self.handle.is_some() {
            if let Err(e) = self.finish() {
                error!("Error shutting down {}: {}", self.manager.thread_name(), e);
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ManagerConfig;
    use crate::context::TaskContext;
    use std::time::{Duration, Instant};

    #[test]
    fn test_stop_right_after_start() {
        let context = TaskContext::new("thread", 1);
        let manager = Arc::new(context.create_manager("idle", ManagerConfig::default()));

        let worker = ManagerThread::spawn(manager.clone()).unwrap();
        let start = Instant::now();
        let report = worker.shutdown().unwrap();

        assert!(start.elapsed() < Duration::from_millis(500));
        assert_eq!(report.finalized, 0);
        assert_eq!(report.discarded, 0);
        assert_eq!(context.event_pool().live(), 0);
    }

    #[test]
    fn test_spawn_fails_without_event() {
        let context = TaskContext::new("thread", 1);
        let first = Arc::new(context.create_manager("first", ManagerConfig::default()));
        let second = Arc::new(context.create_manager("second", ManagerConfig::default()));

        let _running = ManagerThread::spawn(first).unwrap();
        let result = ManagerThread::spawn(second);
        assert!(matches!(result, Err(ManagerError::EventUnavailable { .. })));
    }

    #[test]
    fn test_drop_shuts_down() {
        let context = TaskContext::new("thread", 1);
        let manager = Arc::new(context.create_manager("dropped", ManagerConfig::default()));
        {
            let _worker = ManagerThread::spawn(manager.clone()).unwrap();
        }
        assert_eq!(context.event_pool().live(), 0);
        assert!(manager.is_exit_requested());
    }

    #[test]
    fn test_drop_finalizes_on_consumer_thread() {
        let context = TaskContext::new("thread", 1);
        let manager = Arc::new(context.create_manager("consumer", ManagerConfig::default()));
        manager.bind_consumer_thread();

        let consumer = thread::current().id();
        let finalized_on = Arc::new(parking_lot::Mutex::new(None));
        let slot = finalized_on.clone();
        {
            let _worker = ManagerThread::spawn(manager.clone()).unwrap();
            manager.add_generic_to_out_queue("Last", move || {
                *slot.lock() = Some(thread::current().id());
            });
        }
        assert_eq!(*finalized_on.lock(), Some(consumer));
    }

    #[test]
    fn test_worker_completes_serial_task() {
        let context = TaskContext::new("thread", 1);
        let manager = Arc::new(
            context.create_manager("serial", ManagerConfig::default().with_polling_interval_ms(5)),
        );
        let worker = ManagerThread::spawn(manager.clone()).unwrap();
        manager.add_generic_to_in_queue("Quick", || {});

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut finalized = 0;
        while finalized == 0 && Instant::now() < deadline {
            finalized += manager.game_tick();
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(finalized, 1);
        worker.shutdown().unwrap();
    }
}
