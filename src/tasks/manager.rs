//! Async Task Manager
//!
//! Worker-thread loop that advances serial and parallel tasks, and the
//! consumer-side pump that finalizes what the worker completed.
//!
//! Roles:
//! - producers call the `add_*` methods from any thread
//! - the worker thread calls `run` (or `run_once` per iteration)
//! - one consumer thread calls `game_tick` to finalize and fire delegates

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

use super::basic::{GenericEvent, GenericTask};
use super::event::{EventPool, SignalEvent};
use super::queue::{ParallelTaskSet, TaskQueue};
use super::types::{
    AsyncItem, AsyncTask, CompletedItem, ManagerStats, TaskEvent, TaskId, TaskMode,
};
use crate::config::ManagerConfig;
use crate::error::{ManagerError, ManagerResult};

/// Synchronous poll of the owning subsystem, run once per worker iteration.
/// Must not block.
pub trait OnlineTick: Send + Sync {
    fn online_tick(&self);
}

impl<F> OnlineTick for F
where
    F: Fn() + Send + Sync,
{
    fn online_tick(&self) {
        self()
    }
}

/// Serial task and its id
struct SerialTask {
    id: TaskId,
    task: Box<dyn AsyncTask>,
}

/// Completed item waiting for the consumer
struct OutEntry {
    id: TaskId,
    item: CompletedItem,
    queued_at: Instant,
}

/// What shutdown did with the leftovers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownReport {
    /// Completed items finalized during shutdown
    pub finalized: usize,
    /// Unfinished tasks dropped
    pub discarded: usize,
    pub finished_at: DateTime<Utc>,
}

/// Task manager for one owning subsystem
pub struct AsyncTaskManager {
    /// Owning subsystem name
    name: String,
    /// Per-context creation index, used in the thread name
    invocation: u32,
    config: ManagerConfig,
    /// Pool the work event is borrowed from
    events: Arc<EventPool>,
    /// Set between `init` and `exit`
    work_event: Mutex<Option<Arc<SignalEvent>>>,
    polling_interval_ms: AtomicU64,
    requesting_exit: AtomicBool,
    in_queue: TaskQueue<SerialTask>,
    /// Serial task between dequeue and completion. The worker takes it out
    /// while ticking; `has_active` stays set for that whole span.
    active: Mutex<Option<SerialTask>>,
    has_active: AtomicBool,
    parallel: ParallelTaskSet,
    out_queue: TaskQueue<OutEntry>,
    online_tick: Option<Box<dyn OnlineTick>>,
    event_tx: broadcast::Sender<TaskEvent>,
    worker_thread: Mutex<Option<ThreadId>>,
    consumer_thread: Mutex<Option<ThreadId>>,
    completed_total: AtomicU64,
    failed_total: AtomicU64,
}

impl AsyncTaskManager {
    pub(crate) fn new(
        name: impl Into<String>,
        invocation: u32,
        config: ManagerConfig,
        events: Arc<EventPool>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        let polling_interval_ms = config.polling_interval().as_millis() as u64;

        Self {
            name: name.into(),
            invocation,
            config,
            events,
            work_event: Mutex::new(None),
            polling_interval_ms: AtomicU64::new(polling_interval_ms),
            requesting_exit: AtomicBool::new(false),
            in_queue: TaskQueue::new(),
            active: Mutex::new(None),
            has_active: AtomicBool::new(false),
            parallel: ParallelTaskSet::new(),
            out_queue: TaskQueue::new(),
            online_tick: None,
            event_tx,
            worker_thread: Mutex::new(None),
            consumer_thread: Mutex::new(None),
            completed_total: AtomicU64::new(0),
            failed_total: AtomicU64::new(0),
        }
    }

    /// Install the per-iteration poll hook
    pub fn with_online_tick(mut self, hook: impl OnlineTick + 'static) -> Self {
        self.online_tick = Some(Box::new(hook));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name given to the worker thread
    pub fn thread_name(&self) -> String {
        format!("OnlineAsyncTaskThread {} {}", self.name, self.invocation)
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms.load(Ordering::Relaxed))
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.event_tx.subscribe()
    }

    /// Borrow the work event and read the polling interval. The worker must
    /// not start if this fails.
    pub fn init(&self) -> ManagerResult<()> {
        let mut slot = self.work_event.lock();
        if slot.is_some() {
            return Err(ManagerError::AlreadyRunning(self.name.clone()));
        }

        let event = self.events.acquire().ok_or_else(|| ManagerError::EventUnavailable {
            pool: self.events.name().to_string(),
            capacity: self.events.capacity(),
        })?;
        *slot = Some(event);

        let interval = self.config.polling_interval();
        self.polling_interval_ms
            .store(interval.as_millis() as u64, Ordering::Relaxed);
        self.requesting_exit.store(false, Ordering::Release);

        info!(
            "Initialized task manager '{}' (polling every {}ms)",
            self.name,
            interval.as_millis()
        );
        Ok(())
    }

    /// Worker thread body. Loops until `stop` is called; returns the exit
    /// code (0 on a clean stop, 1 if `init` never ran).
    pub fn run(&self) -> u32 {
        let event = match self.work_event.lock().clone() {
            Some(event) => event,
            None => {
                error!("Task manager '{}' run without init", self.name);
                return 1;
            }
        };
        *self.worker_thread.lock() = Some(thread::current().id());

        let interval = self.polling_interval();
        debug!("Task manager '{}' worker started", self.name);

        while !self.requesting_exit.load(Ordering::Acquire) {
            event.wait_timeout(interval);

            if self.requesting_exit.load(Ordering::Acquire) {
                break;
            }
            self.run_once();
        }

        info!("Task manager '{}' worker stopped", self.name);
        0
    }

    /// One worker iteration without waiting: poll hook, parallel ticks,
    /// then the serial task.
    pub fn run_once(&self) {
        if let Some(hook) = &self.online_tick {
            hook.online_tick();
        }
        self.tick_parallel_tasks();
        self.tick_serial_task();
    }

    /// Ask the worker to exit. Safe from any thread.
    pub fn stop(&self) {
        self.requesting_exit.store(true, Ordering::Release);
        self.signal_worker();
    }

    /// Return the work event to its pool. Call once, after the worker
    /// thread has been joined.
    pub fn exit(&self) {
        if let Some(event) = self.work_event.lock().take() {
            self.events.release(event);
        }
        *self.worker_thread.lock() = None;
        debug!("Task manager '{}' exited", self.name);
    }

    pub fn is_exit_requested(&self) -> bool {
        self.requesting_exit.load(Ordering::Acquire)
    }

    /// Queue a serial task. Serial tasks run one at a time in FIFO order and
    /// are initialized on the worker thread.
    pub fn add_to_in_queue(&self, task: Box<dyn AsyncTask>) -> TaskId {
        let id = TaskId::new();
        let description = task.describe();

        self.in_queue.push_back(SerialTask { id, task });
        self.emit(TaskEvent::Queued {
            id,
            description,
            mode: TaskMode::Serial,
        });
        self.signal_worker();
        id
    }

    /// Queue a closure to run once as a serial task
    pub fn add_generic_to_in_queue(
        &self,
        description: impl Into<String>,
        f: impl FnOnce() + Send + 'static,
    ) -> TaskId {
        self.add_to_in_queue(Box::new(GenericTask::once(description, f)))
    }

    /// Admit a parallel task. `initialize` runs here, on the calling thread,
    /// so it must be safe off the worker thread.
    pub fn add_to_parallel_tasks(&self, mut task: Box<dyn AsyncTask>) -> TaskId {
        let id = TaskId::new();
        let description = task.describe();

        task.initialize();
        self.emit(TaskEvent::Queued {
            id,
            description,
            mode: TaskMode::Parallel,
        });
        self.emit(TaskEvent::Started {
            id,
            mode: TaskMode::Parallel,
        });

        self.parallel.insert(id, task);
        self.signal_worker();
        id
    }

    /// Take an unfinished parallel task back. `None` if the id is unknown or
    /// the task already completed; a task that finished its last tick while
    /// being removed goes through the normal completion path instead.
    pub fn remove_from_parallel_tasks(&self, id: TaskId) -> Option<Box<dyn AsyncTask>> {
        let task = self.parallel.remove(id)?;
        if task.is_done() {
            self.complete(id, TaskMode::Parallel, task);
            return None;
        }
        debug!("Removed parallel task {} from '{}'", id, self.name);
        Some(task)
    }

    /// Hand an item straight to the consumer
    pub fn add_to_out_queue(&self, item: Box<dyn AsyncItem>) -> TaskId {
        let id = TaskId::new();
        self.emit(TaskEvent::Queued {
            id,
            description: item.describe(),
            mode: TaskMode::Event,
        });
        self.out_queue.push_back(OutEntry {
            id,
            item: CompletedItem::Event(item),
            queued_at: Instant::now(),
        });
        id
    }

    /// Run a closure on the consumer thread at the next `game_tick`
    pub fn add_generic_to_out_queue(
        &self,
        description: impl Into<String>,
        f: impl FnOnce() + Send + 'static,
    ) -> TaskId {
        self.add_to_out_queue(Box::new(GenericEvent::new(description, f)))
    }

    /// Record the calling thread as the consumer
    pub fn bind_consumer_thread(&self) {
        *self.consumer_thread.lock() = Some(thread::current().id());
    }

    /// Drain the out-queue: finalize, fire delegates and drop each item.
    /// Consumer thread only; never blocks. Returns the number of items
    /// finalized.
    pub fn game_tick(&self) -> usize {
        self.check_consumer_thread();

        let delay = self.config.debug_delay();
        let mut finalized = 0;

        while let Some(entry) = self.out_queue.pop_front() {
            if !delay.is_zero() && entry.queued_at.elapsed() < delay {
                self.out_queue.push_front(entry);
                break;
            }
            self.finalize_entry(entry);
            finalized += 1;
        }

        // Serial work waiting with nothing active: wake the worker now
        if !self.has_active_task() && !self.in_queue.is_empty() {
            self.signal_worker();
        }

        finalized
    }

    /// After the worker is joined: finalize completed items and drop every
    /// unfinished task. Finalizing is consumer work, so call this (or
    /// `ManagerThread::shutdown`) on the consumer thread.
    pub fn drain_after_shutdown(&self) -> ShutdownReport {
        if !self.on_consumer_thread() {
            debug_assert!(
                thread::panicking(),
                "drain_after_shutdown called off the consumer thread"
            );
        }
        if self.worker_thread.lock().is_some() {
            warn!(
                "Draining task manager '{}' while its worker may still be running",
                self.name
            );
        }

        let mut finalized = 0;
        for entry in self.out_queue.drain() {
            self.finalize_entry(entry);
            finalized += 1;
        }

        let mut discarded = 0;
        if let Some(serial) = self.active.lock().take() {
            self.discard(serial.id, serial.task.as_ref());
            discarded += 1;
        }
        self.has_active.store(false, Ordering::Release);

        for serial in self.in_queue.drain() {
            self.discard(serial.id, serial.task.as_ref());
            discarded += 1;
        }
        for (id, task) in self.parallel.drain() {
            self.discard(id, task.as_ref());
            discarded += 1;
        }

        info!(
            "Task manager '{}' shut down: {} finalized, {} discarded",
            self.name, finalized, discarded
        );
        ShutdownReport {
            finalized,
            discarded,
            finished_at: Utc::now(),
        }
    }

    pub fn has_active_task(&self) -> bool {
        self.has_active.load(Ordering::Acquire)
    }

    pub fn in_queue_len(&self) -> usize {
        self.in_queue.len()
    }

    pub fn parallel_len(&self) -> usize {
        self.parallel.len()
    }

    pub fn out_queue_len(&self) -> usize {
        self.out_queue.len()
    }

    /// True when nothing is queued, running or awaiting finalize
    pub fn is_idle(&self) -> bool {
        !self.has_active_task()
            && self.in_queue.is_empty()
            && self.parallel.is_empty()
            && self.out_queue.is_empty()
    }

    pub fn stats(&self) -> ManagerStats {
        ManagerStats {
            queued: self.in_queue.len(),
            active: usize::from(self.has_active_task()),
            parallel: self.parallel.len(),
            pending_finalize: self.out_queue.len(),
            completed_total: self.completed_total.load(Ordering::Relaxed),
            failed_total: self.failed_total.load(Ordering::Relaxed),
        }
    }

    fn tick_parallel_tasks(&self) {
        self.parallel.tick_each(|id, task| {
            self.complete(id, TaskMode::Parallel, task);
        });
    }

    fn tick_serial_task(&self) {
        let mut current = self.active.lock().take();

        if current.is_none() {
            if let Some(mut next) = self.in_queue.pop_front() {
                self.has_active.store(true, Ordering::Release);
                next.task.initialize();
                self.emit(TaskEvent::Started {
                    id: next.id,
                    mode: TaskMode::Serial,
                });
                current = Some(next);
            }
        }

        let Some(mut serial) = current else {
            return;
        };

        serial.task.tick();
        if serial.task.is_done() {
            // Cleared first so a consumer that finalizes this task never
            // still sees it as active
            self.has_active.store(false, Ordering::Release);
            self.complete(serial.id, TaskMode::Serial, serial.task);
        } else {
            *self.active.lock() = Some(serial);
        }
    }

    /// Log a finished task and move it to the out-queue
    fn complete(&self, id: TaskId, mode: TaskMode, task: Box<dyn AsyncTask>) {
        let description = task.describe();
        let elapsed = task.elapsed();
        let success = task.was_successful();

        if success {
            match mode {
                TaskMode::Parallel => debug!(
                    "Parallel async task '{}' succeeded in {:.3} seconds ({})",
                    description,
                    elapsed.as_secs_f64(),
                    id
                ),
                _ => info!(
                    "Async task '{}' succeeded in {:.3} seconds ({})",
                    description,
                    elapsed.as_secs_f64(),
                    id
                ),
            }
        } else {
            warn!(
                "{} async task '{}' failed in {:.3} seconds ({})",
                if mode == TaskMode::Parallel { "Parallel" } else { "Serial" },
                description,
                elapsed.as_secs_f64(),
                id
            );
            self.failed_total.fetch_add(1, Ordering::Relaxed);
        }
        self.completed_total.fetch_add(1, Ordering::Relaxed);

        self.out_queue.push_back(OutEntry {
            id,
            item: CompletedItem::Task(task),
            queued_at: Instant::now(),
        });
        self.emit(TaskEvent::Completed {
            id,
            description,
            mode,
            success,
            elapsed_ms: elapsed.as_millis() as u64,
            completed_at: Utc::now(),
        });
    }

    fn finalize_entry(&self, entry: OutEntry) {
        let OutEntry { id, mut item, .. } = entry;
        item.finalize();
        item.trigger_delegates();
        self.emit(TaskEvent::Finalized {
            id,
            description: item.describe(),
        });
    }

    fn discard(&self, id: TaskId, task: &dyn AsyncTask) {
        let description = task.describe();
        warn!(
            "Discarding unfinished task '{}' ({}) from '{}'",
            description, id, self.name
        );
        self.emit(TaskEvent::Discarded { id, description });
    }

    fn signal_worker(&self) {
        let event = self.work_event.lock().clone();
        if let Some(event) = event {
            event.trigger();
        }
    }

    fn check_consumer_thread(&self) {
        if !self.on_consumer_thread() {
            debug_assert!(false, "game_tick called off the consumer thread");
        }
    }

    /// Binds the consumer on first use. Logs and returns false for the worker
    /// thread or any thread other than the bound consumer.
    fn on_consumer_thread(&self) -> bool {
        let current = thread::current().id();

        if *self.worker_thread.lock() == Some(current) {
            error!("Consumer work called on the worker thread of '{}'", self.name);
            return false;
        }

        let mut consumer = self.consumer_thread.lock();
        match *consumer {
            None => {
                *consumer = Some(current);
                true
            }
            Some(owner) if owner != current => {
                error!(
                    "Consumer work for '{}' called off its consumer thread",
                    self.name
                );
                false
            }
            Some(_) => true,
        }
    }

    fn emit(&self, event: TaskEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }
}

impl Drop for AsyncTaskManager {
    fn drop(&mut self) {
        if let Some(event) = self.work_event.get_mut().take() {
            self.events.release(event);
        }

        let leftover = self.in_queue.len()
            + self.parallel.len()
            + self.out_queue.len()
            + usize::from(self.active.get_mut().is_some());
        if leftover > 0 {
            warn!(
                "Task manager '{}' dropped with {} task(s) never finalized",
                self.name, leftover
            );
        }
    }
}
