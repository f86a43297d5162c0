//! Basic Task Building Blocks
//!
//! Shared bookkeeping for task implementations and closure-driven tasks
//! for callers that do not want a dedicated type.

use std::time::{Duration, Instant};
use tokio::sync::oneshot;

use super::types::{AsyncItem, AsyncTask, TaskOutcome};

/// Completion callback fired on the consumer thread
pub type Delegate = Box<dyn FnOnce(&TaskOutcome) + Send>;

/// Start time plus done/success flags
#[derive(Debug, Clone)]
pub struct TaskState {
    started: Instant,
    done: bool,
    success: bool,
}

impl TaskState {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            done: false,
            success: false,
        }
    }

    /// Restart the clock; called from `initialize`
    pub fn restart(&mut self) {
        self.started = Instant::now();
    }

    /// Mark done with the given outcome
    pub fn complete(&mut self, success: bool) {
        self.done = true;
        self.success = success;
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn was_successful(&self) -> bool {
        self.success
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Default for TaskState {
    fn default() -> Self {
        Self::new()
    }
}

/// What a generic task's tick closure reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStep {
    Pending,
    Succeeded,
    Failed,
}

/// Task driven by closures
pub struct GenericTask {
    description: String,
    state: TaskState,
    tick_fn: Box<dyn FnMut() -> TaskStep + Send>,
    on_initialize: Option<Box<dyn FnOnce() + Send>>,
    on_finalize: Option<Box<dyn FnOnce(bool) + Send>>,
    delegates: Vec<Delegate>,
}

impl GenericTask {
    /// Create a task that ticks `tick_fn` until it stops returning `Pending`
    pub fn new(
        description: impl Into<String>,
        tick_fn: impl FnMut() -> TaskStep + Send + 'static,
    ) -> Self {
        Self {
            description: description.into(),
            state: TaskState::new(),
            tick_fn: Box::new(tick_fn),
            on_initialize: None,
            on_finalize: None,
            delegates: Vec::new(),
        }
    }

    /// Create a task that runs `f` once on its first tick
    pub fn once(description: impl Into<String>, f: impl FnOnce() + Send + 'static) -> Self {
        let mut f = Some(f);
        Self::new(description, move || {
            if let Some(f) = f.take() {
                f();
            }
            TaskStep::Succeeded
        })
    }

    /// Run `f` during `initialize`
    pub fn on_initialize(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_initialize = Some(Box::new(f));
        self
    }

    /// Run `f` during `finalize` with the success flag
    pub fn on_finalize(mut self, f: impl FnOnce(bool) + Send + 'static) -> Self {
        self.on_finalize = Some(Box::new(f));
        self
    }

    /// Add a completion delegate
    pub fn on_complete(mut self, delegate: impl FnOnce(&TaskOutcome) + Send + 'static) -> Self {
        self.delegates.push(Box::new(delegate));
        self
    }

    /// Add a boxed completion delegate
    pub fn with_delegate(mut self, delegate: Delegate) -> Self {
        self.delegates.push(delegate);
        self
    }
}

impl AsyncItem for GenericTask {
    fn describe(&self) -> String {
        self.description.clone()
    }

    fn elapsed(&self) -> Duration {
        self.state.elapsed()
    }

    fn finalize(&mut self) {
        if let Some(f) = self.on_finalize.take() {
            f(self.state.was_successful());
        }
    }

    fn trigger_delegates(&mut self) {
        let outcome = TaskOutcome {
            description: self.description.clone(),
            success: self.state.was_successful(),
            elapsed: self.state.elapsed(),
        };
        for delegate in self.delegates.drain(..) {
            delegate(&outcome);
        }
    }
}

impl AsyncTask for GenericTask {
    fn initialize(&mut self) {
        self.state.restart();
        if let Some(f) = self.on_initialize.take() {
            f();
        }
    }

    fn tick(&mut self) {
        if self.state.is_done() {
            return;
        }
        match (self.tick_fn)() {
            TaskStep::Pending => {}
            TaskStep::Succeeded => self.state.complete(true),
            TaskStep::Failed => self.state.complete(false),
        }
    }

    fn is_done(&self) -> bool {
        self.state.is_done()
    }

    fn was_successful(&self) -> bool {
        self.state.was_successful()
    }
}

/// Out-queue-only item that runs a closure on the consumer thread
pub struct GenericEvent {
    description: String,
    created: Instant,
    callback: Option<Box<dyn FnOnce() + Send>>,
}

impl GenericEvent {
    pub fn new(description: impl Into<String>, callback: impl FnOnce() + Send + 'static) -> Self {
        Self {
            description: description.into(),
            created: Instant::now(),
            callback: Some(Box::new(callback)),
        }
    }
}

impl AsyncItem for GenericEvent {
    fn describe(&self) -> String {
        self.description.clone()
    }

    fn elapsed(&self) -> Duration {
        self.created.elapsed()
    }

    fn trigger_delegates(&mut self) {
        if let Some(callback) = self.callback.take() {
            callback();
        }
    }
}

/// Delegate that forwards the outcome to a oneshot receiver, so async code
/// can await a task driven by the manager.
pub fn completion_channel() -> (Delegate, oneshot::Receiver<TaskOutcome>) {
    let (tx, rx) = oneshot::channel();
    let delegate: Delegate = Box::new(move |outcome: &TaskOutcome| {
        let _ = tx.send(outcome.clone());
    });
    (delegate, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_task_state() {
        let mut state = TaskState::new();
        assert!(!state.is_done());
        assert!(!state.was_successful());

        state.complete(false);
        assert!(state.is_done());
        assert!(!state.was_successful());
    }

    #[test]
    fn test_generic_task_lifecycle() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let initialized = Arc::new(AtomicUsize::new(0));
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = ticks.clone();
        let init = initialized.clone();
        let delegate_hits = fired.clone();
        let mut task = GenericTask::new("Countdown", move || {
            if counter.fetch_add(1, Ordering::SeqCst) + 1 >= 2 {
                TaskStep::Succeeded
            } else {
                TaskStep::Pending
            }
        })
        .on_initialize(move || {
            init.fetch_add(1, Ordering::SeqCst);
        })
        .on_complete(move |outcome| {
            assert!(outcome.success);
            delegate_hits.fetch_add(1, Ordering::SeqCst);
        });

        task.initialize();
        task.tick();
        assert!(!task.is_done());
        task.tick();
        assert!(task.is_done());
        assert!(task.was_successful());

        // Ticks after completion are ignored
        task.tick();
        assert_eq!(ticks.load(Ordering::SeqCst), 2);

        task.finalize();
        task.trigger_delegates();
        task.trigger_delegates();
        assert_eq!(initialized.load(Ordering::SeqCst), 1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_generic_task_failure_reaches_finalize() {
        let seen = Arc::new(AtomicUsize::new(0));
        let flag = seen.clone();
        let mut task = GenericTask::new("Doomed", || TaskStep::Failed).on_finalize(move |success| {
            assert!(!success);
            flag.fetch_add(1, Ordering::SeqCst);
        });

        task.initialize();
        task.tick();
        assert!(task.is_done());
        assert!(!task.was_successful());
        task.finalize();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_completion_channel() {
        let (delegate, mut rx) = completion_channel();
        let mut task = GenericTask::once("Ping", || {}).with_delegate(delegate);

        task.initialize();
        task.tick();
        task.trigger_delegates();

        let outcome = rx.try_recv().unwrap();
        assert_eq!(outcome.description, "Ping");
        assert!(outcome.success);
    }

    #[test]
    fn test_generic_event_runs_once() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let mut event = GenericEvent::new("Presence update", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        event.finalize();
        event.trigger_delegates();
        event.trigger_delegates();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(event.describe(), "Presence update");
    }
}
