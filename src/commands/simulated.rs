//! Simulated Workload
//!
//! Tasks that complete after a fixed number of ticks, used by the CLI
//! scenarios.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::tasks::{AsyncItem, AsyncTask, TaskState};

/// Shared success/failure counters filled in by task delegates
#[derive(Debug, Default)]
pub struct Tally {
    pub succeeded: AtomicUsize,
    pub failed: AtomicUsize,
}

impl Tally {
    pub fn finished(&self) -> usize {
        self.succeeded.load(Ordering::SeqCst) + self.failed.load(Ordering::SeqCst)
    }
}

/// Completes after `ticks` ticks, optionally reporting failure
pub struct SimulatedTask {
    label: String,
    remaining: usize,
    fail: bool,
    state: TaskState,
    tally: Arc<Tally>,
}

impl SimulatedTask {
    pub fn new(label: impl Into<String>, ticks: usize, tally: Arc<Tally>) -> Self {
        Self {
            label: label.into(),
            remaining: ticks.max(1),
            fail: false,
            state: TaskState::new(),
            tally,
        }
    }

    pub fn failing(mut self, fail: bool) -> Self {
        self.fail = fail;
        self
    }
}

impl AsyncItem for SimulatedTask {
    fn describe(&self) -> String {
        format!("SimulatedTask {} ({} ticks left)", self.label, self.remaining)
    }

    fn elapsed(&self) -> Duration {
        self.state.elapsed()
    }

    fn trigger_delegates(&mut self) {
        let counter = if self.state.was_successful() {
            &self.tally.succeeded
        } else {
            &self.tally.failed
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

impl AsyncTask for SimulatedTask {
    fn initialize(&mut self) {
        self.state.restart();
    }

    fn tick(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.state.complete(!self.fail);
        }
    }

    fn is_done(&self) -> bool {
        self.state.is_done()
    }

    fn was_successful(&self) -> bool {
        self.state.was_successful()
    }
}

/// Deterministic spread of tick counts in `1..=max`
pub fn spread_ticks(index: usize, max: usize) -> usize {
    (index * 7 + 3) % max.max(1) + 1
}
