//! Signal Events
//!
//! Auto-reset wait/signal event and the bounded pool events are borrowed
//! from.

use log::debug;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Auto-reset event: one `trigger` releases one wait, or the next wait if
/// nobody is waiting yet.
pub struct SignalEvent {
    signaled: Mutex<bool>,
    cond: Condvar,
}

impl SignalEvent {
    fn new() -> Self {
        Self {
            signaled: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    pub fn trigger(&self) {
        let mut signaled = self.signaled.lock();
        *signaled = true;
        self.cond.notify_one();
    }

    /// Block until triggered or `timeout` passes. Returns whether the event
    /// was triggered; the signal is consumed either way.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut signaled = self.signaled.lock();
        while !*signaled {
            if self.cond.wait_until(&mut signaled, deadline).timed_out() {
                break;
            }
        }
        std::mem::replace(&mut *signaled, false)
    }

    pub fn reset(&self) {
        *self.signaled.lock() = false;
    }
}

struct PoolState {
    free: Vec<Arc<SignalEvent>>,
    live: usize,
}

/// Bounded source of signal events
pub struct EventPool {
    name: String,
    capacity: usize,
    state: Mutex<PoolState>,
}

impl EventPool {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity,
            state: Mutex::new(PoolState {
                free: Vec::new(),
                live: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Events currently handed out
    pub fn live(&self) -> usize {
        self.state.lock().live
    }

    /// Borrow an event; `None` when the pool is exhausted
    pub fn acquire(&self) -> Option<Arc<SignalEvent>> {
        let mut state = self.state.lock();
        if state.live >= self.capacity {
            return None;
        }
        state.live += 1;
        let event = state.free.pop().unwrap_or_else(|| Arc::new(SignalEvent::new()));
        debug!("Event pool '{}': acquired ({}/{})", self.name, state.live, self.capacity);
        Some(event)
    }

    /// Return an event for reuse
    pub fn release(&self, event: Arc<SignalEvent>) {
        event.reset();
        let mut state = self.state.lock();
        state.live = state.live.saturating_sub(1);
        state.free.push(event);
        debug!("Event pool '{}': released ({}/{})", self.name, state.live, self.capacity);
    }
}
