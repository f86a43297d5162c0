//! Task Commands
//!
//! Scenario commands behind the CLI: each one starts a manager thread,
//! submits simulated work and pumps `game_tick` from the calling thread
//! until every task has been finalized.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::{self, error::RecvError};

use super::simulated::{spread_ticks, SimulatedTask, Tally};
use crate::config::ManagerConfig;
use crate::context::TaskContext;
use crate::tasks::{AsyncTaskManager, ManagerStats, ManagerThread, ShutdownReport, TaskEvent};

/// How the consumer loop is paced
#[derive(Debug, Clone)]
pub struct PumpOptions {
    /// Sleep between `game_tick` calls
    pub frame: Duration,
    /// Give up after this long
    pub timeout: Duration,
    /// Log every lifecycle event
    pub trace_events: bool,
}

impl Default for PumpOptions {
    fn default() -> Self {
        Self {
            frame: Duration::from_millis(16),
            timeout: Duration::from_secs(30),
            trace_events: false,
        }
    }
}

/// Scenario result printed by the CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub scenario: String,
    pub submitted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub frames: u64,
    pub elapsed_ms: u64,
    pub stats: ManagerStats,
    pub shutdown: ShutdownReport,
    pub started_at: DateTime<Utc>,
}

/// Serial tasks, each taking `ticks` worker iterations
pub fn run_serial(
    context: &TaskContext,
    config: ManagerConfig,
    count: usize,
    ticks: usize,
    options: &PumpOptions,
) -> Result<ScenarioReport> {
    run_scenario("serial", context, config, options, |manager, tally| {
        for i in 0..count {
            let task = SimulatedTask::new(format!("serial-{}", i), ticks, tally.clone());
            manager.add_to_in_queue(Box::new(task));
        }
        count
    })
}

/// Parallel tasks with tick counts spread over `1..=max_ticks`
pub fn run_parallel(
    context: &TaskContext,
    config: ManagerConfig,
    count: usize,
    max_ticks: usize,
    options: &PumpOptions,
) -> Result<ScenarioReport> {
    run_scenario("parallel", context, config, options, |manager, tally| {
        for i in 0..count {
            let task = SimulatedTask::new(
                format!("parallel-{}", i),
                spread_ticks(i, max_ticks),
                tally.clone(),
            );
            manager.add_to_parallel_tasks(Box::new(task));
        }
        count
    })
}

/// `producers` threads each queue `tasks` single-tick serial tasks at once
pub fn run_stress(
    context: &TaskContext,
    config: ManagerConfig,
    producers: usize,
    tasks: usize,
    options: &PumpOptions,
) -> Result<ScenarioReport> {
    run_scenario("stress", context, config, options, |manager, tally| {
        thread::scope(|scope| {
            for p in 0..producers {
                let tally = tally.clone();
                scope.spawn(move || {
                    for i in 0..tasks {
                        let task = SimulatedTask::new(format!("stress-{}-{}", p, i), 1, tally.clone());
                        manager.add_to_in_queue(Box::new(task));
                    }
                });
            }
        });
        producers * tasks
    })
}

/// Serial and parallel work together, every `fail_every`-th task failing
pub fn run_mixed(
    context: &TaskContext,
    config: ManagerConfig,
    serial: usize,
    parallel: usize,
    fail_every: usize,
    options: &PumpOptions,
) -> Result<ScenarioReport> {
    let fails = move |n: usize| fail_every > 0 && (n + 1) % fail_every == 0;

    run_scenario("mixed", context, config, options, |manager, tally| {
        for i in 0..serial {
            let task = SimulatedTask::new(format!("mixed-serial-{}", i), 2, tally.clone())
                .failing(fails(i));
            manager.add_to_in_queue(Box::new(task));
        }
        for i in 0..parallel {
            let n = serial + i;
            let task = SimulatedTask::new(format!("mixed-parallel-{}", i), spread_ticks(i, 5), tally.clone())
                .failing(fails(n));
            manager.add_to_parallel_tasks(Box::new(task));
        }
        serial + parallel
    })
}

fn run_scenario(
    scenario: &str,
    context: &TaskContext,
    config: ManagerConfig,
    options: &PumpOptions,
    submit: impl FnOnce(&AsyncTaskManager, &Arc<Tally>) -> usize,
) -> Result<ScenarioReport> {
    let started_at = Utc::now();
    let start = Instant::now();

    let manager = Arc::new(context.create_manager(scenario, config));
    if options.trace_events {
        spawn_event_logger(&manager);
    }
    manager.bind_consumer_thread();

    let worker = ManagerThread::spawn(manager.clone())
        .with_context(|| format!("failed to start worker for '{}'", scenario))?;

    let tally = Arc::new(Tally::default());
    let submitted = submit(&manager, &tally);
    info!("Scenario '{}': submitted {} task(s)", scenario, submitted);

    let mut frames = 0u64;
    while tally.finished() < submitted {
        if start.elapsed() > options.timeout {
            let stats = manager.stats();
            worker.shutdown()?;
            bail!(
                "scenario '{}' timed out after {:?} ({} of {} finished, stats {:?})",
                scenario,
                options.timeout,
                tally.finished(),
                submitted,
                stats
            );
        }
        manager.game_tick();
        frames += 1;
        thread::sleep(options.frame);
    }

    let stats = manager.stats();
    let shutdown = worker.shutdown()?;

    Ok(ScenarioReport {
        scenario: scenario.to_string(),
        submitted,
        succeeded: tally.succeeded.load(Ordering::SeqCst),
        failed: tally.failed.load(Ordering::SeqCst),
        frames,
        elapsed_ms: start.elapsed().as_millis() as u64,
        stats,
        shutdown,
        started_at,
    })
}

/// Log lifecycle events from a background thread until the manager is gone
pub fn spawn_event_logger(manager: &AsyncTaskManager) {
    let rx = manager.subscribe();

    thread::spawn(move || {
        forward_events(rx, |event| match serde_json::to_string(event) {
            Ok(payload) => debug!("{} {}", event.event_name(), payload),
            Err(e) => debug!("{} <unserializable: {}>", event.event_name(), e),
        });
    });
}

/// Feed received events to `on_event` until the channel closes. A lagging
/// receiver skips ahead instead of stopping. Returns the number delivered.
fn forward_events(
    mut rx: broadcast::Receiver<TaskEvent>,
    mut on_event: impl FnMut(&TaskEvent),
) -> usize {
    let mut delivered = 0;
    loop {
        match rx.blocking_recv() {
            Ok(event) => {
                on_event(&event);
                delivered += 1;
            }
            Err(RecvError::Lagged(skipped)) => {
                debug!("Event logger lagged, skipped {} event(s)", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }
    delivered
}
