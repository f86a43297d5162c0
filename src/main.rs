//! CLI entry point for taskpump
//!
//! Runs simulated workloads through a task manager and prints a JSON report.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;
use std::time::Duration;

use taskpump::commands::{self, PumpOptions};
use taskpump::{ManagerConfig, TaskContext};

#[derive(Parser, Debug)]
#[command(name = "taskpump", version, about = "Drive simulated work through the async task manager")]
struct Cli {
    /// TOML file with an [async_task_manager] table
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the worker polling interval
    #[arg(long)]
    polling_interval_ms: Option<u64>,

    /// Consumer frame time between game ticks
    #[arg(long, default_value_t = 16)]
    frame_ms: u64,

    /// Abort the scenario after this many seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Log every task lifecycle event (at debug level)
    #[arg(long)]
    trace_events: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serial tasks run one at a time
    Serial {
        #[arg(long, default_value_t = 3)]
        count: usize,
        #[arg(long, default_value_t = 3)]
        ticks: usize,
    },
    /// Parallel tasks ticked together
    Parallel {
        #[arg(long, default_value_t = 5)]
        count: usize,
        #[arg(long, default_value_t = 5)]
        max_ticks: usize,
    },
    /// Many producer threads queueing at once
    Stress {
        #[arg(long, default_value_t = 4)]
        producers: usize,
        #[arg(long, default_value_t = 100)]
        tasks: usize,
    },
    /// Serial and parallel work with periodic failures
    Mixed {
        #[arg(long, default_value_t = 4)]
        serial: usize,
        #[arg(long, default_value_t = 4)]
        parallel: usize,
        #[arg(long, default_value_t = 3)]
        fail_every: usize,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ManagerConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ManagerConfig::default(),
    };
    if let Some(ms) = cli.polling_interval_ms {
        config = config.with_polling_interval_ms(ms);
    }
    info!("Polling interval: {:?}", config.polling_interval());

    let context = TaskContext::from_config("taskpump", &config);
    let options = PumpOptions {
        frame: Duration::from_millis(cli.frame_ms),
        timeout: Duration::from_secs(cli.timeout_secs),
        trace_events: cli.trace_events,
    };

    let report = match cli.command {
        Command::Serial { count, ticks } => {
            commands::run_serial(&context, config, count, ticks, &options)?
        }
        Command::Parallel { count, max_ticks } => {
            commands::run_parallel(&context, config, count, max_ticks, &options)?
        }
        Command::Stress { producers, tasks } => {
            commands::run_stress(&context, config, producers, tasks, &options)?
        }
        Command::Mixed {
            serial,
            parallel,
            fail_every,
        } => commands::run_mixed(&context, config, serial, parallel, fail_every, &options)?,
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
