pub mod simulated;
pub mod tasks;

pub use tasks::{run_mixed, run_parallel, run_serial, run_stress, PumpOptions, ScenarioReport};
