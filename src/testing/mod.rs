//! End-to-end scenarios and the runner that executes them
//!
//! Built-in scenarios live in [`scenarios`]; extra ones can be described in
//! YAML (see [`config`]). The runner gives each scenario its own emulator
//! process and turns every failure, panics included, into a `FAIL` line.

mod config;
mod runner;
pub mod scenarios;

pub use config::*;
pub use runner::{run_all, RunSummary, TestResult};
pub use scenarios::Scenario;
