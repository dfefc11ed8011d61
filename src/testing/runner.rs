//! Test runner implementation
//!
//! Runs built-in scenarios and YAML scripts one after another, each inside
//! its own supervisor session. A failing or panicking scenario is recorded
//! and the run moves on.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::time::Duration;

use colored::Colorize;
use futures_util::FutureExt;
use serde::Serialize;

use crate::common::config::Config;
use crate::common::{parse_hex, to_hex, Error, Result};
use crate::supervisor::{with_session, Supervisor};

use super::config::{CommandExpectation, RegisterAssertion, TestScenario, TestStep};
use super::scenarios::Scenario;

const BANNER_WIDTH: usize = 50;
const BANNER_TITLE: &str = "konCePCja IPC Test Harness";

/// Result of one scenario
#[derive(Debug, Clone, Serialize)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate over a whole run
#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<TestResult>,
}

impl RunSummary {
    fn record(&mut self, result: TestResult) {
        if result.passed {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
        self.results.push(result);
    }

    /// Process exit status: 0 only when nothing failed
    pub fn exit_code(&self) -> i32 {
        if self.failed == 0 {
            0
        } else {
            1
        }
    }
}

/// Run the given built-in scenarios, then the scripts, in order
pub async fn run_all(config: &Config, scenarios: &[Scenario], scripts: &[PathBuf]) -> RunSummary {
    let rule = "=".repeat(BANNER_WIDTH);
    println!("{}", rule);
    println!("{}", BANNER_TITLE.bold());
    println!("{}", rule);

    let mut summary = RunSummary::default();

    for scenario in scenarios {
        println!("\nRunning {}...", scenario.title);
        let outcome = AssertUnwindSafe(with_session(config, scenario.run))
            .catch_unwind()
            .await;
        summary.record(report(scenario.name, scenario.title, outcome));
    }

    for path in scripts {
        let name = path.display().to_string();
        let script = match TestScenario::load(path) {
            Ok(script) => script,
            Err(e) => {
                println!("\nRunning {}...", name);
                summary.record(report(&name, &name, Ok(Err(e))));
                continue;
            }
        };

        println!("\nRunning {}...", script.name);
        if let Some(desc) = &script.description {
            println!("  {}", desc.dimmed());
        }
        let title = script.name.clone();
        let outcome = AssertUnwindSafe(run_script(config, script, path))
            .catch_unwind()
            .await;
        summary.record(report(&title, &title, outcome));
    }

    println!("\n{}", rule);
    println!(
        "Results: {} passed, {} failed",
        summary.passed.to_string().green(),
        summary.failed.to_string().red()
    );
    summary
}

/// Print the PASS/FAIL line for one scenario and build its result
fn report(
    name: &str,
    title: &str,
    outcome: std::result::Result<Result<()>, Box<dyn Any + Send>>,
) -> TestResult {
    let error = match outcome {
        Ok(Ok(())) => {
            println!("{} {}", "PASS:".green().bold(), title);
            None
        }
        Ok(Err(e)) => {
            println!("{} {}", "FAIL:".red().bold(), e);
            Some(e.to_string())
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            println!("{} {} raised {}", "FAIL:".red().bold(), name, message);
            Some(format!("{} raised {}", name, message))
        }
    };

    TestResult {
        name: name.to_string(),
        passed: error.is_none(),
        error,
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

/// Run one YAML scenario in its own session
async fn run_script(config: &Config, script: TestScenario, path: &Path) -> Result<()> {
    tracing::debug!(path = %path.display(), steps = script.steps.len(), "Running script");
    with_session(config, move |emu| {
        Box::pin(async move { execute_script(emu, &script).await })
    })
    .await
}

async fn execute_script(emu: &mut Supervisor, script: &TestScenario) -> Result<()> {
    let headless = script
        .launch
        .headless
        .unwrap_or(emu.config().emulator.headless);
    let args: Vec<&str> = script.launch.args.iter().map(String::as_str).collect();
    if !emu.start(&args, headless).await {
        return Err(Error::scenario("Could not start emulator"));
    }

    for (i, step) in script.steps.iter().enumerate() {
        let step_num = i + 1;
        execute_step(emu, step)
            .await
            .map_err(|e| Error::scenario(format!("Step {}: {}", step_num, e)))?;
        println!("  {} Step {}: {}", "✓".green(), step_num, describe(step).dimmed());
    }
    Ok(())
}

fn describe(step: &TestStep) -> String {
    match step {
        TestStep::Command { command, .. } => command.clone(),
        TestStep::Sleep { ms } => format!("sleep {}ms", ms),
        TestStep::Registers { asserts } => format!("check {} register(s)", asserts.len()),
        TestStep::Memory { address, bytes } => {
            format!("check memory at 0x{:04X} = {}", address, bytes)
        }
    }
}

/// Execute a single test step
async fn execute_step(emu: &mut Supervisor, step: &TestStep) -> Result<()> {
    match step {
        TestStep::Command { command, expect } => {
            execute_command_step(emu, command, expect.as_ref()).await
        }
        TestStep::Sleep { ms } => {
            tokio::time::sleep(Duration::from_millis(*ms)).await;
            Ok(())
        }
        TestStep::Registers { asserts } => execute_registers_step(emu, asserts).await,
        TestStep::Memory { address, bytes } => execute_memory_step(emu, *address, bytes).await,
    }
}

async fn execute_command_step(
    emu: &mut Supervisor,
    command: &str,
    expect: Option<&CommandExpectation>,
) -> Result<()> {
    let reply = emu.ipc().send_command(command).await;

    let should_succeed = expect.and_then(|e| e.success).unwrap_or(true);
    if reply.success != should_succeed {
        return Err(Error::scenario(format!(
            "Command '{}' expected success={}, got: {}",
            command, should_succeed, reply.text
        )));
    }

    let Some(exp) = expect else {
        return Ok(());
    };
    let text = reply.text.to_lowercase();

    if let Some(needle) = &exp.contains {
        if !text.contains(&needle.to_lowercase()) {
            return Err(Error::scenario(format!(
                "Reply to '{}' does not contain '{}': {}",
                command, needle, reply.text
            )));
        }
    }
    if let Some(needle) = &exp.absent {
        if text.contains(&needle.to_lowercase()) {
            return Err(Error::scenario(format!(
                "Reply to '{}' unexpectedly contains '{}': {}",
                command, needle, reply.text
            )));
        }
    }
    Ok(())
}

async fn execute_registers_step(emu: &mut Supervisor, asserts: &[RegisterAssertion]) -> Result<()> {
    let regs = emu
        .ipc()
        .get_regs()
        .await
        .ok_or_else(|| Error::scenario("Could not read registers"))?;

    for assertion in asserts {
        let actual = regs
            .get(&assertion.name)
            .ok_or_else(|| Error::scenario(format!("Register {} missing", assertion.name)))?;
        if let Some(expected) = assertion.value {
            if actual != expected {
                return Err(Error::scenario(format!(
                    "Register {} expected 0x{:04X}, got 0x{:04X}",
                    assertion.name, expected, actual
                )));
            }
        }
    }
    Ok(())
}

async fn execute_memory_step(emu: &mut Supervisor, address: u16, bytes: &str) -> Result<()> {
    let expected = parse_hex(bytes)?;
    if expected.is_empty() {
        return Err(Error::scenario("Memory step needs at least one byte"));
    }

    let actual = emu.ipc().read_bytes(address, expected.len() as u32).await?;
    if actual != expected {
        return Err(Error::scenario(format!(
            "Memory at 0x{:04X} expected {}, got {}",
            address,
            to_hex(&expected),
            to_hex(&actual)
        )));
    }
    Ok(())
}
