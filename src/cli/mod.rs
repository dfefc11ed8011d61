//! CLI command handling
//!
//! Dispatches CLI commands and formats their output. Each handler returns
//! the process exit status.

use colored::Colorize;

use crate::commands::{Commands, RunArgs};
use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::ipc::EmulatorClient;
use crate::testing::{self, scenarios, Scenario};

/// Dispatch a CLI command
pub async fn dispatch(command: Commands, config: &Config) -> Result<i32> {
    match command {
        Commands::Run(args) => run(args, config).await,

        Commands::List => {
            for scenario in scenarios::builtin() {
                println!("{:<12} {}", scenario.name.bold(), scenario.description);
            }
            Ok(0)
        }

        Commands::Send { command } => {
            let line = command.join(" ");
            let client = EmulatorClient::from_config(config);
            let reply = client.send_command(&line).await;

            if reply.success {
                println!("{}", reply.text);
                Ok(0)
            } else {
                println!("{}", reply.text.red());
                Ok(1)
            }
        }
    }
}

async fn run(args: RunArgs, config: &Config) -> Result<i32> {
    let selected = select(&args.scenarios)?;
    let summary = testing::run_all(config, &selected, &args.scripts).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }
    Ok(summary.exit_code())
}

/// Resolve `--scenario` names, keeping declaration order; empty means all
fn select(names: &[String]) -> Result<Vec<Scenario>> {
    for name in names {
        if scenarios::find(name).is_none() {
            return Err(Error::InvalidArgument(format!(
                "Unknown scenario '{}'. Use 'emu-harness list' to see available scenarios",
                name
            )));
        }
    }

    Ok(scenarios::builtin()
        .iter()
        .filter(|s| names.is_empty() || names.iter().any(|n| n == s.name))
        .copied()
        .collect())
}
