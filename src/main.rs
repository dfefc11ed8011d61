//! emu-harness - end-to-end test harness for the konCePCja emulator
//!
//! Spawns the emulator, drives it over its IPC protocol and reports
//! PASS/FAIL per scenario. Exit status is 0 only if every scenario passed.

use clap::Parser;
use emu_harness::commands::{Commands, GlobalArgs, RunArgs};
use emu_harness::common::{config::Config, logging};
use emu_harness::{cli, Result};

#[derive(Parser)]
#[command(name = "emu-harness", about = "End-to-end test harness for the konCePCja emulator")]
#[command(version, long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.global.verbose);

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let mut config = Config::load(cli.global.config.as_deref())?;
    cli.global.apply(&mut config);
    tracing::debug!(?config, "Loaded configuration");

    let command = cli.command.unwrap_or(Commands::Run(RunArgs::default()));
    cli::dispatch(command, &config).await
}
