//! CLI command definitions
//!
//! Defines the clap commands for the harness CLI.

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::common::config::Config;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the built-in scenarios, then any YAML scripts (default)
    Run(RunArgs),

    /// List the built-in scenarios
    List,

    /// Send one raw command to an already running emulator
    Send {
        /// Command line, e.g. `bp list` or `mem read 0x4000 16`
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Only run this built-in scenario (repeatable)
    #[arg(long = "scenario", value_name = "NAME")]
    pub scenarios: Vec<String>,

    /// Run a YAML scenario file after the built-ins (repeatable)
    #[arg(long = "script", value_name = "FILE")]
    pub scripts: Vec<PathBuf>,

    /// Print the run summary as JSON after the banner
    #[arg(long)]
    pub json: bool,
}

/// Options shared by every command
#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// Configuration file (default: platform config dir)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// IPC host
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// IPC port
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Emulator executable
    #[arg(long, global = true, value_name = "PATH")]
    pub emulator: Option<PathBuf>,

    /// Show the emulator window and enable audio
    #[arg(long, global = true)]
    pub visible: bool,

    /// Debug logging
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

impl GlobalArgs {
    /// Apply command-line overrides on top of the loaded config
    pub fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.connection.host = host.clone();
        }
        if let Some(port) = self.port {
            config.connection.port = port;
        }
        if let Some(emulator) = &self.emulator {
            config.emulator.executable = Some(emulator.clone());
        }
        if self.visible {
            config.emulator.headless = false;
        }
    }
}
