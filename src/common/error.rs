//! Error types for the emulator harness
//!
//! Transport errors are folded into failed replies by the client layer;
//! the variants here are what the lower layers propagate with `?`.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    // === Transport Errors ===
    /// Rendered verbatim as the reply text of a timed out request
    #[error("Timeout")]
    Timeout,

    #[error("{0}")]
    Transport(#[source] io::Error),

    #[error("Invalid command line: {0}")]
    InvalidCommand(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // === Protocol Errors ===
    #[error("Command '{command}' failed: {reply}")]
    CommandFailed { command: String, reply: String },

    #[error("Malformed register token '{0}'")]
    MalformedRegister(String),

    #[error("Malformed reply: {0}")]
    MalformedReply(String),

    // === Emulator Process Errors ===
    #[error("Emulator executable not found: {0}. Set [emulator] executable or pass --emulator")]
    EmulatorNotFound(String),

    #[error("Failed to spawn emulator: {0}")]
    EmulatorSpawnFailed(String),

    #[error("Emulator IPC server not reachable after {attempts} attempts")]
    EmulatorNotReady { attempts: u32 },

    #[error("Emulator already running (pid {0:?}). Call stop() first")]
    EmulatorAlreadyRunning(Option<u32>),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Test Errors ===
    /// Scenario assertion failure, rendered as the bare reason
    #[error("{0}")]
    ScenarioFailed(String),

    #[error("Invalid test scenario: {0}")]
    ScenarioParse(String),
}

impl Error {
    /// Create a command failed error from the command line and its reply
    pub fn command_failed(command: &str, reply: &str) -> Self {
        Self::CommandFailed {
            command: command.to_string(),
            reply: reply.to_string(),
        }
    }

    /// Create a scenario assertion failure
    pub fn scenario<S: Into<String>>(reason: S) -> Self {
        Self::ScenarioFailed(reason.into())
    }
}
