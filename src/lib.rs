//! emu-harness - end-to-end test harness for the konCePCja emulator
//!
//! This library provides the IPC client for the emulator's line protocol,
//! process supervision for emulator instances, and the scenario runner.

pub mod cli;
pub mod commands;
pub mod common;
pub mod ipc;
pub mod supervisor;
pub mod testing;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use ipc::{Command, EmulatorClient, RegisterSnapshot, Reply};
pub use supervisor::{with_session, Supervisor};
