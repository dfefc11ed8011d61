//! IPC communication with the emulator
//!
//! Line-oriented text protocol over loopback TCP, one connection per
//! command.

pub mod client;
pub mod protocol;
pub mod transport;

pub use client::EmulatorClient;
pub use protocol::{Command, RegisterSnapshot, Reply};
pub use transport::ConnectionTarget;
