//! Emulator IPC client
//!
//! Every method opens its own connection; nothing is pooled. Transport
//! faults never escape: they come back as failed [`Reply`] values whose text
//! is `Timeout` or the fault description.

use std::path::Path;
use std::time::Duration;

use crate::common::config::Config;
use crate::common::{Error, Result};

use super::protocol::{self, Command, RegisterSnapshot, Reply};
use super::transport::{self, ConnectionTarget};

/// Client for the emulator's line protocol
#[derive(Debug, Clone)]
pub struct EmulatorClient {
    target: ConnectionTarget,
    strict_registers: bool,
}

impl EmulatorClient {
    pub fn new(target: ConnectionTarget) -> Self {
        Self {
            target,
            strict_registers: false,
        }
    }

    /// Build a client from the `[connection]` and `[client]` config sections
    pub fn from_config(config: &Config) -> Self {
        let target = ConnectionTarget::new(
            config.connection.host.clone(),
            config.connection.port,
            config.connection.timeout(),
        );
        Self::new(target).with_strict_registers(config.client.strict_registers)
    }

    /// Reject malformed register tokens instead of skipping them
    pub fn with_strict_registers(mut self, strict: bool) -> Self {
        self.strict_registers = strict;
        self
    }

    pub fn target(&self) -> &ConnectionTarget {
        &self.target
    }

    /// Wait until the IPC server accepts connections
    pub async fn connect(&self, retries: u32, delay: Duration) -> bool {
        transport::probe(&self.target, retries, delay).await
    }

    /// Send one raw command line and return the classified reply
    pub async fn send_command(&self, line: &str) -> Reply {
        match self.transact(line).await {
            Ok(text) => {
                let reply = Reply::classify(text);
                tracing::debug!(command = line, reply = %reply.text, ok = reply.success, "IPC");
                reply
            }
            Err(e) => {
                tracing::debug!(command = line, error = %e, "IPC request failed");
                Reply::failure(e.to_string())
            }
        }
    }

    /// Send a typed command
    pub async fn send(&self, command: &Command) -> Reply {
        match command.to_line() {
            Ok(line) => self.send_command(&line).await,
            Err(e) => {
                tracing::warn!("Refusing to send {:?}: {}", command, e);
                Reply::failure(e.to_string())
            }
        }
    }

    /// Like [`send`](Self::send) but an unsuccessful reply becomes an error
    pub async fn expect_ok(&self, command: &Command) -> Result<Reply> {
        let reply = self.send(command).await;
        if reply.success {
            Ok(reply)
        } else {
            Err(Error::command_failed(&command.to_string(), &reply.text))
        }
    }

    /// One round trip with typed errors
    async fn transact(&self, line: &str) -> Result<String> {
        protocol::validate_line(line)?;
        transport::round_trip(&self.target, line).await
    }

    // === Convenience operations ===

    pub async fn ping(&self) -> bool {
        let reply = self.send(&Command::Ping).await;
        reply.success && reply.text.contains("pong")
    }

    /// Emulator version string
    pub async fn version(&self) -> Option<String> {
        let reply = self.send(&Command::Version).await;
        reply.payload().map(str::to_string)
    }

    pub async fn pause(&self) -> bool {
        self.send(&Command::Pause).await.success
    }

    pub async fn run(&self) -> bool {
        self.send(&Command::Run).await.success
    }

    pub async fn reset(&self) -> bool {
        self.send(&Command::Reset).await.success
    }

    pub async fn step(&self, count: u32) -> bool {
        self.send(&Command::Step { count }).await.success
    }

    /// Run until PC reaches `address`; the server blocks for up to `timeout_ms`
    pub async fn wait_pc(&self, address: u16, timeout_ms: u32) -> bool {
        self.send(&Command::WaitPc {
            address,
            timeout_ms,
        })
        .await
        .success
    }

    /// Run for `count` vertical blanks; the server blocks for up to `timeout_ms`
    pub async fn wait_vbl(&self, count: u32, timeout_ms: u32) -> bool {
        self.send(&Command::WaitVbl { count, timeout_ms })
            .await
            .success
    }

    /// Block until a breakpoint or watchpoint fires
    ///
    /// Returns the `PC=`/`WATCH=`/`WP_*=` tokens of the reply.
    pub async fn wait_breakpoint(&self, timeout_ms: u32) -> Option<RegisterSnapshot> {
        let reply = self.send(&Command::WaitBreakpoint { timeout_ms }).await;
        reply.success.then(|| RegisterSnapshot::parse(&reply.text))
    }

    pub async fn read_mem(&self, address: u16, length: u32, ascii: bool) -> Reply {
        self.send(&Command::MemRead {
            address,
            length,
            ascii,
        })
        .await
    }

    /// Read memory and decode the hex dump
    pub async fn read_bytes(&self, address: u16, length: u32) -> Result<Vec<u8>> {
        let reply = self
            .expect_ok(&Command::MemRead {
                address,
                length,
                ascii: false,
            })
            .await?;
        protocol::parse_memory_dump(&reply.text)
    }

    pub async fn write_mem(&self, address: u16, bytes: &[u8]) -> bool {
        self.send(&Command::MemWrite {
            address,
            bytes: bytes.to_vec(),
        })
        .await
        .success
    }

    /// Register snapshot, or `None` if the command or strict parsing failed
    pub async fn get_regs(&self) -> Option<RegisterSnapshot> {
        let reply = self.send(&Command::Registers).await;
        if !reply.success {
            return None;
        }
        if self.strict_registers {
            match RegisterSnapshot::parse_strict(&reply.text) {
                Ok(regs) => Some(regs),
                Err(e) => {
                    tracing::warn!("Rejecting register reply: {}", e);
                    None
                }
            }
        } else {
            Some(RegisterSnapshot::parse(&reply.text))
        }
    }

    pub async fn add_breakpoint(&self, address: u16) -> bool {
        self.send(&Command::BreakpointAdd { address }).await.success
    }

    pub async fn delete_breakpoint(&self, address: u16) -> bool {
        self.send(&Command::BreakpointDelete { address })
            .await
            .success
    }

    pub async fn clear_breakpoints(&self) -> bool {
        self.send(&Command::BreakpointClear).await.success
    }

    /// Addresses of all breakpoints
    pub async fn list_breakpoints(&self) -> Result<Vec<u16>> {
        let reply = self.expect_ok(&Command::BreakpointList).await?;
        protocol::parse_breakpoint_list(&reply.text)
    }

    pub async fn screenshot(&self, path: &Path) -> bool {
        self.send(&Command::Screenshot {
            path: path.to_path_buf(),
        })
        .await
        .success
    }

    /// Load a disk, snapshot or cartridge image
    pub async fn load_file(&self, path: &Path) -> bool {
        self.send(&Command::Load {
            path: path.to_path_buf(),
        })
        .await
        .success
    }

    pub async fn save_snapshot(&self, path: &Path) -> bool {
        self.send(&Command::SnapshotSave {
            path: path.to_path_buf(),
        })
        .await
        .success
    }

    pub async fn load_snapshot(&self, path: &Path) -> bool {
        self.send(&Command::SnapshotLoad {
            path: path.to_path_buf(),
        })
        .await
        .success
    }
}
