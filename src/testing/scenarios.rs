//! Built-in end-to-end scenarios
//!
//! Each scenario gets a fresh [`Supervisor`] and starts its own emulator.
//! Assertion failures are returned as [`Error::ScenarioFailed`] so the
//! session teardown always runs.

use futures_util::future::BoxFuture;

use crate::common::{Error, Result};
use crate::ipc::protocol::{self, Command, RegisterSnapshot};
use crate::supervisor::Supervisor;

/// Scenario body run inside a supervisor session
pub type ScenarioFn = for<'a> fn(&'a mut Supervisor) -> BoxFuture<'a, Result<()>>;

/// A named built-in scenario
#[derive(Clone, Copy)]
pub struct Scenario {
    /// Identifier used by `--scenario`
    pub name: &'static str,
    /// Human-readable title used in progress lines
    pub title: &'static str,
    pub description: &'static str,
    pub run: ScenarioFn,
}

impl std::fmt::Debug for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scenario").field("name", &self.name).finish()
    }
}

/// All built-in scenarios in execution order
pub fn builtin() -> &'static [Scenario] {
    &BUILTIN
}

/// Look up a built-in scenario by name
pub fn find(name: &str) -> Option<&'static Scenario> {
    BUILTIN.iter().find(|s| s.name == name)
}

static BUILTIN: [Scenario; 3] = [
    Scenario {
        name: "z80_basic",
        title: "Z80 basic test",
        description: "Pause, reset and read back PC/SP",
        run: z80_basic,
    },
    Scenario {
        name: "memory_rw",
        title: "Memory R/W test",
        description: "Write DEADBEEF at 0x4000 and read it back",
        run: memory_rw,
    },
    Scenario {
        name: "breakpoint",
        title: "Breakpoint test",
        description: "Add, list and clear a breakpoint at 0x0038",
        run: breakpoint,
    },
];

const TEST_ADDRESS: u16 = 0x4000;
const TEST_PATTERN: [u8; 4] = [0xDE, 0xAD, 0xBE, 0xEF];
const TEST_BREAKPOINT: u16 = 0x0038;

async fn start(emu: &mut Supervisor) -> Result<()> {
    if emu.start_default().await {
        Ok(())
    } else {
        Err(Error::scenario("Could not start emulator"))
    }
}

fn z80_basic(emu: &mut Supervisor) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        start(emu).await?;
        let settle = emu.config().scenarios.settle();
        let ipc = emu.ipc();

        ipc.pause().await;
        ipc.reset().await;
        tokio::time::sleep(settle).await;

        let reply = ipc.send(&Command::Registers).await;
        if !reply.success {
            return Err(Error::scenario("Could not read registers"));
        }
        for name in ["PC", "SP"] {
            if !protocol::has_hex_register(&reply.text, name) {
                return Err(Error::scenario(format!(
                    "Register {} missing from reply: {}",
                    name, reply.text
                )));
            }
        }

        let regs = RegisterSnapshot::parse(&reply.text);
        println!("  PC=0x{:04X}", regs.get("PC").unwrap_or(0));
        println!("  SP=0x{:04X}", regs.get("SP").unwrap_or(0));
        Ok(())
    })
}

fn memory_rw(emu: &mut Supervisor) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        start(emu).await?;
        let ipc = emu.ipc();

        ipc.pause().await;
        if !ipc.write_mem(TEST_ADDRESS, &TEST_PATTERN).await {
            return Err(Error::scenario("Could not write memory"));
        }

        let reply = ipc.read_mem(TEST_ADDRESS, TEST_PATTERN.len() as u32, false).await;
        if !reply.success {
            return Err(Error::scenario("Could not read memory"));
        }
        if !protocol::contains_bytes(&reply.text, &TEST_PATTERN) {
            return Err(Error::scenario(format!(
                "Unexpected memory content: {}",
                reply.text
            )));
        }
        Ok(())
    })
}

fn breakpoint(emu: &mut Supervisor) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        start(emu).await?;
        let ipc = emu.ipc();
        let needle = format!("{:04X}", TEST_BREAKPOINT);

        ipc.pause().await;
        if !ipc.add_breakpoint(TEST_BREAKPOINT).await {
            return Err(Error::scenario("Could not add breakpoint"));
        }

        let listed = ipc.send(&Command::BreakpointList).await;
        if !listed.success || !listed.text.to_uppercase().contains(&needle) {
            return Err(Error::scenario("Breakpoint not listed"));
        }

        if !ipc.clear_breakpoints().await {
            return Err(Error::scenario("Could not clear breakpoints"));
        }

        let listed = ipc.send(&Command::BreakpointList).await;
        if !listed.success {
            return Err(Error::scenario("Could not list breakpoints"));
        }
        if listed.text.to_uppercase().contains(&needle) {
            return Err(Error::scenario("Breakpoint still listed after clear"));
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_order() {
        let names: Vec<_> = builtin().iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["z80_basic", "memory_rw", "breakpoint"]);
    }

    #[test]
    fn test_find() {
        assert_eq!(find("memory_rw").map(|s| s.title), Some("Memory R/W test"));
        assert!(find("missing").is_none());
    }
}
