//! Scripted scenario configuration types
//!
//! Defines the data structures for deserializing YAML test scenarios.

use serde::Deserialize;
use std::path::Path;

use crate::common::{Error, Result};

/// A complete scripted scenario loaded from a YAML file
#[derive(Deserialize, Debug, Clone)]
pub struct TestScenario {
    /// Name of the test scenario
    pub name: String,
    /// Optional description of what the test verifies
    pub description: Option<String>,
    /// How to launch the emulator for this scenario
    #[serde(default)]
    pub launch: LaunchConfig,
    /// The sequence of test steps to execute
    pub steps: Vec<TestStep>,
}

/// Emulator launch settings for one scenario
#[derive(Deserialize, Debug, Clone, Default)]
pub struct LaunchConfig {
    /// Arguments appended after the configured emulator arguments
    #[serde(default)]
    pub args: Vec<String>,
    /// Overrides the configured headless setting
    pub headless: Option<bool>,
}

/// A single test step in the execution flow
#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TestStep {
    /// Send a raw protocol command
    Command {
        /// The command line (e.g., "bp add 0x0038")
        command: String,
        /// Optional expectations for the reply
        expect: Option<CommandExpectation>,
    },
    /// Sleep on the harness side
    Sleep {
        ms: u64,
    },
    /// Read registers and make assertions
    Registers {
        asserts: Vec<RegisterAssertion>,
    },
    /// Read memory and compare with expected bytes
    Memory {
        address: u16,
        /// Expected bytes as hex (e.g., "DEADBEEF")
        bytes: String,
    },
}

/// Expectations for a command reply
#[derive(Deserialize, Debug, Clone)]
pub struct CommandExpectation {
    /// Whether the reply should start with OK (default: true)
    pub success: Option<bool>,
    /// Substring that should be in the reply (case-insensitive)
    pub contains: Option<String>,
    /// Substring that must not be in the reply (case-insensitive)
    pub absent: Option<String>,
}

/// Assertion for a register
#[derive(Deserialize, Debug, Clone)]
pub struct RegisterAssertion {
    /// Register name as reported by `regs` (e.g., "PC")
    pub name: String,
    /// Expected value
    pub value: Option<u16>,
}

impl TestScenario {
    /// Load a scenario from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| Error::ScenarioParse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scenario() {
        let scenario = TestScenario::parse(
            r#"
name: Memory fill
description: Write then read back
launch:
  args: ["--some-flag"]
steps:
  - action: command
    command: "mem write 0x4000 DEADBEEF"
  - action: command
    command: "bp list"
    expect:
      contains: "count=0"
  - action: sleep
    ms: 50
  - action: registers
    asserts:
      - name: PC
        value: 0x0038
      - name: SP
  - action: memory
    address: 0x4000
    bytes: "DEADBEEF"
"#,
        )
        .unwrap();

        assert_eq!(scenario.name, "Memory fill");
        assert_eq!(scenario.launch.args, vec!["--some-flag"]);
        assert_eq!(scenario.launch.headless, None);
        assert_eq!(scenario.steps.len(), 5);

        match &scenario.steps[1] {
            TestStep::Command { command, expect } => {
                assert_eq!(command, "bp list");
                let expect = expect.as_ref().unwrap();
                assert_eq!(expect.contains.as_deref(), Some("count=0"));
                assert_eq!(expect.success, None);
            }
            other => panic!("Expected Command step, got {:?}", other),
        }
        match &scenario.steps[3] {
            TestStep::Registers { asserts } => {
                assert_eq!(asserts[0].value, Some(0x38));
                assert_eq!(asserts[1].value, None);
            }
            other => panic!("Expected Registers step, got {:?}", other),
        }
        assert!(matches!(
            scenario.steps[4],
            TestStep::Memory {
                address: 0x4000,
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_action_is_rejected() {
        let err = TestScenario::parse(
            r#"
name: Bad
steps:
  - action: teleport
"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::ScenarioParse(_)));
    }
}
