//! Configuration file handling

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths::config_path;
use super::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Where the emulator's IPC server listens
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Client-side reply handling
    #[serde(default)]
    pub client: ClientConfig,

    /// Readiness probe after spawning the emulator
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Emulator process settings
    #[serde(default)]
    pub emulator: EmulatorConfig,

    /// Built-in scenario settings
    #[serde(default)]
    pub scenarios: ScenarioConfig,
}

/// IPC connection settings
#[derive(Debug, Deserialize, Clone)]
pub struct ConnectionConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Per-call timeout for connect, write and receive
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}
fn default_port() -> u16 {
    6543
}
fn default_timeout_ms() -> u64 {
    5000
}

/// Reply parsing settings
#[derive(Debug, Deserialize, Default, Clone)]
pub struct ClientConfig {
    /// Fail register snapshots on malformed tokens instead of skipping them
    #[serde(default)]
    pub strict_registers: bool,
}

/// Connectivity probe settings
#[derive(Debug, Deserialize, Clone)]
pub struct ProbeConfig {
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Fixed delay between attempts
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            delay_ms: default_delay_ms(),
        }
    }
}

fn default_retries() -> u32 {
    10
}
fn default_delay_ms() -> u64 {
    500
}

/// Emulator process settings
#[derive(Debug, Deserialize, Clone)]
pub struct EmulatorConfig {
    /// Path to the emulator executable; looked up on PATH when unset
    #[serde(default)]
    pub executable: Option<PathBuf>,

    /// Arguments placed before the per-scenario arguments
    #[serde(default)]
    pub args: Vec<String>,

    /// Select the dummy SDL video and audio drivers
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// How long to wait after SIGTERM before killing
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,

    /// Drain emulator stdout/stderr into debug logs instead of discarding
    #[serde(default)]
    pub capture_output: bool,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            executable: None,
            args: Vec::new(),
            headless: default_headless(),
            grace_secs: default_grace_secs(),
            capture_output: false,
        }
    }
}

fn default_headless() -> bool {
    true
}
fn default_grace_secs() -> u64 {
    5
}

/// Built-in scenario settings
#[derive(Debug, Deserialize, Clone)]
pub struct ScenarioConfig {
    /// Pause after reset before reading state
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            settle_ms: default_settle_ms(),
        }
    }
}

fn default_settle_ms() -> u64 {
    100
}

impl ConnectionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl ProbeConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl EmulatorConfig {
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }
}

impl ScenarioConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

impl Config {
    /// Load configuration
    ///
    /// An explicit path must exist. Without one, the default config file is
    /// used if present, otherwise the built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Some(path) = config_path() {
            if path.exists() {
                return Self::from_file(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| super::Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.probe.retries == 0 {
            return Err(super::Error::Config(
                "probe.retries must be at least 1".to_string(),
            ));
        }
        if self.connection.timeout_ms == 0 {
            return Err(super::Error::Config(
                "connection.timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
