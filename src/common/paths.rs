//! Configuration and executable lookup paths
//!
//! The config file lives in the platform config directory:
//! - Linux: `~/.config/emu-harness/config.toml`
//! - macOS: `~/Library/Application Support/emu-harness/config.toml`
//! - Windows: `%APPDATA%\emu-harness\config.toml`

use std::path::{Path, PathBuf};

use super::{Error, Result};

/// Name used for the config directory
const APP_NAME: &str = "emu-harness";

/// Executable looked up on PATH when none is configured
pub const DEFAULT_EMULATOR_NAME: &str = "koncepcja";

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Resolve the emulator executable
///
/// An explicitly configured path is used as-is if it exists; otherwise
/// `koncepcja` is searched on PATH.
pub fn resolve_executable(configured: Option<&Path>) -> Result<PathBuf> {
    match configured {
        Some(path) if path.exists() => Ok(path.to_path_buf()),
        Some(path) if path.components().count() == 1 => which::which(path)
            .map_err(|_| Error::EmulatorNotFound(path.display().to_string())),
        Some(path) => Err(Error::EmulatorNotFound(path.display().to_string())),
        None => which::which(DEFAULT_EMULATOR_NAME).map_err(|_| {
            Error::EmulatorNotFound(format!("'{}' is not on PATH", DEFAULT_EMULATOR_NAME))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_is_toml() {
        if let Some(path) = config_path() {
            assert!(path.ends_with("emu-harness/config.toml"));
        }
    }

    #[test]
    fn test_resolve_missing_explicit_path() {
        let err = resolve_executable(Some(Path::new("/nonexistent/dir/koncepcja"))).unwrap_err();
        assert!(matches!(err, Error::EmulatorNotFound(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_bare_name_on_path() {
        let path = resolve_executable(Some(Path::new("sh"))).unwrap();
        assert!(path.is_absolute());
    }
}
