//! IPC protocol message types
//!
//! The emulator speaks a line protocol: one newline-terminated command per
//! connection, one reply back, then the server closes. Replies that start
//! with `OK` are successes; everything else (`ERR 400 bad-args`, an empty
//! reply, a transport fault) is a failure.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::common::{to_hex, Error, Result};

/// Largest reply the client will read from one connection
pub const MAX_REPLY_BYTES: usize = 65536;

/// Literal prefix of every successful reply
pub const OK_MARKER: &str = "OK";

/// Commands understood by the emulator's IPC server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    // === Session ===
    Ping,
    Version,
    Quit,

    // === Execution Control ===
    Pause,
    Run,
    Reset,
    /// Single-step N instructions
    Step { count: u32 },

    // === Blocking Waits (server-side) ===
    WaitPc { address: u16, timeout_ms: u32 },
    WaitVbl { count: u32, timeout_ms: u32 },
    WaitBreakpoint { timeout_ms: u32 },

    // === State Inspection ===
    Registers,
    MemRead { address: u16, length: u32, ascii: bool },
    MemWrite { address: u16, bytes: Vec<u8> },

    // === Breakpoints ===
    BreakpointAdd { address: u16 },
    BreakpointDelete { address: u16 },
    BreakpointList,
    BreakpointClear,

    // === Files ===
    Screenshot { path: PathBuf },
    Load { path: PathBuf },
    SnapshotSave { path: PathBuf },
    SnapshotLoad { path: PathBuf },
}

impl Command {
    /// Render the command line, rejecting anything that would corrupt framing
    pub fn to_line(&self) -> Result<String> {
        if let Some(path) = self.path() {
            validate_path(path)?;
        }
        if let Self::MemWrite { bytes, .. } = self {
            if bytes.is_empty() {
                return Err(Error::InvalidArgument(
                    "mem write needs at least one byte".to_string(),
                ));
            }
        }
        Ok(self.to_string())
    }

    fn path(&self) -> Option<&Path> {
        match self {
            Self::Screenshot { path }
            | Self::Load { path }
            | Self::SnapshotSave { path }
            | Self::SnapshotLoad { path } => Some(path.as_path()),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ping => write!(f, "ping"),
            Self::Version => write!(f, "version"),
            Self::Quit => write!(f, "quit"),
            Self::Pause => write!(f, "pause"),
            Self::Run => write!(f, "run"),
            Self::Reset => write!(f, "reset"),
            Self::Step { count } => write!(f, "step {}", count),
            Self::WaitPc {
                address,
                timeout_ms,
            } => write!(f, "wait pc 0x{:04X} {}", address, timeout_ms),
            Self::WaitVbl { count, timeout_ms } => write!(f, "wait vbl {} {}", count, timeout_ms),
            Self::WaitBreakpoint { timeout_ms } => write!(f, "wait bp {}", timeout_ms),
            Self::Registers => write!(f, "regs"),
            Self::MemRead {
                address,
                length,
                ascii,
            } => {
                write!(f, "mem read 0x{:04X} {}", address, length)?;
                if *ascii {
                    write!(f, " ascii")?;
                }
                Ok(())
            }
            Self::MemWrite { address, bytes } => {
                write!(f, "mem write 0x{:04X} {}", address, to_hex(bytes))
            }
            Self::BreakpointAdd { address } => write!(f, "bp add 0x{:04X}", address),
            Self::BreakpointDelete { address } => write!(f, "bp del 0x{:04X}", address),
            Self::BreakpointList => write!(f, "bp list"),
            Self::BreakpointClear => write!(f, "bp clear"),
            Self::Screenshot { path } => write!(f, "screenshot {}", path.display()),
            Self::Load { path } => write!(f, "load {}", path.display()),
            Self::SnapshotSave { path } => write!(f, "snapshot save {}", path.display()),
            Self::SnapshotLoad { path } => write!(f, "snapshot load {}", path.display()),
        }
    }
}

/// Paths travel unquoted inside the command line, so whitespace and
/// control characters cannot be represented.
fn validate_path(path: &Path) -> Result<()> {
    let text = path.to_str().ok_or_else(|| {
        Error::InvalidArgument(format!("path is not valid UTF-8: {}", path.display()))
    })?;
    if text.is_empty() {
        return Err(Error::InvalidArgument("empty path".to_string()));
    }
    if text.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(Error::InvalidArgument(format!(
            "path contains whitespace or control characters: {:?}",
            text
        )));
    }
    Ok(())
}

/// Check a raw command line before it is sent
pub fn validate_line(line: &str) -> Result<()> {
    if line.contains(|c: char| c == '\n' || c == '\r') {
        return Err(Error::InvalidCommand(format!(
            "line breaks are not allowed inside a command: {:?}",
            line
        )));
    }
    Ok(())
}

/// One reply from the emulator, already classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub success: bool,
    pub text: String,
}

impl Reply {
    /// Classify raw reply text: success iff it begins with `OK`
    pub fn classify(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            success: text.starts_with(OK_MARKER),
            text,
        }
    }

    /// A failed reply that never reached the server, or timed out
    pub fn failure(text: impl Into<String>) -> Self {
        Self {
            success: false,
            text: text.into(),
        }
    }

    /// Reply body after the leading `OK` token
    pub fn payload(&self) -> Option<&str> {
        if !self.success {
            return None;
        }
        Some(self.text[OK_MARKER.len()..].trim_start())
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Register values parsed from `NAME=HEX` tokens
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterSnapshot {
    values: BTreeMap<String, u16>,
}

impl RegisterSnapshot {
    /// Lenient parse of a successful reply's text
    ///
    /// Strips the leading `OK` token, ignores tokens without `=` or with a
    /// value that is not 16-bit hex, and keeps the last value when a name
    /// repeats.
    pub fn parse(text: &str) -> Self {
        let mut values = BTreeMap::new();
        for token in register_tokens(text) {
            match parse_token(token) {
                Ok(Some((name, value))) => {
                    values.insert(name.to_string(), value);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("Skipping register token: {}", e),
            }
        }
        Self { values }
    }

    /// Strict parse: every token after `OK` must be `NAME=HEX`
    pub fn parse_strict(text: &str) -> Result<Self> {
        let mut values = BTreeMap::new();
        for token in register_tokens(text) {
            match parse_token(token)? {
                Some((name, value)) => {
                    values.insert(name.to_string(), value);
                }
                None => return Err(Error::MalformedRegister(token.to_string())),
            }
        }
        Ok(Self { values })
    }

    pub fn get(&self, name: &str) -> Option<u16> {
        self.values.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u16)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

fn register_tokens(text: &str) -> impl Iterator<Item = &str> {
    let body = text.strip_prefix("OK ").unwrap_or(text);
    body.split_whitespace().filter(|t| *t != OK_MARKER)
}

/// `Ok(None)` for tokens without `=`
fn parse_token(token: &str) -> Result<Option<(&str, u16)>> {
    let Some((name, value)) = token.split_once('=') else {
        return Ok(None);
    };
    if name.is_empty() {
        return Err(Error::MalformedRegister(token.to_string()));
    }
    u16::from_str_radix(value, 16)
        .map(|v| Some((name, v)))
        .map_err(|_| Error::MalformedRegister(token.to_string()))
}

/// Whether `text` carries `NAME=` followed by a 2- or 4-digit hex value
pub fn has_hex_register(text: &str, name: &str) -> bool {
    text.split_whitespace().any(|token| {
        token
            .split_once('=')
            .filter(|(n, _)| *n == name)
            .map(|(_, v)| {
                (v.len() == 2 || v.len() == 4) && v.chars().all(|c| c.is_ascii_hexdigit())
            })
            .unwrap_or(false)
    })
}

/// Parse a `bp list` reply: `OK count=N XXXX[if ...][pass N] ...`
pub fn parse_breakpoint_list(text: &str) -> Result<Vec<u16>> {
    let body = text
        .strip_prefix(OK_MARKER)
        .ok_or_else(|| Error::MalformedReply(text.to_string()))?;

    let mut addresses = Vec::new();
    let mut expected = None;
    // Bracketed suffixes may contain spaces, so depth carries across tokens
    let mut depth = 0usize;
    for token in body.split_whitespace() {
        if depth == 0 {
            if let Some(count) = token.strip_prefix("count=") {
                expected = count.parse::<usize>().ok();
                continue;
            }
            let hex: String = token.chars().take_while(|c| c.is_ascii_hexdigit()).collect();
            if hex.len() == 4 {
                let address = u16::from_str_radix(&hex, 16)
                    .map_err(|_| Error::MalformedReply(text.to_string()))?;
                addresses.push(address);
            }
        }
        for c in token.chars() {
            match c {
                '[' => depth += 1,
                ']' => depth = depth.saturating_sub(1),
                _ => {}
            }
        }
    }

    if let Some(count) = expected {
        if count != addresses.len() {
            return Err(Error::MalformedReply(format!(
                "expected {} breakpoints, found {}: {}",
                count,
                addresses.len(),
                text
            )));
        }
    }
    Ok(addresses)
}

/// Parse a `mem read` reply into bytes, ignoring any `|ascii|` columns
///
/// An ASCII column holds one character per byte of the hex run before it,
/// and that character may itself be `|` (byte 0x7C).
pub fn parse_memory_dump(text: &str) -> Result<Vec<u8>> {
    let malformed = || Error::MalformedReply(text.to_string());
    let body = text.strip_prefix(OK_MARKER).ok_or_else(malformed)?;

    let mut hex = String::new();
    let mut run_digits = 0usize;
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        match c {
            '|' => {
                for _ in 0..run_digits / 2 {
                    chars.next().ok_or_else(malformed)?;
                }
                if chars.next() != Some('|') {
                    return Err(malformed());
                }
                run_digits = 0;
            }
            _ if c.is_whitespace() => {}
            _ => {
                hex.push(c);
                run_digits += 1;
            }
        }
    }
    crate::common::parse_hex(&hex).map_err(|_| Error::MalformedReply(text.to_string()))
}

/// Case-insensitive check for a byte run, spaced (`DE AD`) or contiguous (`DEAD`)
pub fn contains_bytes(text: &str, bytes: &[u8]) -> bool {
    let upper = text.to_uppercase();
    let contiguous = to_hex(bytes);
    let spaced = bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ");
    upper.contains(&spaced) || upper.contains(&contiguous)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_encoding() {
        assert_eq!(Command::Ping.to_string(), "ping");
        assert_eq!(
            Command::WaitPc {
                address: 0x38,
                timeout_ms: 10000
            }
            .to_string(),
            "wait pc 0x0038 10000"
        );
        assert_eq!(
            Command::WaitVbl {
                count: 5,
                timeout_ms: 2000
            }
            .to_string(),
            "wait vbl 5 2000"
        );
        assert_eq!(
            Command::MemRead {
                address: 0xBEEF,
                length: 16,
                ascii: false
            }
            .to_string(),
            "mem read 0xBEEF 16"
        );
        assert_eq!(
            Command::MemRead {
                address: 0x4000,
                length: 4,
                ascii: true
            }
            .to_string(),
            "mem read 0x4000 4 ascii"
        );
        assert_eq!(
            Command::MemWrite {
                address: 0x4000,
                bytes: vec![0xDE, 0xAD, 0xBE, 0xEF]
            }
            .to_string(),
            "mem write 0x4000 DEADBEEF"
        );
        assert_eq!(
            Command::BreakpointAdd { address: 0xa000 }.to_string(),
            "bp add 0xA000"
        );
        assert_eq!(Command::BreakpointList.to_string(), "bp list");
        assert_eq!(Command::BreakpointClear.to_string(), "bp clear");
    }

    #[test]
    fn test_paths_with_whitespace_are_rejected() {
        let cmd = Command::Screenshot {
            path: PathBuf::from("/tmp/my shot.png"),
        };
        assert!(matches!(cmd.to_line(), Err(Error::InvalidArgument(_))));

        let cmd = Command::Load {
            path: PathBuf::from("/tmp/game\n.dsk"),
        };
        assert!(cmd.to_line().is_err());

        let cmd = Command::Load {
            path: PathBuf::from("/tmp/game.dsk"),
        };
        assert_eq!(cmd.to_line().unwrap(), "load /tmp/game.dsk");
    }

    #[test]
    fn test_empty_mem_write_is_rejected() {
        let cmd = Command::MemWrite {
            address: 0,
            bytes: Vec::new(),
        };
        assert!(cmd.to_line().is_err());
    }

    #[test]
    fn test_validate_line() {
        assert!(validate_line("regs").is_ok());
        assert!(validate_line("regs\nreset").is_err());
        assert!(validate_line("regs\r").is_err());
    }

    #[test]
    fn test_classify_requires_exact_prefix() {
        assert!(Reply::classify("OK").success);
        assert!(Reply::classify("OK pong").success);
        assert!(!Reply::classify("").success);
        assert!(!Reply::classify("ok pong").success);
        assert!(!Reply::classify(" OK").success);
        assert!(!Reply::classify("ERR 400 bad-args").success);
        assert!(!Reply::classify("Timeout").success);
    }

    #[test]
    fn test_payload() {
        assert_eq!(Reply::classify("OK pong").payload(), Some("pong"));
        assert_eq!(Reply::classify("OK").payload(), Some(""));
        assert_eq!(Reply::classify("ERR 1").payload(), None);
    }

    #[test]
    fn test_parse_registers() {
        let regs = RegisterSnapshot::parse("OK A=3E F=00 BC=1234 PC=0038 SP=FFF0");
        assert_eq!(regs.len(), 5);
        assert_eq!(regs.get("A"), Some(0x3E));
        assert_eq!(regs.get("F"), Some(0x00));
        assert_eq!(regs.get("BC"), Some(0x1234));
        assert_eq!(regs.get("PC"), Some(0x0038));
        assert_eq!(regs.get("SP"), Some(0xFFF0));
    }

    #[test]
    fn test_parse_registers_lenient() {
        let regs = RegisterSnapshot::parse("OK A=01 garbage PC=0100 PC=0200 X=ZZ");
        assert_eq!(regs.get("A"), Some(0x01));
        assert_eq!(regs.get("PC"), Some(0x0200));
        assert_eq!(regs.get("X"), None);
        assert_eq!(regs.len(), 2);
    }

    #[test]
    fn test_parse_registers_strict() {
        let regs = RegisterSnapshot::parse_strict("OK A=3E IM=1 HALT=0").unwrap();
        assert_eq!(regs.get("IM"), Some(1));

        assert!(matches!(
            RegisterSnapshot::parse_strict("OK A=3E garbage"),
            Err(Error::MalformedRegister(t)) if t == "garbage"
        ));
        assert!(matches!(
            RegisterSnapshot::parse_strict("OK PC=XYZW"),
            Err(Error::MalformedRegister(t)) if t == "PC=XYZW"
        ));
    }

    #[test]
    fn test_has_hex_register() {
        let text = "OK A=00 SP=C000 PC=0000 IM=1";
        assert!(has_hex_register(text, "PC"));
        assert!(has_hex_register(text, "SP"));
        assert!(has_hex_register(text, "A"));
        assert!(!has_hex_register(text, "IM"));
        assert!(!has_hex_register(text, "IX"));
    }

    #[test]
    fn test_parse_breakpoint_list() {
        assert_eq!(
            parse_breakpoint_list("OK count=2 0038 A000[if a==1][pass 3]").unwrap(),
            vec![0x0038, 0xA000]
        );
        assert!(parse_breakpoint_list("OK count=0").unwrap().is_empty());
        assert!(parse_breakpoint_list("OK count=2 0038").is_err());
        assert!(parse_breakpoint_list("ERR 400").is_err());
    }

    #[test]
    fn test_parse_breakpoint_list_skips_spaced_conditions() {
        assert_eq!(
            parse_breakpoint_list("OK count=1 0038[pass 1000]").unwrap(),
            vec![0x0038]
        );
        assert_eq!(
            parse_breakpoint_list("OK count=1 0038[if de == cafe]").unwrap(),
            vec![0x0038]
        );
        assert_eq!(
            parse_breakpoint_list("OK count=2 0038[if hl == beef][pass 1000] 4000").unwrap(),
            vec![0x0038, 0x4000]
        );
    }

    #[test]
    fn test_parse_memory_dump() {
        assert_eq!(
            parse_memory_dump("OK DEADBEEF").unwrap(),
            vec![0xDE, 0xAD, 0xBE, 0xEF]
        );
        assert_eq!(
            parse_memory_dump("OK 48454C4C4F |HELLO|").unwrap(),
            b"HELLO".to_vec()
        );
        assert!(parse_memory_dump("ERR 400 bad-args").is_err());
    }

    #[test]
    fn test_parse_memory_dump_pipe_in_ascii_column() {
        assert_eq!(parse_memory_dump("OK 7C41 ||A|").unwrap(), vec![0x7C, 0x41]);
        assert_eq!(parse_memory_dump("OK 2041 | A|").unwrap(), vec![0x20, 0x41]);

        // Two full rows of 16 bytes, each followed by its column
        let row = "7C".repeat(16);
        let text = format!("OK {} |{}| {} |{}|", row, "|".repeat(16), row, "|".repeat(16));
        assert_eq!(parse_memory_dump(&text).unwrap(), vec![0x7C; 32]);

        assert!(parse_memory_dump("OK 4142 |AB").is_err());
    }

    #[test]
    fn test_contains_bytes() {
        let bytes = [0xDE, 0xAD, 0xBE, 0xEF];
        assert!(contains_bytes("OK DEADBEEF", &bytes));
        assert!(contains_bytes("OK deadbeef", &bytes));
        assert!(contains_bytes("OK DE AD BE EF", &bytes));
        assert!(!contains_bytes("OK DEADBE00", &bytes));
    }
}
