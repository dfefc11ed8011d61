//! Mock emulator binary for integration testing
//!
//! Serves the emulator's line protocol on a loopback TCP port over an
//! in-memory Z80 state, so the harness can be exercised without the real
//! emulator. One request per connection; the reply is followed by close.

use clap::Parser;
use std::collections::BTreeSet;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::path::Path;
use std::time::Duration;

const VERSION: &str = "kaprys-0.1";
const MEMORY_SIZE: usize = 0x10000;
const RESET_SP: u16 = 0xC000;
const READ_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "mock_emulator", about = "Protocol-compatible stand-in for the emulator")]
struct Args {
    /// Port to listen on (loopback only)
    #[arg(long, default_value_t = 6543)]
    port: u16,

    /// Wait this long before binding the port
    #[arg(long, default_value_t = 0)]
    startup_delay_ms: u64,

    /// Ignore SIGTERM so only a kill stops the process
    #[arg(long)]
    ignore_term: bool,

    /// Answer every command starting with this word with an error
    #[arg(long, value_name = "WORD")]
    fail: Option<String>,
}

fn main() {
    let args = Args::parse();

    if args.ignore_term {
        ignore_sigterm();
    }

    std::thread::sleep(Duration::from_millis(args.startup_delay_ms));

    let listener = match TcpListener::bind(("127.0.0.1", args.port)) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("mock_emulator: cannot bind port {}: {}", args.port, e);
            std::process::exit(1);
        }
    };

    let mut state = MockState::new(args.fail);

    for stream in listener.incoming() {
        let Ok(stream) = stream else {
            continue;
        };
        if handle_connection(stream, &mut state) == Flow::Quit {
            break;
        }
    }
}

#[cfg(unix)]
fn ignore_sigterm() {
    // SAFETY: installing SIG_IGN before any other thread exists
    unsafe {
        libc::signal(libc::SIGTERM, libc::SIG_IGN);
    }
}

#[cfg(not(unix))]
fn ignore_sigterm() {}

#[derive(PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

fn handle_connection(stream: TcpStream, state: &mut MockState) -> Flow {
    stream.set_read_timeout(Some(READ_TIMEOUT)).ok();

    let mut line = String::new();
    let mut reader = BufReader::new(&stream);
    match reader.read_line(&mut line) {
        // Readiness probes connect and close without sending anything
        Ok(0) | Err(_) => return Flow::Continue,
        Ok(_) => {}
    }

    let (reply, flow) = state.handle(line.trim());
    let mut writer = &stream;
    writer.write_all(reply.as_bytes()).ok();
    writer.write_all(b"\n").ok();
    writer.flush().ok();
    flow
}

struct MockState {
    a: u8,
    f: u8,
    b: u8,
    c: u8,
    d: u8,
    e: u8,
    h: u8,
    l: u8,
    ix: u16,
    iy: u16,
    sp: u16,
    pc: u16,
    im: u8,
    halted: bool,
    memory: Vec<u8>,
    breakpoints: BTreeSet<u16>,
    fail: Option<String>,
}

impl MockState {
    fn new(fail: Option<String>) -> Self {
        let mut state = Self {
            a: 0,
            f: 0,
            b: 0,
            c: 0,
            d: 0,
            e: 0,
            h: 0,
            l: 0,
            ix: 0,
            iy: 0,
            sp: 0,
            pc: 0,
            im: 0,
            halted: false,
            memory: vec![0; MEMORY_SIZE],
            breakpoints: BTreeSet::new(),
            fail,
        };
        state.reset();
        state
    }

    fn reset(&mut self) {
        self.a = 0xFF;
        self.f = 0xFF;
        self.ix = 0xFFFF;
        self.iy = 0xFFFF;
        self.sp = RESET_SP;
        self.pc = 0x0000;
        self.im = 0;
        self.halted = false;
    }

    fn handle(&mut self, line: &str) -> (String, Flow) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(&cmd) = parts.first() else {
            return ("OK".to_string(), Flow::Continue);
        };

        if self.fail.as_deref() == Some(cmd) {
            return ("ERR 500 injected-failure".to_string(), Flow::Continue);
        }

        let reply = match (cmd, &parts[1..]) {
            ("quit", _) => return ("OK".to_string(), Flow::Quit),
            ("ping", _) => "OK pong".to_string(),
            ("version", _) => format!("OK {}", VERSION),
            ("pause", _) | ("run", _) => "OK".to_string(),
            ("reset", _) => {
                self.reset();
                "OK".to_string()
            }
            ("step", rest) => self.step(rest),
            ("regs", _) => self.regs(),
            ("mem", ["read", rest @ ..]) => self.mem_read(rest),
            ("mem", ["write", rest @ ..]) => self.mem_write(rest),
            ("bp", rest) => self.breakpoint(rest),
            ("wait", rest) => self.wait(rest),
            ("screenshot", [_path]) | ("load", [_path]) => "OK".to_string(),
            ("snapshot", ["save", path]) => self.snapshot_save(Path::new(path)),
            ("snapshot", ["load", path]) => self.snapshot_load(Path::new(path)),
            ("env", [name]) => match std::env::var(name) {
                Ok(value) => format!("OK {}", value),
                Err(_) => "ERR 404 unset".to_string(),
            },
            _ => "ERR 400 bad-args".to_string(),
        };
        (reply, Flow::Continue)
    }

    fn step(&mut self, rest: &[&str]) -> String {
        let count = match rest.first() {
            Some(n) => match parse_number(n) {
                Some(n) if n >= 1 => n,
                _ => return "ERR 400 bad-args".to_string(),
            },
            None => 1,
        };
        self.pc = self.pc.wrapping_add(count as u16);
        "OK".to_string()
    }

    fn regs(&self) -> String {
        format!(
            "OK A={:02X} F={:02X} B={:02X} C={:02X} D={:02X} E={:02X} H={:02X} L={:02X} \
             IX={:04X} IY={:04X} SP={:04X} PC={:04X} IM={} HALT={}",
            self.a,
            self.f,
            self.b,
            self.c,
            self.d,
            self.e,
            self.h,
            self.l,
            self.ix,
            self.iy,
            self.sp,
            self.pc,
            self.im,
            u8::from(self.halted)
        )
    }

    fn mem_read(&self, rest: &[&str]) -> String {
        let (Some(addr), Some(len)) = (
            rest.first().and_then(|s| parse_number(s)),
            rest.get(1).and_then(|s| parse_number(s)),
        ) else {
            return "ERR 400 bad-args".to_string();
        };
        let ascii = rest[2..].contains(&"ascii");

        let mut resp = String::from("OK ");
        let mut text = String::new();
        for i in 0..len {
            let v = self.memory[addr.wrapping_add(i) as usize % MEMORY_SIZE];
            resp.push_str(&format!("{:02X}", v));
            if ascii {
                text.push(if (32..=126).contains(&v) { v as char } else { '.' });
                if (i + 1) % 16 == 0 {
                    resp.push_str(&format!(" |{}| ", text));
                    text.clear();
                }
            }
        }
        if !text.is_empty() {
            resp.push_str(&format!(" |{}|", text));
        }
        resp.trim_end().to_string()
    }

    fn mem_write(&mut self, rest: &[&str]) -> String {
        let Some(addr) = rest.first().and_then(|s| parse_number(s)) else {
            return "ERR 400 bad-args".to_string();
        };
        let hex: String = rest[1..].concat();
        if hex.is_empty() || hex.len() % 2 != 0 {
            return "ERR 400 bad-hex".to_string();
        }
        let mut bytes = Vec::with_capacity(hex.len() / 2);
        for i in (0..hex.len()).step_by(2) {
            match hex.get(i..i + 2).and_then(|b| u8::from_str_radix(b, 16).ok()) {
                Some(b) => bytes.push(b),
                None => return "ERR 400 bad-hex".to_string(),
            }
        }
        for (i, b) in bytes.into_iter().enumerate() {
            self.memory[(addr as usize + i) % MEMORY_SIZE] = b;
        }
        "OK".to_string()
    }

    fn breakpoint(&mut self, rest: &[&str]) -> String {
        match rest {
            ["add", addr, ..] | ["del", addr] => {
                let Some(addr) = parse_number(addr) else {
                    return "ERR 400 bad-args".to_string();
                };
                if rest[0] == "add" {
                    self.breakpoints.insert(addr as u16);
                } else {
                    self.breakpoints.remove(&(addr as u16));
                }
                "OK".to_string()
            }
            ["clear"] => {
                self.breakpoints.clear();
                "OK".to_string()
            }
            ["list"] => {
                let mut resp = format!("OK count={}", self.breakpoints.len());
                for addr in &self.breakpoints {
                    resp.push_str(&format!(" {:04X}", addr));
                }
                resp
            }
            _ => "ERR 400 bad-args".to_string(),
        }
    }

    /// Execution is instantaneous here: waits either succeed at once or time out
    fn wait(&mut self, rest: &[&str]) -> String {
        match rest {
            ["pc", addr, _timeout] => match parse_number(addr) {
                Some(addr) => {
                    self.pc = addr as u16;
                    "OK".to_string()
                }
                None => "ERR 400 bad-args".to_string(),
            },
            ["vbl", _count, _timeout] => "OK".to_string(),
            ["bp", timeout] => match self.breakpoints.iter().next() {
                Some(&addr) => {
                    self.pc = addr;
                    format!("OK PC={:04X} WATCH=0", addr)
                }
                None => {
                    let ms = parse_number(timeout).unwrap_or(0).min(1000);
                    std::thread::sleep(Duration::from_millis(ms as u64));
                    "ERR 408 timeout".to_string()
                }
            },
            _ => "ERR 400 bad-args".to_string(),
        }
    }

    fn snapshot_save(&self, path: &Path) -> String {
        match std::fs::write(path, &self.memory) {
            Ok(()) => "OK".to_string(),
            Err(_) => "ERR 500 snapshot-save".to_string(),
        }
    }

    fn snapshot_load(&mut self, path: &Path) -> String {
        match std::fs::read(path) {
            Ok(data) if data.len() == MEMORY_SIZE => {
                self.memory = data;
                "OK".to_string()
            }
            _ => "ERR 500 snapshot-load".to_string(),
        }
    }
}

/// `0x`-prefixed hex or decimal
fn parse_number(text: &str) -> Option<u32> {
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}
