//! Emulator child process handling
//!
//! Spawning with a controlled environment, draining output, and the
//! terminate-wait-kill shutdown sequence.

use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::time::timeout;

use crate::common::{Error, Result};

/// Environment overrides selecting SDL's null video and audio drivers
pub const HEADLESS_ENV: [(&str, &str); 2] =
    [("SDL_VIDEODRIVER", "dummy"), ("SDL_AUDIODRIVER", "dummy")];

/// How long to wait for the OS to reap a killed process
const KILL_REAP_TIMEOUT: Duration = Duration::from_secs(2);

/// Operations the supervisor needs from a running child
#[async_trait]
pub trait ChildProcess: Send + Sync {
    fn pid(&self) -> Option<u32>;

    /// Ask the process to exit (SIGTERM on Unix)
    fn request_terminate(&mut self) -> io::Result<()>;

    /// Wait for the process to exit
    async fn wait_exit(&mut self) -> io::Result<()>;

    /// Kill the process without waiting
    fn force_kill(&mut self) -> io::Result<()>;
}

#[async_trait]
impl ChildProcess for Child {
    fn pid(&self) -> Option<u32> {
        self.id()
    }

    #[cfg(unix)]
    fn request_terminate(&mut self) -> io::Result<()> {
        let Some(pid) = self.id() else {
            // Already reaped
            return Ok(());
        };
        // SAFETY: kill(2) has no memory-safety preconditions; the pid is our own child
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    #[cfg(not(unix))]
    fn request_terminate(&mut self) -> io::Result<()> {
        // No cooperative signal available
        self.start_kill()
    }

    async fn wait_exit(&mut self) -> io::Result<()> {
        Child::wait(self).await.map(|status| {
            tracing::debug!(%status, "Emulator exited");
        })
    }

    fn force_kill(&mut self) -> io::Result<()> {
        self.start_kill()
    }
}

/// How a child ended up stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    Graceful,
    Killed,
}

/// Terminate, wait up to `grace`, then kill
///
/// The kill is issued at most once. Errors are logged, never returned.
pub async fn shutdown(child: &mut dyn ChildProcess, grace: Duration) -> ShutdownOutcome {
    let pid = child.pid();

    if let Err(e) = child.request_terminate() {
        tracing::debug!(?pid, error = %e, "Terminate request failed");
    }

    match timeout(grace, child.wait_exit()).await {
        Ok(Ok(())) => {
            tracing::debug!(?pid, "Emulator stopped gracefully");
            return ShutdownOutcome::Graceful;
        }
        Ok(Err(e)) => {
            tracing::warn!(?pid, error = %e, "Waiting for emulator failed, killing");
        }
        Err(_) => {
            tracing::warn!(?pid, ?grace, "Emulator ignored terminate request, killing");
        }
    }

    if let Err(e) = child.force_kill() {
        tracing::warn!(?pid, error = %e, "Kill failed");
    }
    if timeout(KILL_REAP_TIMEOUT, child.wait_exit()).await.is_err() {
        tracing::warn!(?pid, "Killed emulator was not reaped in time");
    }
    ShutdownOutcome::Killed
}

/// Spawn options resolved from config and the caller
#[derive(Debug, Clone)]
pub struct LaunchSpec<'a> {
    pub executable: &'a Path,
    pub args: Vec<String>,
    pub headless: bool,
    pub capture_output: bool,
}

/// Spawn the emulator
///
/// Output is either discarded or drained line by line into `debug` logs,
/// so the child can never block on a full pipe.
pub fn spawn(spec: &LaunchSpec<'_>) -> Result<Child> {
    let mut cmd = Command::new(spec.executable);
    cmd.args(&spec.args)
        .stdin(Stdio::null())
        .kill_on_drop(true);

    if spec.headless {
        cmd.envs(HEADLESS_ENV);
    }

    if spec.capture_output {
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    } else {
        cmd.stdout(Stdio::null()).stderr(Stdio::null());
    }

    let mut child = cmd.spawn().map_err(|e| {
        Error::EmulatorSpawnFailed(format!("{}: {}", spec.executable.display(), e))
    })?;

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(drain(stdout, "stdout"));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(drain(stderr, "stderr"));
    }

    tracing::debug!(
        pid = ?child.id(),
        executable = %spec.executable.display(),
        args = ?spec.args,
        headless = spec.headless,
        "Spawned emulator"
    );
    Ok(child)
}

async fn drain<R>(stream: R, name: &'static str)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => tracing::debug!(target: "emulator", stream = name, "{}", line),
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(target: "emulator", stream = name, error = %e, "Output closed");
                break;
            }
        }
    }
}
