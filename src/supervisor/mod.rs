//! Emulator process supervision
//!
//! A [`Supervisor`] owns at most one emulator process it spawned itself,
//! waits for the IPC server to come up after spawning, and tears the
//! process down with terminate-then-kill. [`with_session`] scopes a
//! supervisor so teardown runs on every exit path.

pub mod process;

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::common::config::Config;
use crate::common::{paths, Error, Result};
use crate::ipc::EmulatorClient;

use process::{ChildProcess, LaunchSpec, ShutdownOutcome};

/// Owns the emulator process and the client that talks to it
pub struct Supervisor {
    config: Config,
    client: EmulatorClient,
    child: Option<Box<dyn ChildProcess>>,
}

impl Supervisor {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
            client: EmulatorClient::from_config(config),
            child: None,
        }
    }

    /// Client bound to this emulator's IPC port
    pub fn ipc(&self) -> &EmulatorClient {
        &self.client
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().and_then(|c| c.pid())
    }

    /// Start the emulator and wait for its IPC server
    ///
    /// Prints the reason and returns `false` on failure; nothing is left
    /// running in that case.
    pub async fn start(&mut self, args: &[&str], headless: bool) -> bool {
        match self.try_start(args, headless).await {
            Ok(()) => true,
            Err(e) => {
                println!("Failed to start emulator: {}", e);
                false
            }
        }
    }

    /// Start with the configured headless setting
    pub async fn start_default(&mut self) -> bool {
        let headless = self.config.emulator.headless;
        self.start(&[], headless).await
    }

    /// Typed-error version of [`start`](Self::start)
    pub async fn try_start(&mut self, args: &[&str], headless: bool) -> Result<()> {
        if self.child.is_some() {
            return Err(Error::EmulatorAlreadyRunning(self.pid()));
        }

        let executable: PathBuf =
            paths::resolve_executable(self.config.emulator.executable.as_deref())?;
        let spec = LaunchSpec {
            executable: &executable,
            args: self
                .config
                .emulator
                .args
                .iter()
                .cloned()
                .chain(args.iter().map(|a| a.to_string()))
                .collect(),
            headless,
            capture_output: self.config.emulator.capture_output,
        };

        let child = process::spawn(&spec)?;
        self.adopt(Box::new(child)).await
    }

    /// Take ownership of a freshly spawned child and wait for readiness
    async fn adopt(&mut self, child: Box<dyn ChildProcess>) -> Result<()> {
        self.child = Some(child);

        let retries = self.config.probe.retries;
        if self.client.connect(retries, self.config.probe.delay()).await {
            tracing::info!(pid = ?self.pid(), target = %self.client.target(), "Emulator ready");
            Ok(())
        } else {
            tracing::warn!(target = %self.client.target(), "Emulator never became reachable");
            self.stop().await;
            Err(Error::EmulatorNotReady { attempts: retries })
        }
    }

    /// Stop the emulator: terminate, wait out the grace period, then kill
    ///
    /// Idempotent; the handle is cleared whatever happens.
    pub async fn stop(&mut self) {
        self.stop_with_outcome().await;
    }

    async fn stop_with_outcome(&mut self) -> Option<ShutdownOutcome> {
        let grace = self.grace();
        let mut child = self.child.take()?;
        let outcome = process::shutdown(child.as_mut(), grace).await;
        Some(outcome)
    }

    fn grace(&self) -> Duration {
        self.config.emulator.grace()
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        // Best effort since we can't await in drop
        if let Some(mut child) = self.child.take() {
            tracing::warn!(pid = ?child.pid(), "Supervisor dropped with a live emulator, killing");
            let _ = child.force_kill();
        }
    }
}

/// Run `body` against a fresh supervisor and stop the emulator afterwards
///
/// The stop runs whether the body returns normally, returns an error, or
/// panics; a panic is re-raised after cleanup.
pub async fn with_session<T, F>(config: &Config, body: F) -> T
where
    F: for<'a> FnOnce(&'a mut Supervisor) -> BoxFuture<'a, T>,
{
    let mut emu = Supervisor::new(config);
    let outcome = AssertUnwindSafe(body(&mut emu)).catch_unwind().await;
    emu.stop().await;
    match outcome {
        Ok(value) => value,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

#[cfg(test)]
mod tests {
    use super::process::tests::FakeChild;
    use super::*;
    use std::sync::atomic::Ordering;
    use tokio::net::TcpListener;

    fn test_config(port: u16) -> Config {
        let mut config = Config::default();
        config.connection.host = "127.0.0.1".to_string();
        config.connection.port = port;
        config.connection.timeout_ms = 200;
        config.probe.retries = 3;
        config.probe.delay_ms = 10;
        config.emulator.grace_secs = 0;
        config
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_kills_once() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut emu = Supervisor::new(&test_config(port));
        let child = FakeChild::new(true);
        let kills = child.kills.clone();
        let terminates = child.terminates.clone();

        emu.adopt(Box::new(child)).await.unwrap();
        assert!(emu.is_running());

        assert_eq!(emu.stop_with_outcome().await, Some(ShutdownOutcome::Killed));
        assert!(!emu.is_running());
        assert_eq!(emu.stop_with_outcome().await, None);

        assert_eq!(terminates.load(Ordering::SeqCst), 1);
        assert_eq!(kills.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unreachable_emulator_is_torn_down() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut emu = Supervisor::new(&test_config(port));
        let child = FakeChild::new(false);
        let terminates = child.terminates.clone();

        let err = emu.adopt(Box::new(child)).await.unwrap_err();
        assert!(matches!(err, Error::EmulatorNotReady { attempts: 3 }));
        assert!(!emu.is_running());
        assert_eq!(terminates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_second_start_is_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let mut emu = Supervisor::new(&test_config(port));
        emu.adopt(Box::new(FakeChild::new(false))).await.unwrap();

        let err = emu.try_start(&[], true).await.unwrap_err();
        assert!(matches!(err, Error::EmulatorAlreadyRunning(Some(4242))));
        emu.stop().await;
    }

    #[tokio::test]
    async fn test_missing_executable_fails_start() {
        let mut config = test_config(1);
        config.emulator.executable = Some(PathBuf::from("/nonexistent/koncepcja"));

        let mut emu = Supervisor::new(&config);
        assert!(!emu.start(&[], true).await);
        assert!(!emu.is_running());
    }

    #[tokio::test]
    async fn test_session_stops_after_panic() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = test_config(port);

        let child = FakeChild::new(false);
        let terminates = child.terminates.clone();

        let result = AssertUnwindSafe(with_session::<(), _>(&config, move |emu| {
            Box::pin(async move {
                emu.adopt(Box::new(child)).await.unwrap();
                panic!("scenario blew up");
            })
        }))
        .catch_unwind()
        .await;

        assert!(result.is_err());
        assert_eq!(terminates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_session_stops_after_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = test_config(port);

        let child = FakeChild::new(false);
        let terminates = child.terminates.clone();

        let result: Result<()> = with_session(&config, move |emu| {
            Box::pin(async move {
                emu.adopt(Box::new(child)).await?;
                Err::<(), _>(Error::scenario("assertion failed"))
            })
        })
        .await;

        assert!(result.is_err());
        assert_eq!(terminates.load(Ordering::SeqCst), 1);
    }
}
