//! TCP transport for the emulator's line protocol
//!
//! Every request is a full connection lifecycle: connect, write one line,
//! read until the server closes (or the reply cap is hit), close.

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

use crate::common::{Error, Result};

use super::protocol::MAX_REPLY_BYTES;

/// Address and per-call timeout of the emulator's IPC server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
}

impl ConnectionTarget {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }
}

impl std::fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Run `op` under the target's timeout, mapping expiry to `Error::Timeout`
async fn bounded<T, F>(limit: Duration, op: F) -> Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match timeout(limit, op).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) if e.kind() == io::ErrorKind::TimedOut => Err(Error::Timeout),
        Ok(Err(e)) => Err(Error::Transport(e)),
        Err(_) => Err(Error::Timeout),
    }
}

/// Open a connection to the target
pub async fn connect(target: &ConnectionTarget) -> Result<TcpStream> {
    bounded(
        target.timeout,
        TcpStream::connect((target.host.as_str(), target.port)),
    )
    .await
}

/// Send one line and read one reply over a fresh connection
///
/// The newline is appended here. The reply is read until EOF or
/// `MAX_REPLY_BYTES`, decoded lossily and trimmed of trailing whitespace.
/// The stream is closed before returning on every path.
pub async fn round_trip(target: &ConnectionTarget, line: &str) -> Result<String> {
    let mut stream = connect(target).await?;

    let result = exchange(&mut stream, target.timeout, line).await;

    // Best effort: the server usually closed first
    let _ = stream.shutdown().await;
    drop(stream);

    result
}

async fn exchange(stream: &mut TcpStream, limit: Duration, line: &str) -> Result<String> {
    let mut frame = Vec::with_capacity(line.len() + 1);
    frame.extend_from_slice(line.as_bytes());
    frame.push(b'\n');

    bounded(limit, async {
        stream.write_all(&frame).await?;
        stream.flush().await
    })
    .await?;

    let mut reply = Vec::with_capacity(4096);
    bounded(limit, async {
        let mut capped = (&mut *stream).take(MAX_REPLY_BYTES as u64);
        capped.read_to_end(&mut reply).await
    })
    .await?;

    let text = String::from_utf8_lossy(&reply);
    Ok(text.trim_end().to_string())
}

/// Poll `dial` until it succeeds, at most `attempts` times with a fixed
/// `delay` between attempts
pub async fn retry_connect<F, Fut>(attempts: u32, delay: Duration, mut dial: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    for attempt in 1..=attempts {
        match dial().await {
            Ok(()) => {
                tracing::debug!(attempt, "IPC server reachable");
                return true;
            }
            Err(e) => {
                tracing::debug!(attempt, attempts, error = %e, "IPC server not reachable yet");
            }
        }
        if attempt < attempts {
            sleep(delay).await;
        }
    }
    false
}

/// Bare connect-and-close readiness probe
pub async fn probe(target: &ConnectionTarget, attempts: u32, delay: Duration) -> bool {
    retry_connect(attempts, delay, move || async move { connect(target).await.map(drop) }).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    fn target(port: u16) -> ConnectionTarget {
        ConnectionTarget::new("127.0.0.1", port, Duration::from_millis(500))
    }

    /// A port with nothing listening on it
    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_round_trip_sends_one_line_and_trims_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            let mut stream = reader.into_inner();
            stream.write_all(b"OK pong\r\n\n").await.unwrap();
            line
        });

        let reply = round_trip(&target(port), "ping").await.unwrap();
        assert_eq!(reply, "OK pong");
        assert_eq!(server.await.unwrap(), "ping\n");
    }

    #[tokio::test]
    async fn test_reply_is_capped() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            let mut stream = reader.into_inner();
            let big = vec![b'A'; MAX_REPLY_BYTES + 1000];
            let _ = stream.write_all(&big).await;
        });

        let reply = round_trip(&target(port), "mem read 0x0000 65535").await.unwrap();
        assert_eq!(reply.len(), MAX_REPLY_BYTES);
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(stream);
        });

        let target = ConnectionTarget::new("127.0.0.1", port, Duration::from_millis(100));
        let err = round_trip(&target, "wait vbl 1000 60000").await.unwrap_err();
        assert!(matches!(err, Error::Timeout));
    }

    #[tokio::test]
    async fn test_refused_connection_is_transport_error() {
        let port = closed_port().await;
        let err = round_trip(&target(port), "ping").await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn test_retry_connect_exhausts_attempts_with_delay() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let delay = Duration::from_millis(30);

        let started = Instant::now();
        let ok = retry_connect(3, delay, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Error::Transport(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "refused",
                )))
            }
        })
        .await;

        assert!(!ok);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Two gaps between three attempts, none after the last
        assert!(started.elapsed() >= delay * 2);
        assert!(started.elapsed() < delay * 3 + Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_retry_connect_stops_on_first_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let ok = retry_connect(10, Duration::from_millis(5), move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::Timeout)
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert!(ok);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_probe_against_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(probe(&target(port), 2, Duration::from_millis(10)).await);

        drop(listener);
        assert!(!probe(&target(port), 2, Duration::from_millis(10)).await);
    }
}
