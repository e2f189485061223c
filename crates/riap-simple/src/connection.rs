//! Live transport handles and the connectors that open them.
//!
//! A [`Connection`] is one duplex byte channel to a Riap::Simple peer:
//!
//! - TCP: one stream used for both directions
//! - Unix: one stream socket used for both directions
//! - Pipe: a child process, written through its stdin and read through its
//!   stdout
//!
//! Dropping a connection releases it. Sockets close; a pipe child is reaped
//! if it already exited, or killed (and reaped in the background) if it is
//! still running.

use crate::error::{Result, RiapError};
use crate::frame::{read_response, write_frame};
use crate::platform::{is_process_alive, is_socket_idle};
use crate::target::{display_command, TargetDescriptor};
use async_trait::async_trait;
use std::future::Future;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::BufReader;
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::debug;

/// Opens connections for classified targets.
///
/// The client holds one of these behind an `Arc`; hosts can substitute their
/// own to add tunnelling, fault injection or bookkeeping.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish a fresh connection to `target`.
    ///
    /// Failures to reach the peer must be reported as
    /// [`RiapError::ConnectFailed`] so the caller retries them.
    async fn connect(&self, target: &TargetDescriptor) -> Result<Connection>;
}

/// The built-in connector: dials TCP, connects Unix sockets and spawns pipe
/// subprocesses.
#[derive(Debug, Clone, Default)]
pub struct TransportConnector {
    connect_timeout: Option<Duration>,
}

impl TransportConnector {
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        Self { connect_timeout }
    }

    async fn connect_tcp(&self, host: &str, port: u16, endpoint: String) -> Result<Connection> {
        let stream = within(
            self.connect_timeout,
            &endpoint,
            TcpStream::connect((host, port)),
        )
        .await?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Can't set TCP_NODELAY on {}: {}", endpoint, e);
        }
        Ok(Connection {
            endpoint,
            link: Link::Tcp(BufReader::new(stream)),
        })
    }

    #[cfg(unix)]
    async fn connect_unix(&self, path: &std::path::Path, endpoint: String) -> Result<Connection> {
        let stream = within(self.connect_timeout, &endpoint, UnixStream::connect(path)).await?;
        Ok(Connection {
            endpoint,
            link: Link::Unix(BufReader::new(stream)),
        })
    }

    fn spawn_pipe(
        &self,
        program: &std::path::Path,
        args: &[String],
        endpoint: String,
    ) -> Result<Connection> {
        let failed = |source: std::io::Error| RiapError::ConnectFailed {
            endpoint: display_command(program, args),
            source,
        };

        // Literal argv, no shell in between.
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(failed)?;

        let missing = |what: &str| failed(std::io::Error::other(format!("child {} not captured", what)));
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
        let pid = child.id().ok_or_else(|| missing("pid"))?;

        debug!("Spawned pipe process {} for {}", pid, endpoint);

        Ok(Connection {
            endpoint,
            link: Link::Pipe(PipeLink {
                stdin,
                stdout: BufReader::new(stdout),
                child,
                pid,
            }),
        })
    }
}

#[async_trait]
impl Connector for TransportConnector {
    async fn connect(&self, target: &TargetDescriptor) -> Result<Connection> {
        let endpoint = target.endpoint();
        let start = Instant::now();

        let connection = match target {
            TargetDescriptor::Tcp { host, port, .. } => {
                self.connect_tcp(host, *port, endpoint).await?
            }
            #[cfg(unix)]
            TargetDescriptor::Unix { socket_path, .. } => {
                self.connect_unix(socket_path, endpoint).await?
            }
            #[cfg(not(unix))]
            TargetDescriptor::Unix { .. } => {
                return Err(RiapError::ConnectFailed {
                    endpoint,
                    source: std::io::Error::new(
                        std::io::ErrorKind::Unsupported,
                        "Unix sockets are not available on this platform",
                    ),
                });
            }
            TargetDescriptor::Pipe {
                program_path,
                program_args,
                ..
            } => self.spawn_pipe(program_path, program_args, endpoint)?,
        };

        debug!(
            endpoint = %connection.endpoint,
            elapsed_us = start.elapsed().as_micros() as u64,
            "Connected"
        );
        Ok(connection)
    }
}

/// Await a connect future under an optional deadline.
///
/// An expired deadline is a connect failure like any other, so it is retried.
async fn within<T, F>(limit: Option<Duration>, endpoint: &str, connect: F) -> Result<T>
where
    F: Future<Output = std::io::Result<T>>,
{
    let failed = |source| RiapError::ConnectFailed {
        endpoint: endpoint.to_string(),
        source,
    };

    match limit {
        Some(limit) => tokio::time::timeout(limit, connect)
            .await
            .map_err(|_| {
                failed(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("connect timed out after {:?}", limit),
                ))
            })?
            .map_err(failed),
        None => connect.await.map_err(failed),
    }
}

/// One live, exclusively owned channel to a peer.
#[derive(Debug)]
pub struct Connection {
    endpoint: String,
    link: Link,
}

#[derive(Debug)]
enum Link {
    Tcp(BufReader<TcpStream>),
    #[cfg(unix)]
    Unix(BufReader<UnixStream>),
    Pipe(PipeLink),
}

#[derive(Debug)]
struct PipeLink {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    child: Child,
    pid: u32,
}

impl Drop for PipeLink {
    fn drop(&mut self) {
        match self.child.try_wait() {
            Ok(Some(status)) => debug!("Reaped pipe process {} ({})", self.pid, status),
            Ok(None) => debug!("Killing pipe process {}", self.pid),
            Err(e) => debug!("Can't check pipe process {}: {}", self.pid, e),
        }
    }
}

impl Connection {
    /// Human-readable peer address or command line.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Process id of the peer, for pipe connections.
    pub fn pid(&self) -> Option<u32> {
        match &self.link {
            Link::Pipe(pipe) => Some(pipe.pid),
            _ => None,
        }
    }

    /// Check whether this connection can no longer carry a request.
    ///
    /// - sockets: the peer closed, errored, or sent bytes nobody asked for
    /// - pipes: the child process has exited
    pub fn is_stale(&mut self) -> bool {
        match &mut self.link {
            Link::Tcp(stream) => {
                !stream.buffer().is_empty() || !is_socket_idle(stream.get_ref())
            }
            #[cfg(unix)]
            Link::Unix(stream) => {
                !stream.buffer().is_empty() || !is_socket_idle(stream.get_ref())
            }
            Link::Pipe(pipe) => {
                if !pipe.stdout.buffer().is_empty() {
                    return true;
                }
                match pipe.child.try_wait() {
                    Ok(Some(status)) => {
                        debug!("Pipe process {} exited ({})", pipe.pid, status);
                        true
                    }
                    Ok(None) => !is_process_alive(pipe.pid),
                    Err(_) => true,
                }
            }
        }
    }

    /// Send one framed request and read back one decoded response.
    pub async fn exchange(&mut self, frame: &[u8], max_len: usize) -> Result<serde_json::Value> {
        match &mut self.link {
            Link::Tcp(stream) => {
                write_frame(stream, frame).await?;
                read_response(stream, max_len).await
            }
            #[cfg(unix)]
            Link::Unix(stream) => {
                write_frame(stream, frame).await?;
                read_response(stream, max_len).await
            }
            Link::Pipe(pipe) => {
                write_frame(&mut pipe.stdin, frame).await?;
                read_response(&mut pipe.stdout, max_len).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const MAX: usize = 1024 * 1024;

    fn tcp_target(port: u16) -> TargetDescriptor {
        TargetDescriptor::Tcp {
            host: "127.0.0.1".into(),
            port,
            embedded_uri: None,
        }
    }

    #[tokio::test]
    async fn test_tcp_connect_refused_is_connect_failed() {
        // Bind then drop to get a port nothing listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let err = TransportConnector::default()
            .connect(&tcp_target(port))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains(&format!("127.0.0.1:{}", port)));
    }

    #[tokio::test]
    async fn test_tcp_exchange_and_staleness() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            let n = socket.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"j{}\r\n");
            socket.write_all(b"J2\r\n[]\r\n").await.unwrap();
            // Close after one reply
        });

        let mut conn = TransportConnector::default()
            .connect(&tcp_target(port))
            .await
            .unwrap();
        assert!(!conn.is_stale());
        assert!(conn.pid().is_none());

        let value = conn.exchange(b"j{}\r\n", MAX).await.unwrap();
        assert_eq!(value, serde_json::json!([]));

        server.await.unwrap();
        // Loopback FIN is delivered by the time the server task finishes
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(conn.is_stale());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pipe_spawn_failure_names_command() {
        let err = TransportConnector::default()
            .connect(&TargetDescriptor::Pipe {
                program_path: "/nonexistent/riap-server".into(),
                program_args: vec!["--flag".into()],
                embedded_uri: None,
            })
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("/nonexistent/riap-server --flag"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pipe_exited_child_is_stale() {
        let mut conn = TransportConnector::default()
            .connect(&TargetDescriptor::Pipe {
                program_path: "/bin/sh".into(),
                program_args: vec!["-c".into(), "exit 0".into()],
                embedded_uri: None,
            })
            .await
            .unwrap();
        assert!(conn.pid().is_some());

        let mut stale = false;
        for _ in 0..100 {
            if conn.is_stale() {
                stale = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(stale);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pipe_exchange() {
        let script = r#"IFS= read -r line; printf 'J2\r\n{}\r\n'"#;
        let mut conn = TransportConnector::default()
            .connect(&TargetDescriptor::Pipe {
                program_path: "/bin/sh".into(),
                program_args: vec!["-c".into(), script.into()],
                embedded_uri: None,
            })
            .await
            .unwrap();

        let value = conn.exchange(b"j{\"action\":\"info\"}\r\n", MAX).await.unwrap();
        assert_eq!(value, serde_json::json!({}));
    }
}
