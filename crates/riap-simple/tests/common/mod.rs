//! Minimal Riap::Simple peers for integration tests.
//!
//! Each server accepts connections on a real socket, reads request frames
//! (both the `j` and the `J<len>` form) and answers according to a [`Mode`].

#![allow(dead_code)]

use async_trait::async_trait;
use riap_simple::{Connection, Connector, RiapError, TargetDescriptor, TransportConnector};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// How a test server answers.
#[derive(Debug, Clone)]
pub enum Mode {
    /// Reply `[200, "OK", <request>]` and keep the connection open.
    Echo,
    /// Reply `[200, "OK", <request>]` and close after every reply.
    EchoOnce,
    /// Reply with these exact bytes and keep the connection open.
    Raw(Vec<u8>),
    /// Read the request, then close without replying.
    NoReply,
    /// Read the request, then hold the connection open forever.
    Silent,
}

/// Handles for observing a running server.
pub struct ServerHandle {
    /// Connections accepted so far.
    pub accepted: Arc<AtomicUsize>,
    /// Every request frame received, byte-exact.
    pub frames: mpsc::UnboundedReceiver<Vec<u8>>,
    /// One message per connection the server has finished with.
    pub closed: mpsc::UnboundedReceiver<()>,
}

pub struct TcpServer {
    pub port: u16,
    pub handle: ServerHandle,
}

impl TcpServer {
    pub fn url(&self, uri: &str) -> String {
        format!("riap+tcp://127.0.0.1:{}{}", self.port, uri)
    }
}

/// Start a TCP server on an ephemeral loopback port.
pub async fn start_tcp_server(mode: Mode) -> TcpServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (handle, accepted, frames_tx, closed_tx) = handle_parts();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            accepted.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(serve(stream, mode.clone(), frames_tx.clone(), closed_tx.clone()));
        }
    });

    TcpServer { port, handle }
}

/// Start a Unix socket server at `path`.
#[cfg(unix)]
pub fn start_unix_server(path: &std::path::Path, mode: Mode) -> ServerHandle {
    let listener = tokio::net::UnixListener::bind(path).unwrap();
    let (handle, accepted, frames_tx, closed_tx) = handle_parts();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            accepted.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(serve(stream, mode.clone(), frames_tx.clone(), closed_tx.clone()));
        }
    });

    handle
}

type Parts = (
    ServerHandle,
    Arc<AtomicUsize>,
    mpsc::UnboundedSender<Vec<u8>>,
    mpsc::UnboundedSender<()>,
);

fn handle_parts() -> Parts {
    let accepted = Arc::new(AtomicUsize::new(0));
    let (frames_tx, frames) = mpsc::unbounded_channel();
    let (closed_tx, closed) = mpsc::unbounded_channel();
    (
        ServerHandle {
            accepted: accepted.clone(),
            frames,
            closed,
        },
        accepted,
        frames_tx,
        closed_tx,
    )
}

async fn serve<S>(
    stream: S,
    mode: Mode,
    frames_tx: mpsc::UnboundedSender<Vec<u8>>,
    closed_tx: mpsc::UnboundedSender<()>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);

    while let Ok(Some(frame)) = read_frame(&mut reader).await {
        let request = frame_body(&frame);
        let _ = frames_tx.send(frame);

        let reply = match &mode {
            Mode::Echo | Mode::EchoOnce => response_frame(&json!([200, "OK", request])),
            Mode::Raw(bytes) => bytes.clone(),
            Mode::NoReply => break,
            Mode::Silent => {
                std::future::pending::<()>().await;
                break;
            }
        };
        if writer.write_all(&reply).await.is_err() || writer.flush().await.is_err() {
            break;
        }
        if matches!(mode, Mode::EchoOnce) {
            break;
        }
    }

    drop(reader);
    drop(writer);
    let _ = closed_tx.send(());
}

/// Read one request frame, returning its raw bytes. `None` on end of stream.
pub async fn read_frame<R>(reader: &mut R) -> std::io::Result<Option<Vec<u8>>>
where
    R: AsyncBufRead + Unpin,
{
    let mut frame = Vec::new();
    if reader.read_until(b'\n', &mut frame).await? == 0 {
        return Ok(None);
    }
    if frame.first() == Some(&b'J') {
        let digits = std::str::from_utf8(&frame[1..frame.len() - 2]).unwrap();
        let len: usize = digits.parse().unwrap();
        let mut body = vec![0u8; len + 2];
        reader.read_exact(&mut body).await?;
        frame.extend_from_slice(&body);
    }
    Ok(Some(frame))
}

/// Decode the JSON request carried by a frame.
pub fn frame_body(frame: &[u8]) -> Value {
    let body = match frame.first() {
        Some(b'j') => &frame[1..frame.len() - 2],
        Some(b'J') => {
            let header_end = frame.iter().position(|&b| b == b'\n').unwrap() + 1;
            &frame[header_end..frame.len() - 2]
        }
        other => panic!("unexpected frame prefix: {:?}", other),
    };
    serde_json::from_slice(body).unwrap()
}

/// Encode a response frame: `J<len>\r\n<json>\r\n`.
pub fn response_frame(value: &Value) -> Vec<u8> {
    let body = serde_json::to_vec(value).unwrap();
    let mut frame = format!("J{}\r\n", body.len()).into_bytes();
    frame.extend_from_slice(&body);
    frame.extend_from_slice(b"\r\n");
    frame
}

/// Connector that counts attempts and either delegates or always fails.
pub struct CountingConnector {
    inner: Option<TransportConnector>,
    pub attempts: AtomicU32,
}

impl CountingConnector {
    pub fn delegating() -> Arc<Self> {
        Arc::new(Self {
            inner: Some(TransportConnector::default()),
            attempts: AtomicU32::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            inner: None,
            attempts: AtomicU32::new(0),
        })
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for CountingConnector {
    async fn connect(&self, target: &TargetDescriptor) -> riap_simple::Result<Connection> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        match &self.inner {
            Some(inner) => inner.connect(target).await,
            None => Err(RiapError::ConnectFailed {
                endpoint: target.endpoint(),
                source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
            }),
        }
    }
}

/// Build an extra-fields map from a JSON object literal.
pub fn extra(value: Value) -> serde_json::Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("not an object: {}", other),
    }
}
