//! Riap::Simple wire framing.
//!
//! Requests are sent in one of two forms, depending on the encoded size:
//!
//! ```text
//! j<json>\r\n                        (encoded length <= 1000 bytes)
//! J<decimal length>\r\n<json>\r\n    (anything longer)
//! ```
//!
//! Responses always use the length-prefixed `J` form.

use crate::config::FrameConfig;
use crate::error::{Result, RiapError};
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// Which request frame form an encoded payload gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameForm {
    /// `j<json>\r\n`
    Short,
    /// `J<len>\r\n<json>\r\n`
    Long,
}

impl FrameForm {
    pub fn for_len(len: usize) -> Self {
        if len <= FrameConfig::SHORT_FRAME_MAX_LEN {
            FrameForm::Short
        } else {
            FrameForm::Long
        }
    }
}

/// Encode a request and wrap it in a request frame.
///
/// Fails before producing any bytes if the request cannot be encoded.
pub fn encode_request<T: Serialize + ?Sized>(request: &T) -> Result<Vec<u8>> {
    let payload = serde_json::to_vec(request).map_err(|source| RiapError::Encode { source })?;
    Ok(frame_payload(&payload))
}

/// Wrap an already encoded payload in a request frame.
pub fn frame_payload(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + 24);
    match FrameForm::for_len(payload.len()) {
        FrameForm::Short => {
            frame.push(FrameConfig::SHORT_FRAME_PREFIX);
            frame.extend_from_slice(payload);
            frame.extend_from_slice(FrameConfig::LINE_TERMINATOR);
        }
        FrameForm::Long => {
            frame.push(FrameConfig::LONG_FRAME_PREFIX);
            frame.extend_from_slice(payload.len().to_string().as_bytes());
            frame.extend_from_slice(FrameConfig::LINE_TERMINATOR);
            frame.extend_from_slice(payload);
            frame.extend_from_slice(FrameConfig::LINE_TERMINATOR);
        }
    }
    frame
}

/// Write one already framed request and flush it.
pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    trace!("Sending {} byte request frame", frame.len());

    writer
        .write_all(frame)
        .await
        .map_err(|source| RiapError::Io {
            operation: "sending request",
            source,
        })?;
    writer.flush().await.map_err(|source| RiapError::Io {
        operation: "sending request",
        source,
    })?;
    Ok(())
}

/// Read one `J<len>\r\n<json>\r\n` response frame and decode its payload.
///
/// A peer that closes the stream instead of answering, a header that is not
/// `J` followed by digits, a short body and an undecodable body are all
/// protocol errors.
pub async fn read_response<R>(reader: &mut R, max_len: usize) -> Result<serde_json::Value>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let payload = read_response_payload(reader, max_len).await?;
    serde_json::from_slice(&payload).map_err(|source| RiapError::Protocol {
        message: format!("can't decode response: {}", source),
        source: Some(source),
    })
}

/// Read one response frame and return its raw payload.
pub async fn read_response_payload<R>(reader: &mut R, max_len: usize) -> Result<Vec<u8>>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let mut header = Vec::new();
    read_line(reader, &mut header).await?;
    if header.is_empty() {
        return Err(RiapError::protocol(
            "empty response from server (connection closed)",
        ));
    }

    let len = parse_header(&header)?;
    if len > max_len {
        return Err(RiapError::protocol(format!(
            "response size {} exceeds maximum {}",
            len, max_len
        )));
    }
    trace!("Receiving {} byte response", len);

    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|source| match source.kind() {
            std::io::ErrorKind::UnexpectedEof => RiapError::protocol(format!(
                "connection closed before the {} byte response was complete",
                len
            )),
            _ => RiapError::Io {
                operation: "reading response",
                source,
            },
        })?;

    // The payload is followed by a CRLF line that carries nothing.
    let mut trailer = Vec::new();
    read_line(reader, &mut trailer).await?;

    Ok(payload)
}

async fn read_line<R>(reader: &mut R, line: &mut Vec<u8>) -> Result<()>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let mut limited = reader.take(FrameConfig::MAX_HEADER_LINE_LEN);
    limited
        .read_until(b'\n', line)
        .await
        .map_err(|source| RiapError::Io {
            operation: "reading response",
            source,
        })?;
    Ok(())
}

fn parse_header(line: &[u8]) -> Result<usize> {
    let invalid = || {
        RiapError::protocol(format!(
            "invalid response line from server: {:?}",
            String::from_utf8_lossy(line)
        ))
    };

    let line = line.strip_suffix(b"\n").ok_or_else(invalid)?;
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let digits = line
        .strip_prefix(&[FrameConfig::LONG_FRAME_PREFIX])
        .ok_or_else(invalid)?;
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return Err(invalid());
    }

    std::str::from_utf8(digits)
        .ok()
        .and_then(|d| d.parse::<usize>().ok())
        .ok_or_else(invalid)
}
