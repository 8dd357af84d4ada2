//! DAP transport layer — Content-Length based message framing.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::DapError;

/// Largest message body accepted from the peer (16 MiB).
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Encode a JSON value into a DAP wire-format message with Content-Length header.
pub fn encode_message(value: &serde_json::Value) -> Vec<u8> {
    let body = serde_json::to_string(value).unwrap_or_default();
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    let mut buf = Vec::with_capacity(header.len() + body.len());
    buf.extend_from_slice(header.as_bytes());
    buf.extend_from_slice(body.as_bytes());
    buf
}

/// Read one framed message from an async stream.
///
/// Returns `Ok(None)` on a clean end of stream between messages.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<serde_json::Value>, DapError>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut saw_header = false;
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            if saw_header {
                return Err(DapError::Transport("stream closed inside header".into()));
            }
            return Ok(None);
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if saw_header {
                break;
            }
            continue;
        }
        saw_header = true;
        if trimmed.starts_with("Content-Length:") {
            content_length = Some(parse_content_length(trimmed)?);
        }
    }

    let length =
        content_length.ok_or_else(|| DapError::Transport("missing Content-Length header".into()))?;
    if length > MAX_MESSAGE_SIZE {
        return Err(DapError::Transport(format!(
            "message of {length} bytes exceeds the {MAX_MESSAGE_SIZE} byte limit"
        )));
    }
    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).await?;
    tracing::trace!(length, "read DAP message");
    let value = serde_json::from_slice(&body)
        .map_err(|e| DapError::InvalidMessage(format!("JSON parse error: {e}")))?;
    Ok(Some(value))
}

/// Frame and write one message, flushing the stream.
pub async fn write_message<W>(writer: &mut W, value: &serde_json::Value) -> Result<(), DapError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&encode_message(value)).await?;
    writer.flush().await?;
    Ok(())
}

/// Parse the Content-Length value from the header section.
fn parse_content_length(header: &str) -> Result<usize, DapError> {
    for line in header.split("\r\n") {
        let line = line.trim();
        if let Some(value) = line.strip_prefix("Content-Length:") {
            let value = value.trim();
            return value.parse::<usize>().map_err(|e| {
                DapError::Transport(format!("invalid Content-Length value '{value}': {e}"))
            });
        }
    }
    Err(DapError::Transport("missing Content-Length header".into()))
}
