//! TCP transport protocol
//!
//! This module defines the envelope messages exchanged between a worker and
//! the coordinator over TCP. The protocol uses MessagePack (rmp-serde) for
//! compact binary serialization with full serde feature support.
//!
//! # Protocol Version
//!
//! Current version: 1
//!
//! # Message Flow
//!
//! ```text
//! Worker (rank r)                 Coordinator (rank 0)
//!     |                              |
//!     |-------- HELLO(r) ----------->|
//!     |<------- ACCEPTED ------------|   (or ERROR, then close)
//!     |                              |
//!     |-- PAYLOAD(SCALAR) ---------->|
//!     |-- PAYLOAD(MENTIONS) -------->|
//!     |-- PAYLOAD(TOPICS) ---------->|
//!     |                              |
//!     |-------- close -------------->|
//! ```
//!
//! # Framing
//!
//! ```text
//! [u32 LE body length][body: MessagePack-encoded Message]
//! ```
//!
//! Payload bytes inside a `Payload` message are opaque here; count maps use
//! their own versioned encoding (see `counts::codec`).

use super::{Rank, Tag};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Bumped on any incompatible change to [`Message`]
pub const PROTOCOL_VERSION: u32 = 1;

/// Largest accepted frame body
pub const MAX_MESSAGE_LEN: usize = 100 * 1024 * 1024;

/// Size of the length header in front of every frame
pub const FRAME_HEADER_LEN: usize = 4;

/// Protocol message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Hello message (Worker → Coordinator)
    ///
    /// First message on every connection; binds the connection to a rank.
    Hello(HelloMessage),

    /// Accepted message (Coordinator → Worker)
    ///
    /// The hello was valid and the rank is registered.
    Accepted(AcceptedMessage),

    /// Tagged payload (either direction after the handshake)
    Payload(PayloadMessage),

    /// Error message (either direction)
    ///
    /// Sent before closing a connection that cannot continue.
    Error(ErrorMessage),
}

/// Hello message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloMessage {
    /// Protocol version
    pub protocol_version: u32,

    /// Rank of the connecting worker
    pub rank: Rank,

    /// Worker count the worker was configured with
    pub worker_count: usize,

    /// Node identifier (hostname)
    pub node_id: String,
}

/// Accepted message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedMessage {
    /// Protocol version
    pub protocol_version: u32,

    /// Coordinator node identifier
    pub node_id: String,
}

/// Tagged payload message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadMessage {
    pub tag: Tag,
    pub bytes: Vec<u8>,
}

/// Error message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Node identifier
    pub node_id: String,

    /// Error description
    pub error: String,
}

/// Body length announced by a frame header
fn body_len(header: [u8; FRAME_HEADER_LEN]) -> Result<usize> {
    let len = u32::from_le_bytes(header) as usize;
    if len > MAX_MESSAGE_LEN {
        anyhow::bail!("Message too large: {} bytes (limit {})", len, MAX_MESSAGE_LEN);
    }
    Ok(len)
}

/// Encode `msg` as one length-prefixed frame
pub fn serialize_message(msg: &Message) -> Result<Vec<u8>> {
    let body = rmp_serde::to_vec(msg).context("Failed to encode message")?;
    if body.len() > MAX_MESSAGE_LEN {
        anyhow::bail!("Message too large: {} bytes (limit {})", body.len(), MAX_MESSAGE_LEN);
    }

    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
    frame.extend(body);
    Ok(frame)
}

/// Decode the frame at the start of `buf`
///
/// Returns the message and the frame length, header included.
pub fn deserialize_message(buf: &[u8]) -> Result<(Message, usize)> {
    let header = buf
        .get(..FRAME_HEADER_LEN)
        .and_then(|h| <[u8; FRAME_HEADER_LEN]>::try_from(h).ok())
        .with_context(|| format!("Truncated frame header: {} bytes", buf.len()))?;
    let frame_len = FRAME_HEADER_LEN + body_len(header)?;

    let body = buf
        .get(FRAME_HEADER_LEN..frame_len)
        .with_context(|| format!("Truncated frame: have {} of {} bytes", buf.len(), frame_len))?;
    let msg = rmp_serde::from_slice(body).context("Failed to decode message")?;

    Ok((msg, frame_len))
}

/// Read one frame from `stream`
pub async fn read_message<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Message> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    stream
        .read_exact(&mut header)
        .await
        .context("Failed to read frame header")?;

    let mut body = vec![0u8; body_len(header)?];
    stream
        .read_exact(&mut body)
        .await
        .context("Failed to read frame body")?;

    rmp_serde::from_slice(&body).context("Failed to decode message")
}

/// Write one frame to `stream` and flush it
pub async fn write_message<W: AsyncWrite + Unpin>(stream: &mut W, msg: &Message) -> Result<()> {
    let frame = serialize_message(msg)?;
    stream.write_all(&frame).await.context("Failed to write frame")?;
    stream.flush().await.context("Failed to flush stream")?;
    Ok(())
}

/// Did `err` come from the peer closing the connection?
pub fn is_disconnect(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<std::io::Error>()
            .map(|io| {
                matches!(
                    io.kind(),
                    std::io::ErrorKind::UnexpectedEof
                        | std::io::ErrorKind::ConnectionReset
                        | std::io::ErrorKind::BrokenPipe
                )
            })
            .unwrap_or(false)
    })
}
