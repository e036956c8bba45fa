//! Low-level Source RCON protocol implementation.
//!
//! This module handles the binary framing for communicating with game servers
//! over RCON: little-endian length-prefixed packets carrying a request id,
//! a packet type, and a null-terminated payload string.

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Authentication request, carries the password as its body.
pub const SERVERDATA_AUTH: i32 = 3;
/// Authentication response. An id of -1 signals a rejected password.
pub const SERVERDATA_AUTH_RESPONSE: i32 = 2;
/// Command execution request.
pub const SERVERDATA_EXECCOMMAND: i32 = 2;
/// Command response payload.
pub const SERVERDATA_RESPONSE_VALUE: i32 = 0;

/// Servers reject bodies past 4096 bytes; the frame adds id, type and two
/// null terminators on top.
const MAX_FRAME_LEN: i32 = 4096 + 10;
const MIN_FRAME_LEN: i32 = 10;

/// One RCON packet, either direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Sequence id chosen by the client; responses echo it back.
    pub id: i32,
    /// One of the `SERVERDATA_*` constants.
    pub ptype: i32,
    /// Payload string (password, command text, or response text).
    pub body: String,
}

impl Packet {
    pub fn auth(id: i32, password: &str) -> Self {
        Self {
            id,
            ptype: SERVERDATA_AUTH,
            body: password.to_string(),
        }
    }

    pub fn command(id: i32, command: &str) -> Self {
        Self {
            id,
            ptype: SERVERDATA_EXECCOMMAND,
            body: command.to_string(),
        }
    }
}

/// Encode a packet into its wire form, length prefix included.
pub fn encode_packet(packet: &Packet) -> Vec<u8> {
    let body = packet.body.as_bytes();
    // id + type + body + two null terminators
    let length = (4 + 4 + body.len() + 2) as i32;

    let mut buf = Vec::with_capacity(4 + length as usize);
    buf.extend_from_slice(&length.to_le_bytes());
    buf.extend_from_slice(&packet.id.to_le_bytes());
    buf.extend_from_slice(&packet.ptype.to_le_bytes());
    buf.extend_from_slice(body);
    buf.extend_from_slice(&[0, 0]);
    buf
}

/// Decode a packet from its frame contents (everything after the length prefix).
pub fn decode_frame(frame: &[u8]) -> io::Result<Packet> {
    if frame.len() < 10 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "RCON frame too short",
        ));
    }

    let id = i32::from_le_bytes(frame[0..4].try_into().unwrap());
    let ptype = i32::from_le_bytes(frame[4..8].try_into().unwrap());
    // Strip at most two contiguous trailing null bytes; tolerate servers
    // that omit the empty-string terminator.
    let mut body_end = frame.len();
    for _ in 0..2 {
        if body_end > 8 && frame[body_end - 1] == 0 {
            body_end -= 1;
        }
    }
    let body = String::from_utf8_lossy(&frame[8..body_end]).to_string();

    Ok(Packet { id, ptype, body })
}

/// Write one packet to the stream.
pub async fn write_packet<W>(stream: &mut W, packet: &Packet) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    stream.write_all(&encode_packet(packet)).await?;
    stream.flush().await
}

/// Read one complete packet from the stream.
///
/// Validates the length prefix against protocol bounds before allocating.
pub async fn read_packet<R>(stream: &mut R) -> io::Result<Packet>
where
    R: AsyncRead + Unpin,
{
    let mut length_buf = [0u8; 4];
    stream.read_exact(&mut length_buf).await?;
    let length = i32::from_le_bytes(length_buf);

    if !(MIN_FRAME_LEN..=MAX_FRAME_LEN).contains(&length) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("RCON frame length {} out of bounds", length),
        ));
    }

    let mut frame = vec![0u8; length as usize];
    stream.read_exact(&mut frame).await?;
    decode_frame(&frame)
}
