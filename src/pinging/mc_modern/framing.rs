//! Length-prefixed packet framing for the modern protocol.
//!
//! ```text
//! +----------------+----------------+-------------+
//! | length: VarInt | id: VarInt     | payload     |
//! +----------------+----------------+-------------+
//!                  |<------- length bytes ------->|
//! ```

use super::helpers::{ProtocolError, VarInt};
use crate::error::PingError;

/// Largest frame the vanilla server will send or accept (a 3-byte VarInt).
pub const MAX_FRAME_LEN: u32 = 2_097_151;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub id: u32,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(id: u32, payload: Vec<u8>) -> Self {
        Self { id, payload }
    }

    /// Serializes the packet with its length prefix.
    pub fn encode(&self) -> Vec<u8> {
        let id_bytes = VarInt::encode(self.id);
        let body_len = id_bytes.len() + self.payload.len();

        let mut out = Vec::with_capacity(VarInt::MAX_LEN + body_len);
        VarInt::encode_into(body_len as u32, &mut out);
        out.extend_from_slice(&id_bytes);
        out.extend_from_slice(&self.payload);
        out
    }
}

/// Reassembles packets from a byte stream that may arrive in pieces of any
/// size.
#[derive(Debug, Default)]
pub struct PacketBuffer {
    buffer: Vec<u8>,
}

impl PacketBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Bytes received but not yet consumed by a complete packet.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Takes the next complete packet off the front of the buffer, or returns
    /// `None` if more bytes are needed.
    pub fn next_packet(&mut self) -> Result<Option<Packet>, PingError> {
        let (frame_len, prefix_len) = match VarInt::decode(&self.buffer, 0) {
            Ok(decoded) => decoded,
            Err(ProtocolError::Incomplete) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if frame_len > MAX_FRAME_LEN {
            return Err(PingError::MalformedPacket(format!(
                "frame of {frame_len} bytes exceeds the {MAX_FRAME_LEN} byte limit"
            )));
        }

        let frame_end = prefix_len + frame_len as usize;
        if self.buffer.len() < frame_end {
            return Ok(None);
        }

        let (id, id_len) = match VarInt::decode(&self.buffer[..frame_end], prefix_len) {
            Ok(decoded) => decoded,
            Err(ProtocolError::Incomplete) => {
                return Err(PingError::MalformedPacket(
                    "frame too short to hold a packet id".to_owned(),
                ))
            }
            Err(e) => return Err(e.into()),
        };

        let payload = self.buffer[prefix_len + id_len..frame_end].to_vec();
        self.buffer.drain(..frame_end);

        Ok(Some(Packet { id, payload }))
    }
}
