//! # Chunk Protocol
//!
//! Wire frames exchanged with the recording server. Every integer is a
//! little-endian `u32`.
//!
//! ```text
//! client -> server   login   [command][session id][session key][track index]
//! server -> client   ack     (first message, ignored)
//! server -> client   chunk   [sequence][payload ...]   (empty payload = end)
//! client -> server   ack     [0][sequence]
//! ```

use crate::error::{ImportError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Command code requesting a primary (speaker) track.
pub const COMMAND_PRIMARY: u32 = 0x11;

/// Command code requesting an auxiliary (sound effect) track.
pub const COMMAND_AUXILIARY: u32 = 0x12;

pub const LOGIN_FRAME_LEN: usize = 16;
pub const ACK_FRAME_LEN: usize = 8;

/// Leading word of every client acknowledgement.
pub const ACK_RESERVED: u32 = 0;

const SEQUENCE_LEN: usize = 4;

/// Login frame sent once, right after the connection opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginFrame {
    pub command: u32,
    pub session_id: u32,
    pub session_key: u32,
    pub track_index: u32,
}

impl LoginFrame {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(LOGIN_FRAME_LEN);
        buf.put_u32_le(self.command);
        buf.put_u32_le(self.session_id);
        buf.put_u32_le(self.session_key);
        buf.put_u32_le(self.track_index);
        buf.freeze()
    }

    pub fn decode(mut frame: &[u8]) -> Result<Self> {
        if frame.len() != LOGIN_FRAME_LEN {
            return Err(ImportError::Protocol(format!(
                "login frame must be {} bytes, got {}",
                LOGIN_FRAME_LEN,
                frame.len()
            )));
        }

        Ok(Self {
            command: frame.get_u32_le(),
            session_id: frame.get_u32_le(),
            session_key: frame.get_u32_le(),
            track_index: frame.get_u32_le(),
        })
    }
}

/// Acknowledgement for the chunk carrying `sequence`.
pub fn encode_ack(sequence: u32) -> Bytes {
    let mut buf = BytesMut::with_capacity(ACK_FRAME_LEN);
    buf.put_u32_le(ACK_RESERVED);
    buf.put_u32_le(sequence);
    buf.freeze()
}

/// Returns the sequence number acknowledged by `frame`.
pub fn decode_ack(mut frame: &[u8]) -> Result<u32> {
    if frame.len() != ACK_FRAME_LEN {
        return Err(ImportError::Protocol(format!(
            "ack frame must be {} bytes, got {}",
            ACK_FRAME_LEN,
            frame.len()
        )));
    }

    let reserved = frame.get_u32_le();
    if reserved != ACK_RESERVED {
        return Err(ImportError::Protocol(format!(
            "ack reserved word must be {}, got {}",
            ACK_RESERVED, reserved
        )));
    }
    Ok(frame.get_u32_le())
}

/// A sequenced data message from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    Data { sequence: u32, payload: Bytes },
    End { sequence: u32 },
}

impl Chunk {
    /// Split an inbound message into sequence number and payload.
    ///
    /// A message of exactly four bytes carries no payload and ends the
    /// stream. Anything shorter cannot hold a sequence number.
    pub fn parse(mut message: Bytes) -> Result<Self> {
        if message.len() < SEQUENCE_LEN {
            return Err(ImportError::Protocol(format!(
                "chunk of {} bytes has no sequence number",
                message.len()
            )));
        }

        let sequence = message.get_u32_le();
        if message.is_empty() {
            Ok(Chunk::End { sequence })
        } else {
            Ok(Chunk::Data {
                sequence,
                payload: message,
            })
        }
    }

    pub fn sequence(&self) -> u32 {
        match self {
            Chunk::Data { sequence, .. } | Chunk::End { sequence } => *sequence,
        }
    }

    pub fn encode(&self) -> Bytes {
        let payload: &[u8] = match self {
            Chunk::Data { payload, .. } => payload.as_ref(),
            Chunk::End { .. } => &[],
        };
        let mut buf = BytesMut::with_capacity(SEQUENCE_LEN + payload.len());
        buf.put_u32_le(self.sequence());
        buf.put_slice(payload);
        buf.freeze()
    }
}
