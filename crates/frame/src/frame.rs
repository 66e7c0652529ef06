//! Wire frame structure and CRC-checked codec
//!
//! Layout (big-endian):
//! `[kind u8][index u16][total_count u16][flags u8][payload_len u8][payload…][crc32 u32]`
//!
//! The CRC-32 covers header and payload and is recomputed independently on
//! both ends. The codec is a pure transform: it never drops a frame on kind
//! grounds, disposition belongs to the state machines.

use crate::chunk::Chunk;
use crate::{FrameError, Result};
use loraimg_core::config::{FRAME_OVERHEAD, MAX_CHUNK_PAYLOAD};
use serde::{Deserialize, Serialize};

/// Size of the frame header in bytes
pub const HEADER_SIZE: usize = 7;

/// Size of the trailing CRC-32 in bytes
pub const CRC_SIZE: usize = 4;

/// Flag bit marking the final chunk of a transfer
pub const FLAG_FINAL: u8 = 0x01;

// The shared overhead constant in loraimg-core must match this layout.
const _: () = assert!(HEADER_SIZE + CRC_SIZE == FRAME_OVERHEAD);

/// Frame type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum FrameKind {
    Data = 0x01,
    Ack = 0x04,
    Nack = 0x05,
    Eot = 0x06,
}

impl FrameKind {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(FrameKind::Data),
            0x04 => Some(FrameKind::Ack),
            0x05 => Some(FrameKind::Nack),
            0x06 => Some(FrameKind::Eot),
            _ => None,
        }
    }
}

/// Wire-level envelope for one chunk or control message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub kind: FrameKind,
    pub index: u16,
    pub total_count: u16,
    pub is_final: bool,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Wrap a chunk into a DATA frame.
    pub fn data(chunk: &Chunk) -> Self {
        Self {
            kind: FrameKind::Data,
            index: chunk.index,
            total_count: chunk.total_count,
            is_final: chunk.is_final,
            payload: chunk.payload.clone(),
        }
    }

    /// Acknowledgment for the given chunk index.
    pub fn ack(index: u16) -> Self {
        Self {
            kind: FrameKind::Ack,
            index,
            total_count: 0,
            is_final: false,
            payload: Vec::new(),
        }
    }

    /// Negative acknowledgment for the given chunk index.
    pub fn nack(index: u16) -> Self {
        Self {
            kind: FrameKind::Nack,
            index,
            total_count: 0,
            is_final: false,
            payload: Vec::new(),
        }
    }

    /// End-of-transmission frame carrying the configured marker bytes.
    ///
    /// The index is one past the last chunk so its acknowledgment can never
    /// be mistaken for a stale chunk ACK.
    pub fn eot(marker: &[u8], total_count: u16) -> Self {
        Self {
            kind: FrameKind::Eot,
            index: total_count,
            total_count,
            is_final: true,
            payload: marker.to_vec(),
        }
    }

    /// Serialize to wire bytes with the trailing CRC-32.
    pub fn to_bytes(&self) -> Vec<u8> {
        debug_assert!(self.payload.len() <= MAX_CHUNK_PAYLOAD);
        let mut bytes = Vec::with_capacity(HEADER_SIZE + self.payload.len() + CRC_SIZE);
        bytes.push(self.kind as u8);
        bytes.extend_from_slice(&self.index.to_be_bytes());
        bytes.extend_from_slice(&self.total_count.to_be_bytes());
        bytes.push(if self.is_final { FLAG_FINAL } else { 0 });
        bytes.push(self.payload.len() as u8);
        bytes.extend_from_slice(&self.payload);
        let crc = crc32fast::hash(&bytes);
        bytes.extend_from_slice(&crc.to_be_bytes());
        bytes
    }

    /// Deserialize from wire bytes, recomputing and checking the CRC-32.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE + CRC_SIZE {
            return Err(FrameError::Malformed {
                msg: format!("{} bytes is shorter than header plus CRC", bytes.len()),
            });
        }

        let declared_len = bytes[6] as usize;
        let expected = HEADER_SIZE + declared_len + CRC_SIZE;
        if bytes.len() != expected {
            return Err(FrameError::Malformed {
                msg: format!(
                    "length {} inconsistent with declared payload of {} bytes",
                    bytes.len(),
                    declared_len
                ),
            });
        }

        let index = u16::from_be_bytes([bytes[1], bytes[2]]);
        let crc_offset = bytes.len() - CRC_SIZE;
        let wire_crc = u32::from_be_bytes([
            bytes[crc_offset],
            bytes[crc_offset + 1],
            bytes[crc_offset + 2],
            bytes[crc_offset + 3],
        ]);
        if crc32fast::hash(&bytes[..crc_offset]) != wire_crc {
            return Err(FrameError::ChecksumMismatch { index });
        }

        let kind = FrameKind::from_byte(bytes[0]).ok_or_else(|| FrameError::Malformed {
            msg: format!("unknown frame kind 0x{:02x}", bytes[0]),
        })?;
        let total_count = u16::from_be_bytes([bytes[3], bytes[4]]);
        let is_final = bytes[5] & FLAG_FINAL != 0;
        let payload = bytes[HEADER_SIZE..crc_offset].to_vec();

        Ok(Self {
            kind,
            index,
            total_count,
            is_final,
            payload,
        })
    }
}
