//! loraimg Frame - wire framing, chunking, and reassembly
//!
//! This crate turns an opaque image byte stream into CRC-protected wire
//! frames bounded by the 255-byte LoRa packet ceiling, and reconstructs the
//! stream on the far side.

pub mod chunk;
pub mod error;
pub mod frame;

pub use error::{FrameError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::{
        chunk::{split, Chunk, Reassembler, ReassemblyStatus},
        error::{FrameError, Result},
        frame::{Frame, FrameKind, CRC_SIZE, FLAG_FINAL, HEADER_SIZE},
    };
}
