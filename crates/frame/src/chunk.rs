//! Chunking and reassembly of an image byte stream
//!
//! Splitting is deterministic and restartable: the same buffer and payload
//! size always yield the same chunk sequence, so a retransmitted chunk is
//! byte-identical to the original. Completion is driven by `total_count`,
//! never by any in-band marker.

use crate::{FrameError, Result};
use loraimg_core::config::MAX_CHUNK_PAYLOAD;
use std::collections::BTreeMap;
use tracing::warn;

/// A bounded, indexed slice of the source buffer; the unit of transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 0-based position in the transfer
    pub index: u16,
    /// Number of chunks in the whole transfer, identical on every chunk
    pub total_count: u16,
    pub payload: Vec<u8>,
    /// Set on the last chunk only
    pub is_final: bool,
}

/// Split a buffer into `ceil(len / max_payload)` ordered chunks.
pub fn split(buffer: &[u8], max_payload: usize) -> Result<Vec<Chunk>> {
    if max_payload == 0 || max_payload > MAX_CHUNK_PAYLOAD {
        return Err(FrameError::ChunkSize {
            requested: max_payload,
            max: MAX_CHUNK_PAYLOAD,
        });
    }
    if buffer.is_empty() {
        return Err(FrameError::EmptyBuffer);
    }
    let count = buffer.len().div_ceil(max_payload);
    if count > u16::MAX as usize {
        return Err(FrameError::TooManyChunks { chunks: count });
    }

    let total_count = count as u16;
    let chunks = buffer
        .chunks(max_payload)
        .enumerate()
        .map(|(i, piece)| Chunk {
            index: i as u16,
            total_count,
            payload: piece.to_vec(),
            is_final: i + 1 == count,
        })
        .collect();
    Ok(chunks)
}

/// Outcome of feeding one chunk payload to the reassembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReassemblyStatus {
    /// Accepted; more chunks are still missing.
    Incomplete,
    /// The index was already accepted with an identical payload.
    Duplicate,
    /// The index was already accepted with a different payload, or the
    /// declared `total_count` contradicts the session's. The new value is
    /// rejected and the old one kept.
    Conflict,
    /// Every index in `[0, total_count)` is present; payloads concatenated
    /// in index order.
    Complete(Vec<u8>),
}

/// Collects chunk payloads by index and reconstructs the original buffer.
///
/// `total_count` is pinned by the first accepted chunk; a later chunk
/// declaring a different total is a protocol violation and is rejected.
#[derive(Debug, Default)]
pub struct Reassembler {
    total_count: Option<u16>,
    pieces: BTreeMap<u16, Vec<u8>>,
    complete: bool,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one chunk payload.
    pub fn accept(&mut self, index: u16, payload: &[u8], total_count: u16) -> ReassemblyStatus {
        if total_count == 0 {
            warn!(index, "chunk declares a zero total count, rejecting");
            return ReassemblyStatus::Conflict;
        }
        match self.total_count {
            Some(pinned) if pinned != total_count => {
                warn!(
                    index,
                    declared = total_count,
                    pinned,
                    "chunk contradicts the session total count, rejecting"
                );
                return ReassemblyStatus::Conflict;
            }
            _ => {}
        }
        if index >= total_count {
            warn!(index, total_count, "chunk index out of range, rejecting");
            return ReassemblyStatus::Conflict;
        }

        if let Some(existing) = self.pieces.get(&index) {
            if existing == payload {
                return ReassemblyStatus::Duplicate;
            }
            warn!(index, "chunk re-sent with different payload, keeping first");
            return ReassemblyStatus::Conflict;
        }

        self.total_count = Some(total_count);
        self.pieces.insert(index, payload.to_vec());

        if self.pieces.len() == total_count as usize {
            self.complete = true;
            let buffer = self.pieces.values().flatten().copied().collect();
            ReassemblyStatus::Complete(buffer)
        } else {
            ReassemblyStatus::Incomplete
        }
    }

    /// Number of distinct chunks accepted so far.
    pub fn received(&self) -> usize {
        self.pieces.len()
    }

    /// Session total, once pinned by the first accepted chunk.
    pub fn total_count(&self) -> Option<u16> {
        self.total_count
    }

    /// Indices not yet received, in ascending order.
    ///
    /// Empty until the first chunk pins the total.
    pub fn missing(&self) -> Vec<u16> {
        match self.total_count {
            Some(total) => (0..total).filter(|i| !self.pieces.contains_key(i)).collect(),
            None => Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }
}
