//! Error types for loraimg framing

use thiserror::Error;

/// Frame and chunking error types.
///
/// Integrity failures are local and recoverable: the receiver NACKs or drops
/// the frame and the session continues.
#[derive(Error, Debug)]
pub enum FrameError {
    /// The CRC recomputed over header and payload disagrees with the wire.
    ///
    /// Carries the index declared in the (possibly corrupted) header so the
    /// receiver can negative-acknowledge it best-effort.
    #[error("frame checksum mismatch (declared index {index})")]
    ChecksumMismatch { index: u16 },

    #[error("malformed frame: {msg}")]
    Malformed { msg: String },

    #[error("chunk payload size {requested} outside 1-{max}")]
    ChunkSize { requested: usize, max: usize },

    #[error("buffer splits into {chunks} chunks, more than a u16 index can address")]
    TooManyChunks { chunks: usize },

    #[error("refusing to split an empty buffer")]
    EmptyBuffer,
}

/// Result type for loraimg framing operations
pub type Result<T> = std::result::Result<T, FrameError>;
