//! Image codec boundary
//!
//! The transfer protocol treats image data as opaque bytes; compression is an
//! external collaborator reached through [`ImageCodec`]. Pixel data is never
//! inspected here.

use crate::error::CodecError;

/// Opaque byte-buffer image transform.
pub trait ImageCodec {
    /// Compress raw pixel data at the given quality (1-100).
    fn encode(&self, raw: &[u8], quality: u8) -> Result<Vec<u8>, CodecError>;

    /// Decompress an encoded image back to raw bytes.
    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError>;
}

/// Identity codec for inputs that are already compressed on disk.
///
/// The quality parameter is accepted and ignored, matching the pass-through
/// contract of the protocol core.
pub struct Passthrough;

impl ImageCodec for Passthrough {
    fn encode(&self, raw: &[u8], _quality: u8) -> Result<Vec<u8>, CodecError> {
        Ok(raw.to_vec())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(bytes.to_vec())
    }
}
