//! Error types for the loraimg transfer protocol

use loraimg_core::{ConfigError, RadioError};
use loraimg_frame::FrameError;
use std::time::Duration;
use thiserror::Error;

/// Protocol error taxonomy.
///
/// `Delivery` is the only fatal sender condition; `Incomplete` and
/// `LinkStalled` surface receiver-side trouble without pretending success.
/// Integrity failures never reach this level, they are resolved frame by
/// frame inside the state machines.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// A chunk exhausted its retry budget without an acknowledgment.
    #[error("chunk {index} undelivered after {attempts} attempts")]
    Delivery { index: u16, attempts: u32 },

    /// End-of-transmission arrived before reassembly completed.
    #[error("transmission incomplete, {} chunks missing", .missing.len())]
    Incomplete { missing: Vec<u16> },

    /// Prolonged silence mid-transfer. Recoverable: the session state is
    /// preserved and the caller may keep listening.
    #[error("link stalled: nothing received for {idle:?} with {received} chunks buffered")]
    LinkStalled { idle: Duration, received: usize },

    /// An external stop signal ended the session.
    #[error("transfer cancelled")]
    Cancelled,

    /// The input buffer was empty; there is nothing to send.
    #[error("nothing to send: empty input buffer")]
    EmptyTransfer,

    #[error("radio error: {0}")]
    Radio(#[from] RadioError),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for loraimg protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;
