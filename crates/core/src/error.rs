//! Error types for loraimg core

use thiserror::Error;

/// Configuration validation error types.
///
/// Every variant names the offending field so a bad setting is rejected
/// before any radio activity, with a diagnostic a human can act on.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid frequency: {mhz} MHz")]
    InvalidFrequency { mhz: f64 },

    #[error("invalid tx power: {dbm} dBm (allowed 2-20)")]
    InvalidTxPower { dbm: i8 },

    #[error("invalid spreading factor: {sf} (allowed 7-12)")]
    InvalidSpreadingFactor { sf: u8 },

    #[error("invalid bandwidth: {hz} Hz (not a LoRa bandwidth setting)")]
    InvalidBandwidth { hz: u32 },

    #[error("invalid coding rate: {cr} (allowed 5-8, meaning 4/5-4/8)")]
    InvalidCodingRate { cr: u8 },

    #[error("invalid preamble length: {symbols} symbols (allowed 6-65535)")]
    InvalidPreambleLength { symbols: u16 },

    #[error("low data rate optimize must be enabled for SF{sf} at {bw} Hz")]
    LdroRequired { sf: u8, bw: u32 },

    #[error("chunk size must be at least 1 byte")]
    ZeroChunkSize,

    #[error("chunk size {requested} exceeds maximum payload of {max} bytes")]
    ChunkTooLarge { requested: usize, max: usize },

    #[error("end-of-transmission marker must not be empty")]
    EmptyEotMarker,

    #[error("end-of-transmission marker of {len} bytes exceeds {max}-byte payload limit")]
    EotMarkerTooLarge { len: usize, max: usize },
}

/// Radio driver error types, propagated unchanged through the protocol.
#[derive(Error, Debug)]
pub enum RadioError {
    #[error("packet of {len} bytes exceeds the {max}-byte radio ceiling")]
    PacketTooLarge { len: usize, max: usize },

    #[error("radio transmission failed: {msg}")]
    TransmissionFailed { msg: String },

    #[error("radio rejected configuration: {msg}")]
    ConfigRejected { msg: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Image codec boundary error types.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("unsupported codec operation: {msg}")]
    Unsupported { msg: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
