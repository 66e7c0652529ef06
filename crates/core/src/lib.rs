//! loraimg Core - configuration, radio boundary, and link-quality primitives
//!
//! This crate holds everything the chunked-transfer protocol shares with its
//! external collaborators: validated radio and transfer parameters, the
//! blocking radio driver trait, the opaque image codec boundary, and the
//! link quality monitor.

pub mod codec;
pub mod config;
pub mod error;
pub mod link_quality;
pub mod radio;

pub use error::{CodecError, ConfigError, RadioError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::{
        codec::{ImageCodec, Passthrough},
        config::{RadioParams, TransferParams, MAX_CHUNK_PAYLOAD, MAX_PACKET_LEN},
        error::{CodecError, ConfigError, RadioError},
        link_quality::{LinkQuality, LinkQualityMonitor},
        radio::{ChannelRadio, RadioDriver, Reception},
    };
}
