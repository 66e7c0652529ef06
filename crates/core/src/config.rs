//! Radio and transfer configuration with eager validation
//!
//! Both ends of a link must run identical settings; everything here is
//! validated before the radio is touched so a bad combination surfaces as a
//! descriptive error instead of a silent delivery failure in the field.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Hard ceiling a single LoRa packet may carry, in bytes.
pub const MAX_PACKET_LEN: usize = 255;

/// Bytes of framing (header plus CRC-32) carried by every wire frame.
///
/// The wire layout lives in `loraimg-frame`; the constant lives here so chunk
/// sizes can be validated without depending on the frame crate.
pub const FRAME_OVERHEAD: usize = 11;

/// Largest payload a single chunk may carry once framing is accounted for.
pub const MAX_CHUNK_PAYLOAD: usize = MAX_PACKET_LEN - FRAME_OVERHEAD;

/// Bandwidth settings a LoRa modem accepts, in Hz.
pub const LORA_BANDWIDTHS: [u32; 9] = [
    7_800, 10_400, 15_600, 20_800, 31_250, 41_700, 62_500, 125_000, 250_000,
];

/// Symbol duration above which low-data-rate-optimize must be enabled.
const LDRO_SYMBOL_THRESHOLD: Duration = Duration::from_millis(16);

/// LoRa physical-layer parameters, passed through to the radio driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadioParams {
    /// Operating frequency in MHz (e.g. 915.0 for North America, 868.0 for EU)
    pub frequency_mhz: f64,
    /// Transmission power in dBm (2-20)
    pub tx_power_dbm: i8,
    /// Spreading factor (7-12); higher trades speed for range
    pub spreading_factor: u8,
    /// Bandwidth in Hz, one of [`LORA_BANDWIDTHS`]
    pub bandwidth_hz: u32,
    /// Coding rate denominator (5-8, meaning 4/5 through 4/8)
    pub coding_rate: u8,
    /// Preamble length in symbols
    pub preamble_length: u16,
    /// Hardware CRC on the air interface
    pub crc_enabled: bool,
    /// Required for long symbol times (high SF at narrow bandwidth)
    pub low_data_rate_optimize: bool,
    /// Automatic gain control
    pub agc_auto: bool,
}

impl Default for RadioParams {
    fn default() -> Self {
        Self {
            frequency_mhz: 915.0,
            tx_power_dbm: 17,
            spreading_factor: 7,
            bandwidth_hz: 125_000,
            coding_rate: 5,
            preamble_length: 8,
            crc_enabled: true,
            low_data_rate_optimize: false,
            agc_auto: true,
        }
    }
}

impl RadioParams {
    /// Duration of one LoRa symbol at the configured SF and bandwidth.
    pub fn symbol_duration(&self) -> Duration {
        let secs = (1u32 << self.spreading_factor) as f64 / self.bandwidth_hz as f64;
        Duration::from_secs_f64(secs)
    }

    /// Whether the SF/bandwidth combination mandates low-data-rate-optimize.
    pub fn requires_ldro(&self) -> bool {
        self.symbol_duration() > LDRO_SYMBOL_THRESHOLD
    }

    /// Validate every field, returning the first offending one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.frequency_mhz.is_finite() || self.frequency_mhz <= 0.0 {
            return Err(ConfigError::InvalidFrequency {
                mhz: self.frequency_mhz,
            });
        }
        if !(2..=20).contains(&self.tx_power_dbm) {
            return Err(ConfigError::InvalidTxPower {
                dbm: self.tx_power_dbm,
            });
        }
        if !(7..=12).contains(&self.spreading_factor) {
            return Err(ConfigError::InvalidSpreadingFactor {
                sf: self.spreading_factor,
            });
        }
        if !LORA_BANDWIDTHS.contains(&self.bandwidth_hz) {
            return Err(ConfigError::InvalidBandwidth {
                hz: self.bandwidth_hz,
            });
        }
        if !(5..=8).contains(&self.coding_rate) {
            return Err(ConfigError::InvalidCodingRate {
                cr: self.coding_rate,
            });
        }
        if self.preamble_length < 6 {
            return Err(ConfigError::InvalidPreambleLength {
                symbols: self.preamble_length,
            });
        }
        if self.requires_ldro() && !self.low_data_rate_optimize {
            return Err(ConfigError::LdroRequired {
                sf: self.spreading_factor,
                bw: self.bandwidth_hz,
            });
        }
        Ok(())
    }
}

/// Chunked-transfer parameters shared by sender and receiver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferParams {
    /// Payload bytes per chunk (1 to [`MAX_CHUNK_PAYLOAD`])
    pub chunk_size: usize,
    /// Delay observed after every physical transmit (duty cycle, collisions)
    pub pacing_delay: Duration,
    /// Retransmissions per chunk beyond the first attempt
    pub max_retries: u32,
    /// How long to wait for an acknowledgment before retrying
    pub ack_timeout: Duration,
    /// Receiver silence window before reporting a stalled link
    pub inactivity_window: Duration,
    /// Marker bytes carried by the end-of-transmission frame
    pub eot_marker: Vec<u8>,
}

impl Default for TransferParams {
    fn default() -> Self {
        Self {
            chunk_size: 240,
            pacing_delay: Duration::from_secs(1),
            max_retries: 3,
            ack_timeout: Duration::from_secs(2),
            inactivity_window: Duration::from_secs(30),
            eot_marker: vec![0x41, 0x42, 0x43],
        }
    }
}

impl TransferParams {
    /// Validate every field, returning the first offending one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if self.chunk_size > MAX_CHUNK_PAYLOAD {
            return Err(ConfigError::ChunkTooLarge {
                requested: self.chunk_size,
                max: MAX_CHUNK_PAYLOAD,
            });
        }
        if self.eot_marker.is_empty() {
            return Err(ConfigError::EmptyEotMarker);
        }
        if self.eot_marker.len() > MAX_CHUNK_PAYLOAD {
            return Err(ConfigError::EotMarkerTooLarge {
                len: self.eot_marker.len(),
                max: MAX_CHUNK_PAYLOAD,
            });
        }
        Ok(())
    }
}
