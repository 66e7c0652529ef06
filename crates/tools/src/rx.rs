//! Receiver configuration and implementation

use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::common::{self, UdpRadio};
use loraimg_core::config::{RadioParams, TransferParams};
use loraimg_protocol::receiver::Receiver;
use loraimg_protocol::stats::TransferReport;
use loraimg_protocol::ProtocolError;
use tracing::{info, warn};

/// Receiver configuration
#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(name = "limg-rx")]
#[command(about = "Receive an image over the chunked LoRa link")]
pub struct RxConfig {
    /// Where to write the reconstructed image
    #[arg(short, long, default_value = "received.jpg")]
    pub output: PathBuf,

    /// Load the whole configuration from a TOML/JSON file instead of flags
    #[arg(long)]
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Local bench-transport address
    #[arg(long, default_value = "127.0.0.1:7701")]
    pub bind: String,

    /// Peer bench-transport address
    #[arg(long, default_value = "127.0.0.1:7700")]
    pub peer: String,

    /// Operating frequency in MHz
    #[arg(long, default_value = "915.0")]
    pub frequency: f64,

    /// Transmission power in dBm
    #[arg(long, default_value = "17")]
    pub tx_power: i8,

    /// Spreading factor (7-12)
    #[arg(long, default_value = "7")]
    pub spreading_factor: u8,

    /// Bandwidth in Hz
    #[arg(long, default_value = "125000")]
    pub bandwidth: u32,

    /// Coding rate denominator (5-8)
    #[arg(long, default_value = "5")]
    pub coding_rate: u8,

    /// Preamble length in symbols
    #[arg(long, default_value = "8")]
    pub preamble_length: u16,

    /// Disable the hardware CRC
    #[arg(long)]
    pub disable_crc: bool,

    /// Enable low-data-rate-optimize (required for high SF at low bandwidth)
    #[arg(long)]
    pub low_data_rate_optimize: bool,

    /// Disable automatic gain control
    #[arg(long)]
    pub disable_agc: bool,

    /// Payload bytes per chunk (must match the transmitter)
    #[arg(long, default_value = "240")]
    pub chunk_size: usize,

    /// Retransmissions per chunk beyond the first attempt
    #[arg(long, default_value = "3")]
    pub max_retries: u32,

    /// Acknowledgment timeout in milliseconds
    #[arg(long, default_value = "2000")]
    pub ack_timeout_ms: u64,

    /// Silence window before reporting a stalled link, in milliseconds
    #[arg(long, default_value = "30000")]
    pub inactivity_window_ms: u64,

    /// How many stalled-link episodes to tolerate before giving up
    #[arg(long, default_value = "3")]
    pub stall_retries: u32,

    /// End-of-transmission marker as hex digits (must match the transmitter)
    #[arg(long, default_value = "414243")]
    pub eot_marker: String,

    /// Original image for bit-error-rate measurement (evaluation only)
    #[arg(long)]
    pub reference: Option<PathBuf>,

    /// Write the full transfer report as JSON
    #[arg(long)]
    pub stats_json: Option<PathBuf>,

    /// Append a summary row to a CSV statistics log
    #[arg(long)]
    pub stats_csv: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl RxConfig {
    /// Physical-layer parameters assembled from the flags.
    pub fn radio_params(&self) -> RadioParams {
        RadioParams {
            frequency_mhz: self.frequency,
            tx_power_dbm: self.tx_power,
            spreading_factor: self.spreading_factor,
            bandwidth_hz: self.bandwidth,
            coding_rate: self.coding_rate,
            preamble_length: self.preamble_length,
            crc_enabled: !self.disable_crc,
            low_data_rate_optimize: self.low_data_rate_optimize,
            agc_auto: !self.disable_agc,
        }
    }

    /// Transfer parameters assembled from the flags.
    pub fn transfer_params(&self) -> Result<TransferParams> {
        Ok(TransferParams {
            chunk_size: self.chunk_size,
            pacing_delay: TransferParams::default().pacing_delay,
            max_retries: self.max_retries,
            ack_timeout: Duration::from_millis(self.ack_timeout_ms),
            inactivity_window: Duration::from_millis(self.inactivity_window_ms),
            eot_marker: common::parse_hex_marker(&self.eot_marker)?,
        })
    }
}

/// Drives the receiver state machine over the bench transport, tolerating a
/// bounded number of stalled-link episodes, and writes the image plus the
/// statistics artifacts.
pub struct ImageReceiver {
    config: RxConfig,
}

impl ImageReceiver {
    /// Create a new receiver with the given configuration
    pub fn new(config: RxConfig) -> Result<Self> {
        Ok(Self { config })
    }

    /// Listen until an image arrives, then write it out.
    pub fn receive(&mut self) -> Result<TransferReport> {
        let radio = UdpRadio::bind(&self.config.bind, &self.config.peer)?;
        let mut receiver = Receiver::new(
            radio,
            &self.config.radio_params(),
            self.config.transfer_params()?,
        )?;
        if let Some(path) = &self.config.reference {
            let reference =
                std::fs::read(path).with_context(|| format!("failed to read {path:?}"))?;
            receiver = receiver.with_reference(reference);
        }

        let mut stalls_left = self.config.stall_retries;
        let image = loop {
            match receiver.run() {
                Ok(image) => break image,
                Err(ProtocolError::LinkStalled { received, .. }) if stalls_left > 0 => {
                    stalls_left -= 1;
                    warn!(received, stalls_left, "link stalled, continuing to listen");
                }
                Err(err) => {
                    let partial = receiver.report();
                    warn!(
                        received = partial.chunks_delivered,
                        missing = ?receiver.missing_indices(),
                        "reception failed"
                    );
                    self.write_stats(&partial)?;
                    return Err(err).context("reception failed");
                }
            }
        };

        std::fs::write(&self.config.output, &image)
            .with_context(|| format!("failed to write {:?}", self.config.output))?;
        info!(bytes = image.len(), path = ?self.config.output, "image written");

        let report = receiver.report();
        self.write_stats(&report)?;
        Ok(report)
    }

    fn write_stats(&self, report: &TransferReport) -> Result<()> {
        if let Some(path) = &self.config.stats_json {
            common::save_report_json(report, path)?;
        }
        if let Some(path) = &self.config.stats_csv {
            common::append_report_csv(report, path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_mirror_the_transmitter() {
        let config = RxConfig::parse_from(["limg-rx"]);
        assert_eq!(config.output, PathBuf::from("received.jpg"));
        assert_eq!(config.chunk_size, 240);
        assert_eq!(config.inactivity_window_ms, 30_000);
        assert_eq!(config.stall_retries, 3);

        config.radio_params().validate().unwrap();
        let params = config.transfer_params().unwrap();
        params.validate().unwrap();
        assert_eq!(params.eot_marker, vec![0x41, 0x42, 0x43]);
    }

    #[test]
    fn test_config_serializes_for_file_overlay() {
        let config = RxConfig::parse_from(["limg-rx", "--spreading-factor", "9"]);
        let toml = toml::to_string_pretty(&config).unwrap();
        let loaded: RxConfig = toml::from_str(&toml).unwrap();
        assert_eq!(loaded.spreading_factor, 9);
        assert_eq!(loaded.output, config.output);
    }
}
