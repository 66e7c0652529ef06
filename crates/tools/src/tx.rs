//! Transmitter configuration and implementation

use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::common::{self, UdpRadio};
use loraimg_core::codec::{ImageCodec, Passthrough};
use loraimg_core::config::{RadioParams, TransferParams};
use loraimg_protocol::sender::Sender;
use loraimg_protocol::stats::TransferReport;
use tracing::warn;

/// Transmitter configuration
#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(name = "limg-tx")]
#[command(about = "Transmit an image over the chunked LoRa link")]
pub struct TxConfig {
    /// Image file to transmit (opaque bytes, typically JPEG)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Load the whole configuration from a TOML/JSON file instead of flags
    #[arg(long)]
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Local bench-transport address
    #[arg(long, default_value = "127.0.0.1:7700")]
    pub bind: String,

    /// Peer bench-transport address
    #[arg(long, default_value = "127.0.0.1:7701")]
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

    /// Payload bytes per chunk
    #[arg(long, default_value = "240")]
    pub chunk_size: usize,

    /// Delay between packet transmissions in milliseconds
    #[arg(long, default_value = "1000")]
    pub pacing_delay_ms: u64,

    /// Retransmissions per chunk beyond the first attempt
    #[arg(long, default_value = "3")]
    pub max_retries: u32,

    /// Acknowledgment timeout in milliseconds
    #[arg(long, default_value = "2000")]
    pub ack_timeout_ms: u64,

    /// End-of-transmission marker as hex digits
    #[arg(long, default_value = "414243")]
    pub eot_marker: String,

    /// JPEG quality pass-through for the external codec (1-100)
    #[arg(long, default_value = "85")]
    pub quality: u8,

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

impl TxConfig {
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
            pacing_delay: Duration::from_millis(self.pacing_delay_ms),
            max_retries: self.max_retries,
            ack_timeout: Duration::from_millis(self.ack_timeout_ms),
            inactivity_window: TransferParams::default().inactivity_window,
            eot_marker: common::parse_hex_marker(&self.eot_marker)?,
        })
    }
}

/// Reads the image, drives the sender state machine over the bench
/// transport, and writes the statistics artifacts.
pub struct Transmitter {
    config: TxConfig,
    codec: Box<dyn ImageCodec>,
}

impl Transmitter {
    /// Create a new transmitter with the given configuration
    pub fn new(config: TxConfig) -> Result<Self> {
        if config.input.is_none() {
            anyhow::bail!("an input image must be specified");
        }
        Ok(Self {
            config,
            codec: Box::new(Passthrough),
        })
    }

    /// Transmit the configured image.
    pub fn transmit(&mut self) -> Result<TransferReport> {
        let input = self
            .config
            .input
            .as_ref()
            .context("an input image must be specified")?;
        let raw = std::fs::read(input).with_context(|| format!("failed to read {input:?}"))?;
        let image = self
            .codec
            .encode(&raw, self.config.quality)
            .context("image codec failed")?;

        let radio = UdpRadio::bind(&self.config.bind, &self.config.peer)?;
        let mut sender = Sender::new(
            radio,
            &self.config.radio_params(),
            self.config.transfer_params()?,
            &image,
        )?;

        let report = match sender.run() {
            Ok(report) => report,
            Err(err) => {
                // Surface how far the transfer got before the failure.
                let partial = sender.report();
                warn!(
                    delivered = partial.chunks_delivered,
                    total = partial.total_chunks,
                    last_index = ?partial.last_index,
                    "transfer failed"
                );
                self.write_stats(&partial)?;
                return Err(err).context("transfer failed");
            }
        };

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
