//! Transfer statistics recording
//!
//! The recorder is a passive observer: both state machines push counter
//! updates into it and it never raises. A missing bit-error-rate is
//! represented as `None`, not treated as an error.

use chrono::{DateTime, Utc};
use loraimg_core::link_quality::LinkQuality;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Summary of one transfer session, finalized once at transfer end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferReport {
    /// Wall-clock start of the session
    pub started_at: DateTime<Utc>,
    /// Chunks the whole transfer consists of
    pub total_chunks: u16,
    /// Chunks delivered (sender: acknowledged; receiver: accepted)
    pub chunks_delivered: u16,
    /// Retransmissions across all chunks, including the EOT frame
    pub total_retries: u32,
    /// Chunks abandoned after exhausting the retry budget
    pub chunks_failed: u16,
    /// Acknowledgments emitted (receiver side)
    pub acks_sent: u32,
    /// Negative acknowledgments emitted (receiver side)
    pub nacks_sent: u32,
    /// Frames discarded as undecodable or out of protocol
    pub frames_rejected: u32,
    /// Time from session start to finalization
    pub elapsed: Duration,
    /// Average RSSI over the link-quality window, dBm
    pub average_rssi: f64,
    /// Average SNR over the link-quality window, dB
    pub average_snr: f64,
    /// Direct bit-compare BER against a reference buffer, when one was given
    pub bit_error_rate: Option<f64>,
    /// Highest index successfully delivered or received, for judging how
    /// much of the image arrived after a fatal error
    pub last_index: Option<u16>,
}

/// Incrementally updated counters for one session.
#[derive(Debug)]
pub struct StatsRecorder {
    started: Instant,
    started_at: DateTime<Utc>,
    chunks_delivered: u16,
    last_index: Option<u16>,
    total_retries: u32,
    chunks_failed: u16,
    acks_sent: u32,
    nacks_sent: u32,
    frames_rejected: u32,
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            started_at: Utc::now(),
            chunks_delivered: 0,
            last_index: None,
            total_retries: 0,
            chunks_failed: 0,
            acks_sent: 0,
            nacks_sent: 0,
            frames_rejected: 0,
        }
    }

    /// One chunk confirmed delivered (acknowledged or accepted).
    pub fn record_delivered(&mut self, index: u16) {
        self.chunks_delivered += 1;
        self.last_index = Some(self.last_index.map_or(index, |last| last.max(index)));
    }

    pub fn record_retry(&mut self) {
        self.total_retries += 1;
    }

    pub fn record_failed(&mut self) {
        self.chunks_failed += 1;
    }

    pub fn record_ack_sent(&mut self) {
        self.acks_sent += 1;
    }

    pub fn record_nack_sent(&mut self) {
        self.nacks_sent += 1;
    }

    pub fn record_rejected(&mut self) {
        self.frames_rejected += 1;
    }

    /// Produce the summary record. Does not consume the recorder, so a
    /// partial-progress report is available after a failed run as well.
    pub fn finalize(
        &self,
        total_chunks: u16,
        link: LinkQuality,
        bit_error_rate: Option<f64>,
    ) -> TransferReport {
        TransferReport {
            started_at: self.started_at,
            total_chunks,
            chunks_delivered: self.chunks_delivered,
            total_retries: self.total_retries,
            chunks_failed: self.chunks_failed,
            acks_sent: self.acks_sent,
            nacks_sent: self.nacks_sent,
            frames_rejected: self.frames_rejected,
            elapsed: self.started.elapsed(),
            average_rssi: link.avg_rssi,
            average_snr: link.avg_snr,
            bit_error_rate,
            last_index: self.last_index,
        }
    }
}

impl Default for StatsRecorder {
    fn default() -> Self {
        Self::new()
    }
}
