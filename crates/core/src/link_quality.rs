//! Per-frame link quality tracking and bit-error-rate measurement
//!
//! Two distinct BER-related figures exist and must not be conflated:
//! the direct bit-compare rate from [`measured_ber`] (exact, needs the
//! original buffer) and the noise-floor SNR estimate from [`estimated_snr`]
//! (an approximation derived from RSSI alone).

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Assumed receiver noise floor in dBm, from field calibration.
pub const DEFAULT_NOISE_FLOOR_DBM: f64 = -122.9;

/// Averages over the current sample window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinkQuality {
    /// Average RSSI in dBm (0.0 when no samples have been recorded)
    pub avg_rssi: f64,
    /// Average SNR in dB (0.0 when no samples have been recorded)
    pub avg_snr: f64,
    /// Number of samples the averages cover
    pub samples: usize,
}

/// Bounded rolling window of per-frame `(rssi, snr)` samples.
#[derive(Debug)]
pub struct LinkQualityMonitor {
    window: VecDeque<(f64, f64)>,
    capacity: usize,
}

impl LinkQualityMonitor {
    /// Create a monitor keeping the most recent `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity.max(1)),
            capacity: capacity.max(1),
        }
    }

    /// Record one frame's samples, evicting the oldest at capacity.
    pub fn record(&mut self, rssi: f64, snr: f64) {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back((rssi, snr));
    }

    /// Current averages over the window.
    pub fn snapshot(&self) -> LinkQuality {
        let samples = self.window.len();
        if samples == 0 {
            return LinkQuality {
                avg_rssi: 0.0,
                avg_snr: 0.0,
                samples: 0,
            };
        }
        let (rssi_sum, snr_sum) = self
            .window
            .iter()
            .fold((0.0, 0.0), |(r, s), (rssi, snr)| (r + rssi, s + snr));
        LinkQuality {
            avg_rssi: rssi_sum / samples as f64,
            avg_snr: snr_sum / samples as f64,
            samples,
        }
    }
}

impl Default for LinkQualityMonitor {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Direct bit-compare error rate between a reconstructed buffer and its
/// reference.
///
/// Counts mismatched bits over the common prefix; bytes present in only one
/// buffer count as fully mismatched. The denominator is the bit length of the
/// longer buffer. Returns `None` when both buffers are empty.
pub fn measured_ber(received: &[u8], reference: &[u8]) -> Option<f64> {
    let longer = received.len().max(reference.len());
    if longer == 0 {
        return None;
    }
    let common = received.len().min(reference.len());
    let mut errors: u64 = received[..common]
        .iter()
        .zip(&reference[..common])
        .map(|(a, b)| (a ^ b).count_ones() as u64)
        .sum();
    errors += ((longer - common) as u64) * 8;
    Some(errors as f64 / (longer as f64 * 8.0))
}

/// SNR estimated from average RSSI against an assumed noise floor, in dB.
///
/// Coarser than the radio-reported SNR: it ignores processing gain and treats
/// the floor as constant. Useful when the driver does not report SNR at all.
pub fn estimated_snr(avg_rssi: f64, noise_floor_dbm: f64) -> f64 {
    avg_rssi - noise_floor_dbm
}
