//! Common utilities and transports for the loraimg tools

use anyhow::{Context, Result};
use loraimg_core::config::{RadioParams, MAX_PACKET_LEN};
use loraimg_core::radio::{RadioDriver, Reception};
use loraimg_core::RadioError;
use loraimg_protocol::stats::TransferReport;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::net::UdpSocket;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

/// UDP bench transport implementing the radio boundary.
///
/// Stands in for an SX127x-class driver so the tools run end to end on a
/// desk: the 255-byte packet ceiling is enforced, but the physical-layer
/// parameters are only recorded and no RSSI/SNR measurements exist (both
/// are reported as 0.0).
pub struct UdpRadio {
    socket: UdpSocket,
    peer: String,
}

impl UdpRadio {
    /// Bind the local end and remember the peer address for transmissions.
    pub fn bind(local: &str, peer: &str) -> Result<Self, RadioError> {
        let socket = UdpSocket::bind(local)?;
        Ok(Self {
            socket,
            peer: peer.to_string(),
        })
    }

    /// Address the bench socket actually bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, RadioError> {
        Ok(self.socket.local_addr()?)
    }
}

impl RadioDriver for UdpRadio {
    fn configure(&mut self, params: &RadioParams) -> Result<(), RadioError> {
        info!(
            frequency_mhz = params.frequency_mhz,
            sf = params.spreading_factor,
            bw = params.bandwidth_hz,
            cr = params.coding_rate,
            "bench transport configured (parameters recorded, not applied)"
        );
        Ok(())
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), RadioError> {
        if bytes.len() > MAX_PACKET_LEN {
            return Err(RadioError::PacketTooLarge {
                len: bytes.len(),
                max: MAX_PACKET_LEN,
            });
        }
        self.socket.send_to(bytes, self.peer.as_str())?;
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Reception>, RadioError> {
        self.socket.set_read_timeout(Some(timeout))?;
        let mut buf = [0u8; 512];
        match self.socket.recv_from(&mut buf) {
            Ok((len, _from)) => Ok(Some(Reception {
                bytes: buf[..len].to_vec(),
                rssi: 0.0,
                snr: 0.0,
            })),
            Err(err) if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut => {
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Parse an end-of-transmission marker given as hex digits (e.g. "414243").
pub fn parse_hex_marker(hex: &str) -> Result<Vec<u8>> {
    if hex.is_empty() || hex.len() % 2 != 0 {
        anyhow::bail!("marker must be a non-empty, even-length hex string: {hex:?}");
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .with_context(|| format!("invalid hex byte in marker: {:?}", &hex[i..i + 2]))
        })
        .collect()
}

/// Load configuration from file (JSON or TOML by content)
pub fn load_config<T: for<'a> Deserialize<'a>>(path: &PathBuf) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {path:?}"))?;

    if let Ok(config) = serde_json::from_str(&content) {
        return Ok(config);
    }
    match toml::from_str(&content) {
        Ok(config) => Ok(config),
        Err(err) => anyhow::bail!("failed to parse config file {path:?}: {err}"),
    }
}

/// Save configuration to file (JSON when the extension says so, else TOML)
pub fn save_config<T: Serialize>(config: &T, path: &PathBuf) -> Result<()> {
    let content = if path.extension().and_then(|s| s.to_str()) == Some("json") {
        serde_json::to_string_pretty(config)?
    } else {
        toml::to_string_pretty(config)?
    };
    std::fs::write(path, content).with_context(|| format!("failed to write config file: {path:?}"))
}

/// Write the full transfer report as pretty JSON.
pub fn save_report_json(report: &TransferReport, path: &PathBuf) -> Result<()> {
    let content = serde_json::to_string_pretty(report)?;
    std::fs::write(path, content).with_context(|| format!("failed to write report: {path:?}"))
}

/// Append one summary row to a CSV log, writing the header on first use.
pub fn append_report_csv(report: &TransferReport, path: &PathBuf) -> Result<()> {
    let mut content = if path.exists() {
        String::new()
    } else {
        "started_at,total_chunks,delivered,retries,failed,elapsed_secs,avg_rssi,avg_snr,ber\n"
            .to_string()
    };
    content.push_str(&format!(
        "{},{},{},{},{},{:.3},{:.1},{:.1},{}\n",
        report.started_at.to_rfc3339(),
        report.total_chunks,
        report.chunks_delivered,
        report.total_retries,
        report.chunks_failed,
        report.elapsed.as_secs_f64(),
        report.average_rssi,
        report.average_snr,
        report
            .bit_error_rate
            .map_or_else(|| "n/a".to_string(), |ber| format!("{ber:.6}")),
    ));

    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open stats log: {path:?}"))?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

/// Print the human-readable summary both tools end with.
pub fn print_summary(role: &str, report: &TransferReport) {
    println!("{role} summary:");
    println!(
        "  chunks: {}/{} delivered, {} retries, {} failed",
        report.chunks_delivered, report.total_chunks, report.total_retries, report.chunks_failed
    );
    println!("  elapsed: {:.2}s", report.elapsed.as_secs_f64());
    println!(
        "  link: avg RSSI {:.1} dBm, avg SNR {:.1} dB",
        report.average_rssi, report.average_snr
    );
    match report.bit_error_rate {
        Some(ber) => println!("  bit error rate: {ber:.6}"),
        None => println!("  bit error rate: not measured"),
    }
    if let Some(last) = report.last_index {
        println!("  last index: {last}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;

    fn sample_report() -> TransferReport {
        TransferReport {
            started_at: Utc::now(),
            total_chunks: 4,
            chunks_delivered: 4,
            total_retries: 1,
            chunks_failed: 0,
            acks_sent: 0,
            nacks_sent: 0,
            frames_rejected: 0,
            elapsed: Duration::from_millis(1234),
            average_rssi: -80.0,
            average_snr: 5.5,
            bit_error_rate: Some(0.0),
            last_index: Some(3),
        }
    }

    #[test]
    fn test_parse_hex_marker() {
        assert_eq!(parse_hex_marker("414243").unwrap(), vec![0x41, 0x42, 0x43]);
        assert!(parse_hex_marker("").is_err());
        assert!(parse_hex_marker("abc").is_err());
        assert!(parse_hex_marker("zz").is_err());
    }

    #[test]
    fn test_csv_header_written_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stats.csv");
        let report = sample_report();
        append_report_csv(&report, &path).unwrap();
        append_report_csv(&report, &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("started_at").count(), 1);
        assert_eq!(content.lines().count(), 3);
    }

    #[test]
    fn test_report_json_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.json");
        save_report_json(&sample_report(), &path).unwrap();

        let loaded: TransferReport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.total_chunks, 4);
        assert_eq!(loaded.bit_error_rate, Some(0.0));
    }

    #[test]
    fn test_config_save_load_roundtrip() {
        let dir = tempdir().unwrap();

        use clap::Parser;
        let config = crate::RxConfig::parse_from([
            "limg-rx",
            "--chunk-size",
            "128",
            "--max-retries",
            "7",
        ]);

        let toml_path = dir.path().join("rx.toml");
        save_config(&config, &toml_path).unwrap();
        let from_toml: crate::RxConfig = load_config(&toml_path).unwrap();
        assert_eq!(from_toml.chunk_size, 128);
        assert_eq!(from_toml.max_retries, 7);

        let json_path = dir.path().join("rx.json");
        save_config(&config, &json_path).unwrap();
        let from_json: crate::RxConfig = load_config(&json_path).unwrap();
        assert_eq!(from_json.max_retries, 7);
    }

    #[test]
    fn test_udp_radio_roundtrip() {
        let mut b = UdpRadio::bind("127.0.0.1:0", "127.0.0.1:9").unwrap();
        let peer = b.local_addr().unwrap().to_string();
        let mut a = UdpRadio::bind("127.0.0.1:0", &peer).unwrap();

        a.send(b"over the bench link").unwrap();
        let got = b.receive(Duration::from_millis(200)).unwrap().unwrap();
        assert_eq!(got.bytes, b"over the bench link");

        assert!(b.receive(Duration::from_millis(20)).unwrap().is_none());
    }
}
