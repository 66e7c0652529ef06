//! loraimg Protocol - reliable chunked transfer over a lossy radio link
//!
//! This crate provides the sender and receiver state machines that move an
//! opaque byte buffer across a radio that drops, corrupts, and reorders
//! frames: at-least-once delivery with a single chunk in flight, per-chunk
//! CRC validation, bounded retransmission, explicit end-of-transmission, and
//! statistics for judging the link.

pub mod error;
pub mod receiver;
pub mod sender;
pub mod stats;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::{ProtocolError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::{
        error::{ProtocolError, Result},
        receiver::{Receiver, ReceiverState},
        sender::{Sender, SenderState},
        stats::{StatsRecorder, TransferReport},
    };
}

#[cfg(test)]
mod tests {
    use crate::receiver::Receiver;
    use crate::sender::Sender;
    use crate::stats::TransferReport;
    use loraimg_core::config::{RadioParams, TransferParams};
    use loraimg_core::radio::{ChannelRadio, RadioDriver, Reception};
    use loraimg_core::RadioError;
    use std::collections::HashSet;
    use std::thread;
    use std::time::Duration;

    fn fast_params() -> TransferParams {
        TransferParams {
            chunk_size: 16,
            pacing_delay: Duration::ZERO,
            max_retries: 3,
            ack_timeout: Duration::from_millis(50),
            inactivity_window: Duration::from_millis(500),
            eot_marker: vec![0x41, 0x42, 0x43],
        }
    }

    /// Radio wrapper that swallows scripted outbound transmissions, counted
    /// from 1, without telling the sender.
    struct LossyRadio {
        inner: ChannelRadio,
        drop_sends: HashSet<usize>,
        count: usize,
    }

    impl RadioDriver for LossyRadio {
        fn configure(&mut self, params: &RadioParams) -> Result<(), RadioError> {
            self.inner.configure(params)
        }

        fn send(&mut self, bytes: &[u8]) -> Result<(), RadioError> {
            self.count += 1;
            if self.drop_sends.contains(&self.count) {
                return Ok(());
            }
            self.inner.send(bytes)
        }

        fn receive(&mut self, timeout: Duration) -> Result<Option<Reception>, RadioError> {
            self.inner.receive(timeout)
        }
    }

    fn spawn_receiver(
        radio: ChannelRadio,
        reference: Vec<u8>,
    ) -> thread::JoinHandle<(Vec<u8>, TransferReport)> {
        thread::spawn(move || {
            let mut receiver = Receiver::new(radio, &RadioParams::default(), fast_params())
                .unwrap()
                .with_reference(reference);
            let image = receiver.run().unwrap();
            (image, receiver.report())
        })
    }

    #[test]
    fn test_end_to_end_over_clean_link() {
        let image: Vec<u8> = (0..200u16).map(|v| (v % 251) as u8).collect();
        let (tx_radio, rx_radio) = ChannelRadio::pair();
        let receiver = spawn_receiver(rx_radio, image.clone());

        let mut sender =
            Sender::new(tx_radio, &RadioParams::default(), fast_params(), &image).unwrap();
        let tx_report = sender.run().unwrap();

        let (received, rx_report) = receiver.join().unwrap();
        assert_eq!(received, image);
        assert_eq!(tx_report.total_chunks, 13);
        assert_eq!(tx_report.chunks_delivered, 13);
        assert_eq!(tx_report.total_retries, 0);
        assert_eq!(rx_report.chunks_delivered, 13);
        assert_eq!(rx_report.bit_error_rate, Some(0.0));
        assert!(rx_report.average_rssi < 0.0);
    }

    #[test]
    fn test_end_to_end_survives_dropped_frames() {
        let image: Vec<u8> = (0..100u16).map(|v| v as u8).collect();
        let (tx_radio, rx_radio) = ChannelRadio::pair();
        let receiver = spawn_receiver(rx_radio, image.clone());

        // Swallow the first transmission of chunks 1 and 3.
        let lossy = LossyRadio {
            inner: tx_radio,
            drop_sends: HashSet::from([2, 5]),
            count: 0,
        };
        let mut sender =
            Sender::new(lossy, &RadioParams::default(), fast_params(), &image).unwrap();
        let tx_report = sender.run().unwrap();

        let (received, rx_report) = receiver.join().unwrap();
        assert_eq!(received, image);
        assert_eq!(tx_report.total_retries, 2);
        assert_eq!(tx_report.chunks_failed, 0);
        assert_eq!(rx_report.bit_error_rate, Some(0.0));
    }

    #[test]
    fn test_end_to_end_with_absent_receiver_fails_on_first_chunk() {
        let (tx_radio, _rx_radio) = ChannelRadio::pair();
        let mut params = fast_params();
        params.max_retries = 1;
        params.ack_timeout = Duration::from_millis(10);
        let mut sender =
            Sender::new(tx_radio, &RadioParams::default(), params, b"unheard").unwrap();

        let err = sender.run().unwrap_err();
        assert!(matches!(
            err,
            crate::ProtocolError::Delivery {
                index: 0,
                attempts: 2
            }
        ));
    }
}
