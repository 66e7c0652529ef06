//! Receiver state machine: frame validation, idempotent acknowledgment, and
//! count-driven completion
//!
//! Completion is decided by `total_count`, never by the end-of-transmission
//! marker alone; the marker is a redundant secondary signal. Once reassembly
//! completes, the receiver lingers a bounded number of ack-timeout windows so
//! the sender's EOT still gets acknowledged, then returns the buffer either
//! way.

use crate::error::{ProtocolError, Result};
use crate::stats::{StatsRecorder, TransferReport};
use loraimg_core::config::{RadioParams, TransferParams};
use loraimg_core::link_quality::{measured_ber, LinkQualityMonitor};
use loraimg_core::radio::{RadioDriver, Reception};
use loraimg_frame::chunk::{Reassembler, ReassemblyStatus};
use loraimg_frame::frame::{Frame, FrameKind};
use loraimg_frame::FrameError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Named receiver states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    /// Waiting for data frames.
    Listening,
    /// Reassembly is complete; lingering to acknowledge the sender's EOT.
    Finalizing,
    /// Transfer finished; the buffer has been emitted.
    Complete,
}

/// Drives the radio receive loop, feeding frames through validation and
/// reassembly and answering each with an ACK or NACK.
pub struct Receiver<R: RadioDriver> {
    radio: R,
    params: TransferParams,
    reassembler: Reassembler,
    state: ReceiverState,
    stats: StatsRecorder,
    link: LinkQualityMonitor,
    stop: Arc<AtomicBool>,
    reference: Option<Vec<u8>>,
    image: Option<Vec<u8>>,
    linger_left: u32,
}

impl<R: RadioDriver> Receiver<R> {
    /// Validate configuration and configure the radio; no traffic yet.
    pub fn new(mut radio: R, radio_params: &RadioParams, params: TransferParams) -> Result<Self> {
        radio_params.validate()?;
        params.validate()?;
        radio.configure(radio_params)?;

        Ok(Self {
            radio,
            params,
            reassembler: Reassembler::new(),
            state: ReceiverState::Listening,
            stats: StatsRecorder::new(),
            link: LinkQualityMonitor::default(),
            stop: Arc::new(AtomicBool::new(false)),
            reference: None,
            image: None,
            linger_left: 0,
        })
    }

    /// Supply the original buffer so a direct bit-compare BER can be
    /// reported. Evaluation-only; absence never affects reassembly.
    pub fn with_reference(mut self, reference: Vec<u8>) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Handle for signalling cancellation from another thread.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    /// Indices still missing, for diagnostics after an incomplete transfer.
    pub fn missing_indices(&self) -> Vec<u16> {
        self.reassembler.missing()
    }

    /// Summary so far; includes the bit-compare BER once the image is
    /// complete and a reference buffer was supplied.
    pub fn report(&self) -> TransferReport {
        let ber = match (&self.image, &self.reference) {
            (Some(image), Some(reference)) => measured_ber(image, reference),
            _ => None,
        };
        self.stats.finalize(
            self.reassembler.total_count().unwrap_or(0),
            self.link.snapshot(),
            ber,
        )
    }

    /// Listen until the transfer completes or fails.
    ///
    /// `LinkStalled` and `Incomplete` leave the session state intact, so the
    /// caller may invoke `run` again to keep listening.
    pub fn run(&mut self) -> Result<Vec<u8>> {
        loop {
            if self.stop.load(Ordering::Relaxed) {
                warn!("receive cancelled by stop signal");
                // An incomplete buffer is discarded, never exposed.
                return Err(ProtocolError::Cancelled);
            }

            match self.state {
                ReceiverState::Listening => {
                    match self.radio.receive(self.params.inactivity_window)? {
                        Some(reception) => self.handle_reception(reception)?,
                        None => {
                            let received = self.reassembler.received();
                            if received > 0 {
                                warn!(received, "link stalled mid-transfer");
                                return Err(ProtocolError::LinkStalled {
                                    idle: self.params.inactivity_window,
                                    received,
                                });
                            }
                            debug!("nothing heard yet, still listening");
                        }
                    }
                }
                ReceiverState::Finalizing => {
                    if self.linger_left == 0 {
                        debug!("no end-of-transmission heard, completing on count");
                        self.state = ReceiverState::Complete;
                        continue;
                    }
                    match self.radio.receive(self.params.ack_timeout)? {
                        Some(reception) => self.handle_reception(reception)?,
                        None => self.linger_left -= 1,
                    }
                }
                ReceiverState::Complete => {
                    return match &self.image {
                        Some(image) => Ok(image.clone()),
                        // Unreachable: Complete is only entered with an image.
                        None => Err(ProtocolError::Cancelled),
                    };
                }
            }
        }
    }

    fn handle_reception(&mut self, reception: Reception) -> Result<()> {
        self.link.record(reception.rssi, reception.snr);

        let frame = match Frame::from_bytes(&reception.bytes) {
            Ok(frame) => frame,
            Err(FrameError::ChecksumMismatch { index }) => {
                // The header survived well enough to name an index; NACK it
                // so the sender retries without waiting out the timeout.
                self.stats.record_rejected();
                debug!(index, "checksum mismatch, nacking declared index");
                self.send_nack(index)?;
                return Ok(());
            }
            Err(err) => {
                self.stats.record_rejected();
                debug!(%err, "dropping unreadable frame");
                return Ok(());
            }
        };

        match frame.kind {
            FrameKind::Data => self.handle_data(frame),
            FrameKind::Eot => self.handle_eot(frame),
            FrameKind::Ack | FrameKind::Nack => {
                debug!(kind = ?frame.kind, index = frame.index, "ignoring reply frame");
                Ok(())
            }
        }
    }

    fn handle_data(&mut self, frame: Frame) -> Result<()> {
        let status = self
            .reassembler
            .accept(frame.index, &frame.payload, frame.total_count);
        match status {
            ReassemblyStatus::Incomplete => {
                self.stats.record_delivered(frame.index);
                debug!(
                    index = frame.index,
                    received = self.reassembler.received(),
                    "chunk accepted"
                );
                self.send_ack(frame.index)?;
            }
            ReassemblyStatus::Duplicate => {
                // Acknowledge again: the sender evidently missed the first
                // ACK and must still be able to progress.
                debug!(index = frame.index, "duplicate chunk, re-acknowledging");
                self.send_ack(frame.index)?;
            }
            ReassemblyStatus::Conflict => {
                warn!(index = frame.index, "conflicting chunk rejected, first copy kept");
                self.send_ack(frame.index)?;
            }
            ReassemblyStatus::Complete(buffer) => {
                self.stats.record_delivered(frame.index);
                info!(bytes = buffer.len(), "reassembly complete");
                self.send_ack(frame.index)?;
                self.image = Some(buffer);
                self.linger_left = self.params.max_retries + 1;
                self.state = ReceiverState::Finalizing;
            }
        }
        Ok(())
    }

    fn handle_eot(&mut self, frame: Frame) -> Result<()> {
        if frame.payload != self.params.eot_marker {
            warn!(index = frame.index, "end-of-transmission marker mismatch, ignoring");
            self.stats.record_rejected();
            return Ok(());
        }

        if self.image.is_some() {
            debug!("end-of-transmission acknowledged");
            self.send_ack(frame.index)?;
            self.state = ReceiverState::Complete;
            Ok(())
        } else {
            // Premature end: the sender believes it is done but chunks are
            // missing. Never silently accepted as success.
            let missing = self.reassembler.missing();
            warn!(?missing, "end-of-transmission before reassembly completed");
            self.send_nack(frame.index)?;
            Err(ProtocolError::Incomplete { missing })
        }
    }

    fn send_ack(&mut self, index: u16) -> Result<()> {
        self.radio.send(&Frame::ack(index).to_bytes())?;
        self.stats.record_ack_sent();
        Ok(())
    }

    fn send_nack(&mut self, index: u16) -> Result<()> {
        self.radio.send(&Frame::nack(index).to_bytes())?;
        self.stats.record_nack_sent();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ScriptedRadio;
    use loraimg_frame::chunk::split;
    use std::time::Duration;

    fn fast_params() -> TransferParams {
        TransferParams {
            chunk_size: 3,
            pacing_delay: Duration::ZERO,
            max_retries: 2,
            ack_timeout: Duration::from_millis(10),
            inactivity_window: Duration::from_millis(50),
            eot_marker: vec![0x41, 0x42, 0x43],
        }
    }

    fn data_frames(buffer: &[u8]) -> Vec<Frame> {
        split(buffer, 3).unwrap().iter().map(Frame::data).collect()
    }

    fn new_receiver(radio: ScriptedRadio) -> Receiver<ScriptedRadio> {
        Receiver::new(radio, &RadioParams::default(), fast_params()).unwrap()
    }

    #[test]
    fn test_in_order_transfer_completes() {
        let frames = data_frames(b"HELLO!");
        let radio = ScriptedRadio::with_replies([
            Some(frames[0].clone()),
            Some(frames[1].clone()),
            Some(Frame::eot(b"ABC", 2)),
        ]);
        let sent = radio.sent_log();
        let mut receiver = new_receiver(radio);

        let image = receiver.run().unwrap();
        assert_eq!(image, b"HELLO!");
        assert_eq!(receiver.state(), ReceiverState::Complete);

        let sent = sent.lock().unwrap();
        let indices: Vec<u16> = sent.iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(sent.iter().all(|f| f.kind == FrameKind::Ack));

        let report = receiver.report();
        assert_eq!(report.total_chunks, 2);
        assert_eq!(report.chunks_delivered, 2);
        assert_eq!(report.acks_sent, 3);
    }

    #[test]
    fn test_out_of_order_transfer_completes() {
        let frames = data_frames(b"HELLO!");
        let radio = ScriptedRadio::with_replies([
            Some(frames[1].clone()),
            Some(frames[0].clone()),
            Some(Frame::eot(b"ABC", 2)),
        ]);
        let mut receiver = new_receiver(radio);

        let image = receiver.run().unwrap();
        assert_eq!(image, b"HELLO!");
    }

    #[test]
    fn test_completion_without_eot_is_count_driven() {
        let frames = data_frames(b"HELLO!");
        let radio =
            ScriptedRadio::with_replies([Some(frames[0].clone()), Some(frames[1].clone())]);
        let mut receiver = new_receiver(radio);

        // The linger windows all time out; the count already proves success.
        let image = receiver.run().unwrap();
        assert_eq!(image, b"HELLO!");
    }

    #[test]
    fn test_duplicate_chunk_is_acknowledged_again() {
        let frames = data_frames(b"HELLO!");
        let radio = ScriptedRadio::with_replies([
            Some(frames[0].clone()),
            Some(frames[0].clone()),
            Some(frames[1].clone()),
            Some(Frame::eot(b"ABC", 2)),
        ]);
        let sent = radio.sent_log();
        let mut receiver = new_receiver(radio);

        let image = receiver.run().unwrap();
        assert_eq!(image, b"HELLO!");

        let sent = sent.lock().unwrap();
        let acks_for_zero = sent
            .iter()
            .filter(|f| f.kind == FrameKind::Ack && f.index == 0)
            .count();
        assert_eq!(acks_for_zero, 2);
    }

    #[test]
    fn test_premature_eot_reports_missing_indices() {
        let frames = data_frames(b"0123456789ab"); // 4 chunks of 3
        let radio = ScriptedRadio::with_replies([
            Some(frames[0].clone()),
            Some(frames[1].clone()),
            Some(frames[3].clone()),
            Some(Frame::eot(b"ABC", 4)),
        ]);
        let sent = radio.sent_log();
        let mut receiver = new_receiver(radio);

        let err = receiver.run().unwrap_err();
        let ProtocolError::Incomplete { missing } = err else {
            panic!("expected Incomplete, got {err:?}");
        };
        assert_eq!(missing, vec![2]);
        assert_eq!(receiver.missing_indices(), vec![2]);

        // The premature EOT was nacked, not acked.
        let sent = sent.lock().unwrap();
        let last = sent.last().unwrap();
        assert_eq!(last.kind, FrameKind::Nack);
        assert_eq!(last.index, 4);
    }

    #[test]
    fn test_corrupted_data_frame_is_nacked_by_declared_index() {
        let frames = data_frames(b"HELLO!");
        let mut corrupted = frames[0].to_bytes();
        // Flip a payload bit; the header still names index 0.
        corrupted[8] ^= 0x01;
        let radio = ScriptedRadio::with_raw_replies([
            Some(corrupted),
            Some(frames[0].to_bytes()),
            Some(frames[1].to_bytes()),
            Some(Frame::eot(b"ABC", 2).to_bytes()),
        ]);
        let sent = radio.sent_log();
        let mut receiver = new_receiver(radio);

        let image = receiver.run().unwrap();
        assert_eq!(image, b"HELLO!");

        let sent = sent.lock().unwrap();
        assert_eq!(sent[0].kind, FrameKind::Nack);
        assert_eq!(sent[0].index, 0);

        let report = receiver.report();
        assert_eq!(report.nacks_sent, 1);
        assert_eq!(report.frames_rejected, 1);
    }

    #[test]
    fn test_unreadable_frame_is_dropped_silently() {
        let frames = data_frames(b"HELLO!");
        let radio = ScriptedRadio::with_raw_replies([
            Some(vec![0xff, 0x00]), // too short for any header
            Some(frames[0].to_bytes()),
            Some(frames[1].to_bytes()),
            Some(Frame::eot(b"ABC", 2).to_bytes()),
        ]);
        let sent = radio.sent_log();
        let mut receiver = new_receiver(radio);

        receiver.run().unwrap();
        // No NACK for the unreadable garbage.
        assert!(sent.lock().unwrap().iter().all(|f| f.kind == FrameKind::Ack));
        assert_eq!(receiver.report().frames_rejected, 1);
    }

    #[test]
    fn test_wrong_eot_marker_is_ignored() {
        let frames = data_frames(b"HELLO!");
        let radio = ScriptedRadio::with_replies([
            Some(frames[0].clone()),
            Some(frames[1].clone()),
            Some(Frame::eot(b"XYZ", 2)),
            Some(Frame::eot(b"ABC", 2)),
        ]);
        let mut receiver = new_receiver(radio);

        let image = receiver.run().unwrap();
        assert_eq!(image, b"HELLO!");
        assert_eq!(receiver.report().frames_rejected, 1);
    }

    #[test]
    fn test_silence_mid_transfer_is_a_stall() {
        let frames = data_frames(b"HELLO!");
        let radio = ScriptedRadio::with_replies([Some(frames[0].clone())]);
        let mut receiver = new_receiver(radio);

        let err = receiver.run().unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::LinkStalled { received: 1, .. }
        ));
        // Session state survives the stall for a follow-up run.
        assert_eq!(receiver.missing_indices(), vec![1]);
    }

    #[test]
    fn test_stop_signal_discards_partial_buffer() {
        let radio = ScriptedRadio::silent();
        let mut receiver = new_receiver(radio);
        receiver.stop_handle().store(true, Ordering::Relaxed);

        let err = receiver.run().unwrap_err();
        assert!(matches!(err, ProtocolError::Cancelled));
    }

    #[test]
    fn test_ber_reported_against_reference() {
        let frames = data_frames(b"HELLO!");
        let radio = ScriptedRadio::with_replies([
            Some(frames[0].clone()),
            Some(frames[1].clone()),
            Some(Frame::eot(b"ABC", 2)),
        ]);
        let mut receiver = new_receiver(radio).with_reference(b"HELLO!".to_vec());

        receiver.run().unwrap();
        assert_eq!(receiver.report().bit_error_rate, Some(0.0));
    }

    #[test]
    fn test_ber_is_none_without_reference_or_completion() {
        let radio = ScriptedRadio::silent();
        let receiver = new_receiver(radio);
        assert_eq!(receiver.report().bit_error_rate, None);
    }
}
