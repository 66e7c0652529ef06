//! Sender state machine: paced, acknowledgment-gated chunk delivery
//!
//! One chunk is in flight at a time. Every physical transmit is separated by
//! the configured pacing delay, every chunk waits for its acknowledgment, and
//! a chunk that stays unacknowledged after `max_retries + 1` sends aborts the
//! session with a delivery failure. A retransmitted chunk is byte-identical
//! to the original.

use crate::error::{ProtocolError, Result};
use crate::stats::{StatsRecorder, TransferReport};
use loraimg_core::config::{RadioParams, TransferParams};
use loraimg_core::link_quality::LinkQualityMonitor;
use loraimg_core::radio::RadioDriver;
use loraimg_frame::chunk::{self, Chunk};
use loraimg_frame::frame::{Frame, FrameKind};
use loraimg_frame::FrameError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Named sender states; one transition is taken per loop iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SenderState {
    Idle,
    Sending { index: u16 },
    AwaitingAck { index: u16, attempt: u32 },
    Retrying { index: u16, attempt: u32 },
    SendingEot { attempt: u32 },
    AwaitingEotAck { attempt: u32 },
    Done,
    Aborted,
}

/// What came back while awaiting an acknowledgment for a specific index.
///
/// Frames referencing any other index are stale echoes of earlier exchanges
/// and are filtered out before this event is formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyEvent {
    Ack,
    Nack,
    Timeout,
}

impl SenderState {
    /// Resolve `AwaitingAck { index, attempt }` against the peer's reply.
    fn resolve_ack(
        index: u16,
        attempt: u32,
        event: ReplyEvent,
        max_retries: u32,
        last_index: u16,
    ) -> SenderState {
        match event {
            ReplyEvent::Ack if index == last_index => SenderState::SendingEot { attempt: 1 },
            ReplyEvent::Ack => SenderState::Sending { index: index + 1 },
            ReplyEvent::Nack | ReplyEvent::Timeout => {
                if attempt <= max_retries {
                    SenderState::Retrying {
                        index,
                        attempt: attempt + 1,
                    }
                } else {
                    SenderState::Aborted
                }
            }
        }
    }

    /// Resolve `AwaitingEotAck { attempt }` against the peer's reply.
    fn resolve_eot_ack(attempt: u32, event: ReplyEvent, max_retries: u32) -> SenderState {
        match event {
            ReplyEvent::Ack => SenderState::Done,
            ReplyEvent::Nack | ReplyEvent::Timeout => {
                if attempt <= max_retries {
                    SenderState::SendingEot {
                        attempt: attempt + 1,
                    }
                } else {
                    SenderState::Aborted
                }
            }
        }
    }
}

/// Drives a chunk sequence through the radio until everything, including the
/// end-of-transmission frame, is acknowledged.
#[derive(Debug)]
pub struct Sender<R: RadioDriver> {
    radio: R,
    params: TransferParams,
    chunks: Vec<Chunk>,
    state: SenderState,
    stats: StatsRecorder,
    link: LinkQualityMonitor,
    stop: Arc<AtomicBool>,
    last_tx: Option<Instant>,
}

impl<R: RadioDriver> Sender<R> {
    /// Validate configuration, configure the radio, and split the buffer.
    ///
    /// All rejection happens here, before any radio traffic.
    pub fn new(
        mut radio: R,
        radio_params: &RadioParams,
        params: TransferParams,
        buffer: &[u8],
    ) -> Result<Self> {
        radio_params.validate()?;
        params.validate()?;
        radio.configure(radio_params)?;

        let chunks = chunk::split(buffer, params.chunk_size).map_err(|err| match err {
            FrameError::EmptyBuffer => ProtocolError::EmptyTransfer,
            other => other.into(),
        })?;

        Ok(Self {
            radio,
            params,
            chunks,
            state: SenderState::Idle,
            stats: StatsRecorder::new(),
            link: LinkQualityMonitor::default(),
            stop: Arc::new(AtomicBool::new(false)),
            last_tx: None,
        })
    }

    /// Handle for signalling cancellation from another thread.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn state(&self) -> &SenderState {
        &self.state
    }

    fn total_count(&self) -> u16 {
        self.chunks.len() as u16
    }

    fn last_index(&self) -> u16 {
        self.total_count() - 1
    }

    /// Summary so far; after a failed run this is the partial-progress view.
    pub fn report(&self) -> TransferReport {
        self.stats
            .finalize(self.total_count(), self.link.snapshot(), None)
    }

    /// Run the transfer to completion or failure.
    pub fn run(&mut self) -> Result<TransferReport> {
        info!(
            chunks = self.chunks.len(),
            chunk_size = self.params.chunk_size,
            "starting transfer"
        );
        loop {
            if self.stop.load(Ordering::Relaxed) {
                warn!("transfer cancelled by stop signal");
                self.state = SenderState::Aborted;
                return Err(ProtocolError::Cancelled);
            }

            match self.state.clone() {
                SenderState::Idle => {
                    self.state = SenderState::Sending { index: 0 };
                }
                SenderState::Sending { index } => {
                    self.transmit_chunk(index)?;
                    self.state = SenderState::AwaitingAck { index, attempt: 1 };
                }
                SenderState::AwaitingAck { index, attempt } => {
                    let event = self.await_reply(index)?;
                    let next = SenderState::resolve_ack(
                        index,
                        attempt,
                        event,
                        self.params.max_retries,
                        self.last_index(),
                    );
                    match next {
                        SenderState::Sending { .. } | SenderState::SendingEot { .. } => {
                            self.stats.record_delivered(index);
                            debug!(index, "chunk acknowledged");
                        }
                        SenderState::Aborted => {
                            self.stats.record_failed();
                            warn!(index, attempts = attempt, "chunk delivery failed");
                            self.state = SenderState::Aborted;
                            return Err(ProtocolError::Delivery {
                                index,
                                attempts: attempt,
                            });
                        }
                        _ => {}
                    }
                    self.state = next;
                }
                SenderState::Retrying { index, attempt } => {
                    self.stats.record_retry();
                    debug!(index, attempt, "retransmitting chunk");
                    self.transmit_chunk(index)?;
                    self.state = SenderState::AwaitingAck { index, attempt };
                }
                SenderState::SendingEot { attempt } => {
                    if attempt > 1 {
                        self.stats.record_retry();
                        debug!(attempt, "retransmitting end-of-transmission");
                    }
                    self.transmit_eot()?;
                    self.state = SenderState::AwaitingEotAck { attempt };
                }
                SenderState::AwaitingEotAck { attempt } => {
                    let event = self.await_reply(self.total_count())?;
                    let next =
                        SenderState::resolve_eot_ack(attempt, event, self.params.max_retries);
                    if next == SenderState::Aborted {
                        warn!(attempts = attempt, "end-of-transmission never acknowledged");
                        self.state = SenderState::Aborted;
                        return Err(ProtocolError::Delivery {
                            index: self.total_count(),
                            attempts: attempt,
                        });
                    }
                    self.state = next;
                }
                SenderState::Done => {
                    info!("transfer complete");
                    return Ok(self.report());
                }
                SenderState::Aborted => {
                    return Err(ProtocolError::Cancelled);
                }
            }
        }
    }

    /// Observe the pacing delay, then transmit the frame for one chunk.
    fn transmit_chunk(&mut self, index: u16) -> Result<()> {
        let frame = Frame::data(&self.chunks[index as usize]);
        self.transmit(&frame)
    }

    fn transmit_eot(&mut self) -> Result<()> {
        let frame = Frame::eot(&self.params.eot_marker, self.total_count());
        self.transmit(&frame)
    }

    fn transmit(&mut self, frame: &Frame) -> Result<()> {
        // Pacing applies between physical transmits regardless of outcome,
        // to respect duty-cycle and collision-avoidance needs of the link.
        if let Some(last) = self.last_tx {
            let since = last.elapsed();
            if since < self.params.pacing_delay {
                thread::sleep(self.params.pacing_delay - since);
            }
        }
        self.radio.send(&frame.to_bytes())?;
        self.last_tx = Some(Instant::now());
        Ok(())
    }

    /// Wait up to the ack timeout for a reply referencing `expected_index`.
    ///
    /// ACKs and NACKs for any other index are stale frames from earlier
    /// exchanges and are ignored without consuming the timeout budget's
    /// remainder; undecodable replies are likewise skipped.
    fn await_reply(&mut self, expected_index: u16) -> Result<ReplyEvent> {
        let deadline = Instant::now() + self.params.ack_timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(ReplyEvent::Timeout);
            }
            let Some(reception) = self.radio.receive(deadline - now)? else {
                return Ok(ReplyEvent::Timeout);
            };
            self.link.record(reception.rssi, reception.snr);

            match Frame::from_bytes(&reception.bytes) {
                Ok(frame) => match frame.kind {
                    FrameKind::Ack if frame.index == expected_index => {
                        return Ok(ReplyEvent::Ack)
                    }
                    FrameKind::Nack if frame.index == expected_index => {
                        return Ok(ReplyEvent::Nack)
                    }
                    _ => {
                        debug!(
                            kind = ?frame.kind,
                            index = frame.index,
                            expected_index,
                            "ignoring stale or unexpected reply"
                        );
                    }
                },
                Err(err) => {
                    self.stats.record_rejected();
                    debug!(%err, "discarding undecodable reply");
                }
            }
        }
    }
}
