//! Scripted radio mock shared by the state machine tests
//!
//! Every `receive` pops the next scripted reply; an exhausted script or a
//! `None` entry behaves as a timeout, so tests never depend on real clocks.

use loraimg_core::config::RadioParams;
use loraimg_core::radio::{RadioDriver, Reception};
use loraimg_core::RadioError;
use loraimg_frame::frame::Frame;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug)]
pub struct ScriptedRadio {
    sent: Arc<Mutex<Vec<Frame>>>,
    replies: VecDeque<Option<Vec<u8>>>,
}

impl ScriptedRadio {
    /// Script well-formed reply frames; `None` entries are timeouts.
    pub fn with_replies<I: IntoIterator<Item = Option<Frame>>>(replies: I) -> Self {
        Self::with_raw_replies(
            replies
                .into_iter()
                .map(|reply| reply.map(|frame| frame.to_bytes())),
        )
    }

    /// A radio that never hears anything: every wait times out.
    pub fn silent() -> Self {
        Self::with_raw_replies(std::iter::empty())
    }

    /// Script raw reply bytes, for corrupted-frame scenarios.
    pub fn with_raw_replies<I: IntoIterator<Item = Option<Vec<u8>>>>(replies: I) -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            replies: replies.into_iter().collect(),
        }
    }

    /// Shared handle to everything this radio has transmitted, as decoded
    /// frames in transmission order.
    pub fn sent_log(&self) -> Arc<Mutex<Vec<Frame>>> {
        Arc::clone(&self.sent)
    }
}

impl RadioDriver for ScriptedRadio {
    fn configure(&mut self, _params: &RadioParams) -> Result<(), RadioError> {
        Ok(())
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), RadioError> {
        let frame = Frame::from_bytes(bytes).map_err(|err| RadioError::TransmissionFailed {
            msg: format!("test sent an unparseable frame: {err}"),
        })?;
        self.sent.lock().unwrap().push(frame);
        Ok(())
    }

    fn receive(&mut self, _timeout: Duration) -> Result<Option<Reception>, RadioError> {
        Ok(self.replies.pop_front().flatten().map(|bytes| Reception {
            bytes,
            rssi: -70.0,
            snr: 5.0,
        }))
    }
}
