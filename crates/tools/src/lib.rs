//! loraimg Tools library

pub mod common;
pub mod rx;
pub mod tx;

pub use common::UdpRadio;
pub use rx::{ImageReceiver, RxConfig};
pub use tx::{Transmitter, TxConfig};
