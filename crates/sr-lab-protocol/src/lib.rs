//! Selective-Repeat ARQ roles for the SR lab emulator.
//!
//! Both roles are plain owned state machines driven through
//! [`TransportProtocol`]; they never touch time or I/O themselves and only act
//! through the [`SystemContext`] handed to each call.

pub mod checksum;
pub mod receiver;
pub mod sender;
pub mod stats;
pub mod timer;
pub mod window;

#[cfg(test)]
mod test_support;

pub use checksum::{compute_checksum, is_corrupted};
pub use receiver::{ReceiveOutcome, SrReceiver};
pub use sender::{AckOutcome, SendOutcome, SrSender, TimeoutOutcome};
pub use stats::{ReceiverStats, SenderStats};

pub use sr_lab_abstract::{Message, Packet, ProtocolConfig, SystemContext, TransportProtocol};

pub fn sender(config: ProtocolConfig) -> Box<dyn TransportProtocol> {
    Box::new(SrSender::new(config))
}

pub fn receiver(config: ProtocolConfig) -> Box<dyn TransportProtocol> {
    Box::new(SrReceiver::new(config))
}
