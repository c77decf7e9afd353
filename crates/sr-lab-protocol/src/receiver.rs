//! Selective-Repeat receive side.

use sr_lab_abstract::{Message, Packet, ProtocolConfig, SystemContext, TransportProtocol};

use crate::checksum::{is_corrupted, seal};
use crate::stats::ReceiverStats;
use crate::window::RecvWindow;

/// Result of [`SrReceiver::receive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// Dropped without an ACK.
    Corrupted,
    /// Already delivered, or too far ahead. ACKed, not delivered.
    OutOfWindow,
    /// In window but already buffered. ACKed again.
    Duplicate,
    /// Stored behind a gap.
    Buffered,
    /// Filled the gap at `rcv_base`; `count` payloads went to the application.
    Delivered { count: usize },
}

/// Buffers out-of-order arrivals and releases them to the application in
/// sequence order. Every uncorrupted packet is acknowledged with its own
/// sequence number, including ones outside the window, so a sender whose ACK
/// was lost can still advance.
#[derive(Debug, Clone)]
pub struct SrReceiver {
    config: ProtocolConfig,
    window: RecvWindow,
    stats: ReceiverStats,
}

impl SrReceiver {
    pub fn new(config: ProtocolConfig) -> Self {
        Self {
            window: RecvWindow::new(&config),
            stats: ReceiverStats::default(),
            config,
        }
    }

    pub fn window(&self) -> &RecvWindow {
        &self.window
    }

    pub fn stats(&self) -> &ReceiverStats {
        &self.stats
    }

    pub fn receive(&mut self, ctx: &mut dyn SystemContext, packet: Packet) -> ReceiveOutcome {
        if is_corrupted(&packet) {
            ctx.log("corrupted packet dropped");
            return ReceiveOutcome::Corrupted;
        }

        let outcome = if !self.window.contains(packet.seqnum) {
            ctx.log(&format!(
                "packet {} outside window starting at {}",
                packet.seqnum,
                self.window.rcv_base()
            ));
            ReceiveOutcome::OutOfWindow
        } else if !self.window.insert(packet) {
            ctx.log(&format!("packet {} already buffered", packet.seqnum));
            ReceiveOutcome::Duplicate
        } else {
            self.stats.packets_received += 1;
            if packet.seqnum == self.window.rcv_base() {
                ReceiveOutcome::Delivered {
                    count: self.deliver_in_order(ctx),
                }
            } else {
                ctx.log(&format!(
                    "packet {} buffered, waiting for {}",
                    packet.seqnum,
                    self.window.rcv_base()
                ));
                ReceiveOutcome::Buffered
            }
        };

        self.send_ack(ctx, packet.seqnum);
        self.stats.publish(ctx);
        outcome
    }

    fn deliver_in_order(&mut self, ctx: &mut dyn SystemContext) -> usize {
        let mut count = 0;
        while let Some(packet) = self.window.pop_front() {
            ctx.log(&format!("delivering packet {}", packet.seqnum));
            ctx.deliver_data(&packet.payload);
            self.stats.packets_delivered += 1;
            count += 1;
        }
        count
    }

    fn send_ack(&mut self, ctx: &mut dyn SystemContext, acknum: i32) {
        ctx.send_packet(seal(Packet::ack(acknum)));
        self.stats.acks_sent += 1;
    }

    pub fn reset(&mut self) {
        self.window = RecvWindow::new(&self.config);
        self.stats = ReceiverStats::default();
    }
}

impl TransportProtocol for SrReceiver {
    fn init(&mut self, ctx: &mut dyn SystemContext) {
        self.reset();
        ctx.log(&format!(
            "SR receiver ready (window {}, seq space {})",
            self.config.window_size(),
            self.config.seq_space()
        ));
    }

    fn on_packet(&mut self, ctx: &mut dyn SystemContext, packet: Packet) {
        self.receive(ctx, packet);
    }

    fn on_timer(&mut self, _ctx: &mut dyn SystemContext, _timer_id: u32) {
        // Receiver has no timers
    }

    fn on_app_data(&mut self, _ctx: &mut dyn SystemContext, _message: Message) {
        // Data flows one way
    }
}
