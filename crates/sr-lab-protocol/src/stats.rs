//! Counters read by the harness at the end of a run.

use sr_lab_abstract::SystemContext;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SenderStats {
    /// Messages refused because the window was full.
    pub window_full: u64,
    /// Uncorrupted ACKs received, duplicates included.
    pub total_acks_received: u64,
    /// ACKs that acknowledged an outstanding packet for the first time.
    pub new_acks: u64,
    /// Timeout-driven retransmissions.
    pub packets_resent: u64,
}

impl SenderStats {
    pub fn publish(&self, ctx: &mut dyn SystemContext) {
        ctx.record_metric("window_full", self.window_full as f64);
        ctx.record_metric("total_acks_received", self.total_acks_received as f64);
        ctx.record_metric("new_acks", self.new_acks as f64);
        ctx.record_metric("packets_resent", self.packets_resent as f64);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    /// Distinct in-window packets accepted into the buffer.
    pub packets_received: u64,
    /// Payloads handed to the application.
    pub packets_delivered: u64,
    pub acks_sent: u64,
}

impl ReceiverStats {
    pub fn publish(&self, ctx: &mut dyn SystemContext) {
        ctx.record_metric("packets_received", self.packets_received as f64);
        ctx.record_metric("packets_delivered", self.packets_delivered as f64);
        ctx.record_metric("acks_sent", self.acks_sent as f64);
    }
}
