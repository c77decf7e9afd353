//! Selective-Repeat send side.
//!
//! [`SrSender`] keeps up to `window_size` packets in flight. Each one is
//! acknowledged individually; the window base only moves past a contiguous
//! run of acknowledged packets, and a timeout retransmits exactly the packet
//! its timer was covering, never the whole window.

use sr_lab_abstract::{Message, Packet, ProtocolConfig, SystemContext, TransportProtocol};

use crate::checksum::{is_corrupted, seal};
use crate::stats::SenderStats;
use crate::timer::TimerManager;
use crate::window::SendWindow;

/// Result of handing a message to [`SrSender::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent { seqnum: i32 },
    /// Window exhausted; the message was dropped and counted.
    WindowFull,
}

/// Result of [`SrSender::receive_ack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    Corrupted,
    /// Already acknowledged, or not in the current window.
    Duplicate,
    /// First acknowledgment of an outstanding packet; `slid` slots were freed.
    New { slid: usize },
}

/// Result of [`SrSender::on_timeout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutOutcome {
    /// Nothing outstanding.
    Idle,
    /// The timer was stopped after it had already been scheduled to fire.
    Stale,
    Retransmitted { seqnum: i32 },
    /// No timer was covering the window; one was armed instead.
    Rearmed { slot: usize },
}

#[derive(Debug, Clone)]
pub struct SrSender {
    config: ProtocolConfig,
    window: SendWindow,
    timers: TimerManager,
    stats: SenderStats,
}

impl SrSender {
    pub fn new(config: ProtocolConfig) -> Self {
        Self {
            window: SendWindow::new(&config),
            timers: TimerManager::new(config.window_size(), config.rtt()),
            stats: SenderStats::default(),
            config,
        }
    }

    pub fn window(&self) -> &SendWindow {
        &self.window
    }

    pub fn timers(&self) -> &TimerManager {
        &self.timers
    }

    pub fn stats(&self) -> &SenderStats {
        &self.stats
    }

    /// Frame `message`, transmit it and make sure a timer covers the window.
    pub fn send(&mut self, ctx: &mut dyn SystemContext, message: Message) -> SendOutcome {
        if self.window.is_full() {
            self.stats.window_full += 1;
            ctx.log(&format!(
                "window full ({} outstanding), dropping message",
                self.window.len()
            ));
            self.stats.publish(ctx);
            return SendOutcome::WindowFull;
        }

        let packet = seal(Packet::data(self.window.next_seqnum(), &message));
        let Some(slot) = self.window.push(packet) else {
            return SendOutcome::WindowFull;
        };

        ctx.log(&format!("sending packet {} from slot {slot}", packet.seqnum));
        ctx.send_packet(packet);
        self.timers.ensure_running(ctx, &self.window);
        self.record_window(ctx);
        SendOutcome::Sent {
            seqnum: packet.seqnum,
        }
    }

    pub fn receive_ack(&mut self, ctx: &mut dyn SystemContext, packet: Packet) -> AckOutcome {
        if is_corrupted(&packet) {
            ctx.log("corrupted ACK ignored");
            return AckOutcome::Corrupted;
        }

        self.stats.total_acks_received += 1;
        let outcome = self.apply_ack(ctx, packet.acknum);
        self.stats.publish(ctx);
        self.record_window(ctx);
        outcome
    }

    fn apply_ack(&mut self, ctx: &mut dyn SystemContext, acknum: i32) -> AckOutcome {
        let Some(slot) = self.window.slot_of(acknum) else {
            ctx.log(&format!("ACK {acknum} is outside the window, ignored"));
            return AckOutcome::Duplicate;
        };
        if !self.window.mark_acked(slot) {
            ctx.log(&format!("duplicate ACK {acknum}"));
            return AckOutcome::Duplicate;
        }

        ctx.log(&format!("ACK {acknum} is new"));
        self.stats.new_acks += 1;
        self.timers.stop(ctx, slot);

        let vacated = self.window.slide();
        for &freed in &vacated {
            self.timers.stop(ctx, freed);
        }
        if !vacated.is_empty() {
            ctx.log(&format!(
                "window slid by {} to base {}",
                vacated.len(),
                self.window.base()
            ));
        }
        if !self.window.is_empty() {
            self.timers.ensure_running(ctx, &self.window);
        }
        AckOutcome::New {
            slid: vacated.len(),
        }
    }

    /// Handle expiry of the timer started for slot `timer_id`.
    pub fn on_timeout(&mut self, ctx: &mut dyn SystemContext, timer_id: u32) -> TimeoutOutcome {
        if self.window.is_empty() {
            return TimeoutOutcome::Idle;
        }

        let fired = timer_id as usize;
        if !self.timers.is_active(fired) {
            ctx.log(&format!("stale timer for slot {fired} ignored"));
            return match self.timers.ensure_running(ctx, &self.window) {
                Some(slot) => TimeoutOutcome::Rearmed { slot },
                None => TimeoutOutcome::Stale,
            };
        }

        let expired = self
            .window
            .occupied()
            .find(|(slot, _)| self.timers.is_active(*slot))
            .map(|(slot, entry)| (slot, entry.packet));

        match expired {
            Some((slot, packet)) => {
                ctx.log(&format!("timeout, resending packet {}", packet.seqnum));
                ctx.send_packet(packet);
                self.stats.packets_resent += 1;
                self.timers.restart(ctx, slot);
                self.stats.publish(ctx);
                TimeoutOutcome::Retransmitted {
                    seqnum: packet.seqnum,
                }
            }
            None => match self.timers.ensure_running(ctx, &self.window) {
                Some(slot) => TimeoutOutcome::Rearmed { slot },
                None => TimeoutOutcome::Stale,
            },
        }
    }

    /// Drop every outstanding packet and counter.
    pub fn reset(&mut self, ctx: &mut dyn SystemContext) {
        self.timers.reset(ctx);
        self.window = SendWindow::new(&self.config);
        self.stats = SenderStats::default();
    }

    fn record_window(&self, ctx: &mut dyn SystemContext) {
        ctx.record_metric("send_window", self.window.len() as f64);
    }
}

impl TransportProtocol for SrSender {
    fn init(&mut self, ctx: &mut dyn SystemContext) {
        self.reset(ctx);
        ctx.log(&format!(
            "SR sender ready (window {}, seq space {}, rtt {})",
            self.config.window_size(),
            self.config.seq_space(),
            self.config.rtt()
        ));
    }

    fn on_packet(&mut self, ctx: &mut dyn SystemContext, packet: Packet) {
        self.receive_ack(ctx, packet);
    }

    fn on_timer(&mut self, ctx: &mut dyn SystemContext, timer_id: u32) {
        self.on_timeout(ctx, timer_id);
    }

    fn on_app_data(&mut self, ctx: &mut dyn SystemContext, message: Message) {
        self.send(ctx, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::is_corrupted;
    use crate::test_support::RecordingContext;

    fn sender() -> SrSender {
        SrSender::new(ProtocolConfig::new(4, 8, 16).unwrap())
    }

    fn msg(i: u8) -> Message {
        Message::new([i; 20])
    }

    fn ack(acknum: i32) -> Packet {
        seal(Packet::ack(acknum))
    }

    fn sender_with_four_in_flight(ctx: &mut RecordingContext) -> SrSender {
        let mut s = sender();
        for i in 0..4 {
            s.send(ctx, msg(i));
        }
        s
    }

    #[test]
    fn fills_window_then_refuses() {
        let mut ctx = RecordingContext::default();
        let mut s = sender_with_four_in_flight(&mut ctx);

        let seqs: Vec<i32> = ctx.sent.iter().map(|p| p.seqnum).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3]);
        assert!(ctx.sent.iter().all(|p| !is_corrupted(p)));
        assert_eq!(s.window().len(), 4);

        ctx.sent.clear();
        assert_eq!(s.send(&mut ctx, msg(4)), SendOutcome::WindowFull);
        assert!(ctx.sent.is_empty());
        assert_eq!(s.stats().window_full, 1);
        assert_eq!(ctx.metric("window_full"), Some(1.0));
    }

    #[test]
    fn only_one_timer_covers_the_window() {
        let mut ctx = RecordingContext::default();
        let s = sender_with_four_in_flight(&mut ctx);
        assert_eq!(s.timers().active_count(), 1);
        assert!(s.timers().is_active(0));
        assert_eq!(ctx.armed_timers(), vec![0]);
    }

    #[test]
    fn ack_of_base_slides_and_moves_timer() {
        let mut ctx = RecordingContext::default();
        let mut s = sender_with_four_in_flight(&mut ctx);

        assert_eq!(s.receive_ack(&mut ctx, ack(0)), AckOutcome::New { slid: 1 });
        assert_eq!(s.window().base(), 1);
        assert_eq!(s.window().len(), 3);
        assert_eq!(s.timers().active_count(), 1);
        assert!(s.timers().is_active(1));
        assert_eq!(ctx.armed_timers(), vec![1]);
        assert_eq!(s.stats().new_acks, 1);
        assert_eq!(s.stats().total_acks_received, 1);
    }

    #[test]
    fn ack_past_a_gap_does_not_move_base() {
        let mut ctx = RecordingContext::default();
        let mut s = sender_with_four_in_flight(&mut ctx);

        assert_eq!(s.receive_ack(&mut ctx, ack(2)), AckOutcome::New { slid: 0 });
        assert_eq!(s.window().base(), 0);
        assert_eq!(s.window().len(), 4);
        assert!(s.timers().is_active(0));

        assert_eq!(s.receive_ack(&mut ctx, ack(1)), AckOutcome::New { slid: 0 });
        assert_eq!(s.receive_ack(&mut ctx, ack(0)), AckOutcome::New { slid: 3 });
        assert_eq!(s.window().base(), 3);
        assert_eq!(s.window().len(), 1);
        assert_eq!(ctx.armed_timers(), vec![3]);
    }

    #[test]
    fn duplicate_and_out_of_window_acks_are_counted_but_ignored() {
        let mut ctx = RecordingContext::default();
        let mut s = sender_with_four_in_flight(&mut ctx);
        s.receive_ack(&mut ctx, ack(1));

        assert_eq!(s.receive_ack(&mut ctx, ack(1)), AckOutcome::Duplicate);
        assert_eq!(s.receive_ack(&mut ctx, ack(6)), AckOutcome::Duplicate);
        assert_eq!(s.stats().total_acks_received, 3);
        assert_eq!(s.stats().new_acks, 1);
        assert_eq!(s.window().len(), 4);
    }

    #[test]
    fn corrupted_ack_changes_nothing() {
        let mut ctx = RecordingContext::default();
        let mut s = sender_with_four_in_flight(&mut ctx);
        let before = *s.stats();

        let mut bad = ack(0);
        bad.checksum += 1;
        assert_eq!(s.receive_ack(&mut ctx, bad), AckOutcome::Corrupted);
        assert_eq!(*s.stats(), before);
        assert_eq!(s.window().len(), 4);
        assert_eq!(s.window().base(), 0);
    }

    #[test]
    fn timeout_resends_only_the_covered_packet() {
        let mut ctx = RecordingContext::default();
        let mut s = sender();
        for i in 0..3 {
            s.send(&mut ctx, msg(i));
        }
        s.receive_ack(&mut ctx, ack(0));
        ctx.sent.clear();

        assert_eq!(
            s.on_timeout(&mut ctx, 1),
            TimeoutOutcome::Retransmitted { seqnum: 1 }
        );
        assert_eq!(ctx.sent.len(), 1);
        assert_eq!(ctx.sent[0].seqnum, 1);
        assert_eq!(ctx.sent[0].payload, [1; 20]);
        assert_eq!(s.stats().packets_resent, 1);
        assert!(s.timers().is_active(1));
        assert_eq!(ctx.armed_timers(), vec![1]);
    }

    #[test]
    fn stale_timer_for_acknowledged_slot_is_ignored() {
        let mut ctx = RecordingContext::default();
        let mut s = sender();
        s.send(&mut ctx, msg(0));
        s.send(&mut ctx, msg(1));
        s.receive_ack(&mut ctx, ack(0));
        ctx.sent.clear();

        assert_eq!(s.on_timeout(&mut ctx, 0), TimeoutOutcome::Stale);
        assert!(ctx.sent.is_empty());
        assert_eq!(s.stats().packets_resent, 0);
    }

    #[test]
    fn timeout_on_empty_window_is_idle() {
        let mut ctx = RecordingContext::default();
        let mut s = sender();
        s.send(&mut ctx, msg(0));
        s.receive_ack(&mut ctx, ack(0));
        assert_eq!(s.on_timeout(&mut ctx, 0), TimeoutOutcome::Idle);
        assert!(ctx.armed_timers().is_empty());
    }

    #[test]
    fn sequence_numbers_wrap_around_the_space() {
        let mut ctx = RecordingContext::default();
        let mut s = sender();
        for i in 0..10 {
            assert!(matches!(s.send(&mut ctx, msg(i)), SendOutcome::Sent { .. }));
            let seqnum = ctx.sent.last().map(|p| p.seqnum).unwrap();
            s.receive_ack(&mut ctx, ack(seqnum));
        }
        let seqs: Vec<i32> = ctx.sent.iter().map(|p| p.seqnum).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3, 4, 5, 6, 7, 0, 1]);
        assert!(s.window().is_empty());
        assert_eq!(s.window().base(), 2);
    }

    #[test]
    fn init_resets_state() {
        let mut ctx = RecordingContext::default();
        let mut s = sender_with_four_in_flight(&mut ctx);
        s.send(&mut ctx, msg(9));
        s.init(&mut ctx);
        assert!(s.window().is_empty());
        assert_eq!(s.window().next_seqnum(), 0);
        assert_eq!(*s.stats(), SenderStats::default());
        assert!(ctx.armed_timers().is_empty());
    }
}
