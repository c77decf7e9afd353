//! Logical per-slot timers on top of the context's single-shot timers.
//!
//! One timer is active per non-empty window and it always covers the oldest
//! unacknowledged packet: when that packet is acknowledged the timer is
//! reassigned to the next oldest one. Timer ids handed to the context are slot
//! indices, so a timeout always names the slot it was started for.

use sr_lab_abstract::SystemContext;

use crate::window::SendWindow;

#[derive(Debug, Clone)]
pub struct TimerManager {
    active: Box<[bool]>,
    timeout: u64,
}

impl TimerManager {
    pub fn new(slots: usize, timeout: u64) -> Self {
        Self {
            active: vec![false; slots].into_boxed_slice(),
            timeout,
        }
    }

    pub fn is_active(&self, slot: usize) -> bool {
        self.active.get(slot).copied().unwrap_or(false)
    }

    /// Number of logical timers currently armed.
    pub fn active_count(&self) -> usize {
        self.active.iter().filter(|&&on| on).count()
    }

    /// Arm the timer for `slot`. No-op if it is already running.
    pub fn start(&mut self, ctx: &mut dyn SystemContext, slot: usize) {
        let Some(flag) = self.active.get_mut(slot) else {
            return;
        };
        if *flag {
            return;
        }
        *flag = true;
        ctx.start_timer(self.timeout, slot as u32);
    }

    /// Disarm the timer for `slot`. No-op if it is not running.
    pub fn stop(&mut self, ctx: &mut dyn SystemContext, slot: usize) {
        let Some(flag) = self.active.get_mut(slot) else {
            return;
        };
        if !*flag {
            return;
        }
        *flag = false;
        ctx.cancel_timer(slot as u32);
    }

    /// Stop and immediately re-arm `slot` for a full timeout.
    pub fn restart(&mut self, ctx: &mut dyn SystemContext, slot: usize) {
        self.stop(ctx, slot);
        self.start(ctx, slot);
    }

    /// Make sure an outstanding window is covered by a timer.
    ///
    /// Does nothing if an occupied slot already has one; otherwise arms the
    /// oldest unacknowledged slot. Returns the slot that was armed.
    pub fn ensure_running(
        &mut self,
        ctx: &mut dyn SystemContext,
        window: &SendWindow,
    ) -> Option<usize> {
        if window.occupied().any(|(slot, _)| self.is_active(slot)) {
            return None;
        }
        let slot = window
            .occupied()
            .find(|(_, entry)| !entry.acked)
            .map(|(slot, _)| slot)?;
        self.start(ctx, slot);
        Some(slot)
    }

    /// Forget every logical timer, cancelling the armed ones.
    pub fn reset(&mut self, ctx: &mut dyn SystemContext) {
        for slot in 0..self.active.len() {
            self.stop(ctx, slot);
        }
    }
}
