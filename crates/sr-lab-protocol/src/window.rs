//! Sequence-number arithmetic and the two circular slot buffers.
//!
//! Sequence numbers live in `[0, seq_space)` and wrap. Both windows keep an
//! explicit base slot next to their base sequence number, so slot `k` of the
//! ring always holds sequence number `base + ((k - base_slot) mod window_size)`.
//!
//! ```text
//!  base              base + len           base + window_size
//!   │                    │                       │
//! ──┼────────────────────┼───────────────────────┼──▶ seq space (mod S)
//!   │ <── occupied ────▶ │ <──── admissible ───▶ │
//! ```

use sr_lab_abstract::{Packet, ProtocolConfig};

/// `seq + n` in a space of `seq_space` numbers.
pub fn seq_add(seq: i32, n: usize, seq_space: usize) -> i32 {
    let space = seq_space as i64;
    ((i64::from(seq) + n as i64).rem_euclid(space)) as i32
}

/// Distance from `base` forward to `seq`, modulo `seq_space`.
///
/// `None` when `seq` is not a valid sequence number at all.
pub fn seq_offset(base: i32, seq: i32, seq_space: usize) -> Option<usize> {
    if seq < 0 || seq as usize >= seq_space {
        return None;
    }
    let space = seq_space as i64;
    Some((i64::from(seq) - i64::from(base)).rem_euclid(space) as usize)
}

/// `true` when `seq` lies in `[base, base + window_size)` modulo `seq_space`.
pub fn in_window(base: i32, seq: i32, window_size: usize, seq_space: usize) -> bool {
    seq_offset(base, seq, seq_space).is_some_and(|off| off < window_size)
}

/// Ring slot `offset` positions after `base_slot`.
pub fn slot_at(base_slot: usize, offset: usize, window_size: usize) -> usize {
    (base_slot + offset) % window_size
}

/// A packet waiting for its acknowledgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InFlight {
    pub packet: Packet,
    pub acked: bool,
}

/// Sender side: packets sent but not yet slid out of the window.
#[derive(Debug, Clone)]
pub struct SendWindow {
    slots: Box<[Option<InFlight>]>,
    base_slot: usize,
    base: i32,
    count: usize,
    next_seqnum: i32,
    seq_space: usize,
}

impl SendWindow {
    pub fn new(config: &ProtocolConfig) -> Self {
        Self {
            slots: vec![None; config.window_size()].into_boxed_slice(),
            base_slot: 0,
            base: 0,
            count: 0,
            next_seqnum: 0,
            seq_space: config.seq_space(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots (`windowcount`).
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == self.capacity()
    }

    /// Sequence number of the oldest outstanding packet, or of the next one
    /// to be sent when nothing is outstanding.
    pub fn base(&self) -> i32 {
        self.base
    }

    pub fn base_slot(&self) -> usize {
        self.base_slot
    }

    pub fn next_seqnum(&self) -> i32 {
        self.next_seqnum
    }

    /// Store `packet` in the next free slot and advance `next_seqnum`.
    ///
    /// The packet must carry `next_seqnum()`. Returns the slot, or `None` when
    /// the window is full.
    pub fn push(&mut self, packet: Packet) -> Option<usize> {
        if self.is_full() {
            return None;
        }
        debug_assert_eq!(packet.seqnum, self.next_seqnum);
        let slot = slot_at(self.base_slot, self.count, self.capacity());
        self.slots[slot] = Some(InFlight {
            packet,
            acked: false,
        });
        self.count += 1;
        self.next_seqnum = seq_add(self.next_seqnum, 1, self.seq_space);
        Some(slot)
    }

    pub fn get(&self, slot: usize) -> Option<&InFlight> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    /// Slot currently holding `seqnum`, if it is outstanding.
    pub fn slot_of(&self, seqnum: i32) -> Option<usize> {
        let offset = seq_offset(self.base, seqnum, self.seq_space)?;
        if offset >= self.count {
            return None;
        }
        let slot = slot_at(self.base_slot, offset, self.capacity());
        self.get(slot)
            .filter(|entry| entry.packet.seqnum == seqnum)
            .map(|_| slot)
    }

    /// Occupied slots in window order, oldest first.
    pub fn occupied(&self) -> impl Iterator<Item = (usize, &InFlight)> + '_ {
        (0..self.count).filter_map(move |offset| {
            let slot = slot_at(self.base_slot, offset, self.capacity());
            self.get(slot).map(|entry| (slot, entry))
        })
    }

    /// Mark `slot` acknowledged. `false` if it is empty or already acknowledged.
    pub fn mark_acked(&mut self, slot: usize) -> bool {
        match self.slots.get_mut(slot).and_then(Option::as_mut) {
            Some(entry) if !entry.acked => {
                entry.acked = true;
                true
            }
            _ => false,
        }
    }

    /// Advance past the maximal acknowledged prefix. Returns the vacated slots.
    ///
    /// An acknowledged slot behind an unacknowledged one stays put.
    pub fn slide(&mut self) -> Vec<usize> {
        let mut vacated = Vec::new();
        while self.count > 0 {
            let slot = self.base_slot;
            if !self.slots[slot].is_some_and(|entry| entry.acked) {
                break;
            }
            self.slots[slot] = None;
            vacated.push(slot);
            self.base_slot = slot_at(slot, 1, self.capacity());
            self.base = seq_add(self.base, 1, self.seq_space);
            self.count -= 1;
        }
        vacated
    }
}

/// Receiver side: packets accepted ahead of `rcv_base`, waiting for the gap
/// before them to fill.
#[derive(Debug, Clone)]
pub struct RecvWindow {
    slots: Box<[Option<Packet>]>,
    base_slot: usize,
    rcv_base: i32,
    seq_space: usize,
}

impl RecvWindow {
    pub fn new(config: &ProtocolConfig) -> Self {
        Self {
            slots: vec![None; config.window_size()].into_boxed_slice(),
            base_slot: 0,
            rcv_base: 0,
            seq_space: config.seq_space(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Next sequence number owed to the application.
    pub fn rcv_base(&self) -> i32 {
        self.rcv_base
    }

    pub fn contains(&self, seqnum: i32) -> bool {
        in_window(self.rcv_base, seqnum, self.capacity(), self.seq_space)
    }

    fn slot_for(&self, seqnum: i32) -> Option<usize> {
        let offset = seq_offset(self.rcv_base, seqnum, self.seq_space)?;
        (offset < self.capacity()).then(|| slot_at(self.base_slot, offset, self.capacity()))
    }

    pub fn is_buffered(&self, seqnum: i32) -> bool {
        self.slot_for(seqnum)
            .is_some_and(|slot| self.slots[slot].is_some())
    }

    /// Number of packets held back waiting for a gap to fill.
    pub fn buffered(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Buffer an in-window packet. `false` if it is out of window or already held.
    pub fn insert(&mut self, packet: Packet) -> bool {
        match self.slot_for(packet.seqnum) {
            Some(slot) if self.slots[slot].is_none() => {
                self.slots[slot] = Some(packet);
                true
            }
            _ => false,
        }
    }

    /// Take the packet at `rcv_base` if it has arrived, advancing the window.
    pub fn pop_front(&mut self) -> Option<Packet> {
        let packet = self.slots[self.base_slot].take()?;
        self.base_slot = slot_at(self.base_slot, 1, self.capacity());
        self.rcv_base = seq_add(self.rcv_base, 1, self.seq_space);
        Some(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sr_lab_abstract::Message;

    fn config() -> ProtocolConfig {
        ProtocolConfig::new(4, 8, 10).unwrap()
    }

    fn packet(seq: i32) -> Packet {
        Packet::data(seq, &Message::new([seq as u8; 20]))
    }

    #[test]
    fn window_membership_wraps() {
        assert!(in_window(6, 6, 4, 8));
        assert!(in_window(6, 7, 4, 8));
        assert!(in_window(6, 0, 4, 8));
        assert!(in_window(6, 1, 4, 8));
        assert!(!in_window(6, 2, 4, 8));
        assert!(!in_window(6, 5, 4, 8));
        assert!(!in_window(0, -1, 4, 8));
        assert!(!in_window(0, 8, 4, 8));
    }

    #[test]
    fn seq_add_wraps() {
        assert_eq!(seq_add(7, 1, 8), 0);
        assert_eq!(seq_add(5, 10, 8), 7);
        assert_eq!(seq_offset(7, 1, 8), Some(2));
        assert_eq!(seq_offset(1, 7, 8), Some(6));
    }

    #[test]
    fn send_window_admits_up_to_capacity() {
        let mut window = SendWindow::new(&config());
        for seq in 0..4 {
            assert_eq!(window.push(packet(seq)), Some(seq as usize));
        }
        assert!(window.is_full());
        assert_eq!(window.len(), 4);
        assert_eq!(window.push(packet(4)), None);
        assert_eq!(window.next_seqnum(), 4);
    }

    #[test]
    fn slide_stops_at_first_unacked_slot() {
        let mut window = SendWindow::new(&config());
        for seq in 0..3 {
            window.push(packet(seq));
        }
        assert!(window.mark_acked(1));
        assert!(window.slide().is_empty());
        assert_eq!(window.base(), 0);
        assert_eq!(window.len(), 3);

        assert!(window.mark_acked(0));
        assert_eq!(window.slide(), vec![0, 1]);
        assert_eq!(window.base(), 2);
        assert_eq!(window.base_slot(), 2);
        assert_eq!(window.len(), 1);
        assert!(!window.mark_acked(0));
    }

    #[test]
    fn slots_are_reused_across_the_wrap() {
        let mut window = SendWindow::new(&config());
        for seq in 0..7 {
            let slot = window.push(packet(seq)).unwrap();
            assert!(window.mark_acked(slot));
            window.slide();
        }
        assert!(window.is_empty());
        assert_eq!(window.base(), 7);

        for seq in [7, 0, 1] {
            window.push(packet(seq));
        }
        assert_eq!(window.slot_of(7), Some(3));
        assert_eq!(window.slot_of(0), Some(0));
        assert_eq!(window.slot_of(1), Some(1));
        assert_eq!(window.slot_of(2), None);
        assert_eq!(window.slot_of(6), None);

        let order: Vec<i32> = window.occupied().map(|(_, e)| e.packet.seqnum).collect();
        assert_eq!(order, vec![7, 0, 1]);
    }

    #[test]
    fn recv_window_buffers_and_releases_in_order() {
        let mut window = RecvWindow::new(&config());
        assert!(window.insert(packet(2)));
        assert!(!window.insert(packet(2)));
        assert!(!window.insert(packet(4)));
        assert_eq!(window.pop_front(), None);

        assert!(window.insert(packet(0)));
        assert_eq!(window.pop_front().map(|p| p.seqnum), Some(0));
        assert_eq!(window.pop_front(), None);
        assert_eq!(window.rcv_base(), 1);
        assert!(window.contains(4));
        assert!(!window.contains(0));
        assert!(window.is_buffered(2));
        assert_eq!(window.buffered(), 1);
    }
}
