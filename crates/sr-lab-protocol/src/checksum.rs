//! Integrity check shared by both roles.

use sr_lab_abstract::Packet;

/// `seqnum + acknum + Σ payload`, payload bytes taken as unsigned.
///
/// Arithmetic wraps so that a header mangled in transit still yields a value
/// (and a mismatch) instead of an overflow panic.
pub fn compute_checksum(packet: &Packet) -> i32 {
    packet
        .payload
        .iter()
        .fold(packet.seqnum.wrapping_add(packet.acknum), |sum, &b| {
            sum.wrapping_add(i32::from(b))
        })
}

/// `true` when the stored checksum does not match the packet contents.
pub fn is_corrupted(packet: &Packet) -> bool {
    packet.checksum != compute_checksum(packet)
}

/// Fill in the checksum of a freshly built packet.
pub fn seal(mut packet: Packet) -> Packet {
    packet.checksum = compute_checksum(&packet);
    packet
}
