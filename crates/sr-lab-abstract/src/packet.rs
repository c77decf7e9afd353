use serde::{Deserialize, Serialize};

use crate::error::MessageError;

/// Size of the fixed payload carried by every packet and message.
pub const PAYLOAD_SIZE: usize = 20;

/// Sentinel for a numeric field that carries no meaning in this packet
/// (the acknum of a data packet, the seqnum of an ACK).
pub const NOT_IN_USE: i32 = -1;

/// Fixed-size record exchanged over the unreliable channel.
///
/// The checksum is not maintained by the record itself; whoever builds a
/// packet is expected to fill it in before handing it to the channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Packet {
    pub seqnum: i32,
    pub acknum: i32,
    pub checksum: i32,
    pub payload: [u8; PAYLOAD_SIZE],
}

impl Packet {
    /// Data packet carrying `message`, acknum unused, checksum still zero.
    pub fn data(seqnum: i32, message: &Message) -> Self {
        Self {
            seqnum,
            acknum: NOT_IN_USE,
            checksum: 0,
            payload: message.data,
        }
    }

    /// Pure acknowledgment with a zero-filled payload, checksum still zero.
    pub fn ack(acknum: i32) -> Self {
        Self {
            seqnum: NOT_IN_USE,
            acknum,
            checksum: 0,
            payload: [0; PAYLOAD_SIZE],
        }
    }

    pub fn is_ack(&self) -> bool {
        self.acknum != NOT_IN_USE
    }
}

/// Application-layer unit handed to the sender. Opaque to the protocol.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Message {
    pub data: [u8; PAYLOAD_SIZE],
}

impl Message {
    pub fn new(data: [u8; PAYLOAD_SIZE]) -> Self {
        Self { data }
    }

    /// Build a message from up to [`PAYLOAD_SIZE`] bytes, zero-padding the tail.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MessageError> {
        if bytes.len() > PAYLOAD_SIZE {
            return Err(MessageError::TooLong {
                size: bytes.len(),
                max: PAYLOAD_SIZE,
            });
        }
        let mut data = [0; PAYLOAD_SIZE];
        data[..bytes.len()].copy_from_slice(bytes);
        Ok(Self { data })
    }

    /// Payload with trailing zero padding removed.
    pub fn trimmed(&self) -> &[u8] {
        trim_padding(&self.data)
    }
}

impl TryFrom<&[u8]> for Message {
    type Error = MessageError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::from_bytes(bytes)
    }
}

/// Strip the zero padding a [`Message`] adds to short payloads.
pub fn trim_padding(data: &[u8]) -> &[u8] {
    let end = data.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &data[..end]
}
