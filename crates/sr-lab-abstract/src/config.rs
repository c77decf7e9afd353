use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default number of outstanding unacknowledged packets.
pub const WINDOW_SIZE: usize = 6;

/// Default sequence number space. Must be at least twice [`WINDOW_SIZE`].
pub const SEQ_SPACE: usize = 12;

/// Default retransmission timeout in simulated time units.
pub const RTT: u64 = 16;

/// Default bound on simulated time for one emulator run.
pub const TIME_LIMIT: u64 = 1_000_000;

/// Protocol constants shared by sender and receiver.
///
/// Fixed for the lifetime of a protocol instance; the only way to obtain one is
/// through [`ProtocolConfig::new`] (or [`Default`]), which enforces
/// `seq_space >= 2 * window_size`. Without that bound a receiver cannot tell a
/// retransmitted old packet from a new one once sequence numbers wrap.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ProtocolConfig {
    window_size: usize,
    seq_space: usize,
    rtt: u64,
}

impl ProtocolConfig {
    pub fn new(window_size: usize, seq_space: usize, rtt: u64) -> Result<Self, ConfigError> {
        if window_size == 0 {
            return Err(ConfigError::EmptyWindow);
        }
        if seq_space < 2 * window_size {
            return Err(ConfigError::SeqSpaceTooSmall {
                window_size,
                seq_space,
            });
        }
        if rtt == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(Self {
            window_size,
            seq_space,
            rtt,
        })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn seq_space(&self) -> usize {
        self.seq_space
    }

    pub fn rtt(&self) -> u64 {
        self.rtt
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            window_size: WINDOW_SIZE,
            seq_space: SEQ_SPACE,
            rtt: RTT,
        }
    }
}

/// Behaviour of the emulated channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    pub loss_rate: f64,
    pub corrupt_rate: f64,
    pub min_latency: u64,
    pub max_latency: u64,
    pub seed: u64,
    /// Stop processing events scheduled after this time. A channel that loses
    /// everything would otherwise retransmit forever.
    #[serde(default)]
    pub time_limit: Option<u64>,
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("loss_rate", self.loss_rate),
            ("corrupt_rate", self.corrupt_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::RateOutOfRange { name, value });
            }
        }
        if self.min_latency > self.max_latency {
            return Err(ConfigError::LatencyRange {
                min: self.min_latency,
                max: self.max_latency,
            });
        }
        Ok(())
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            corrupt_rate: 0.0,
            min_latency: 2,
            max_latency: 6,
            seed: 0,
            time_limit: Some(TIME_LIMIT),
        }
    }
}
