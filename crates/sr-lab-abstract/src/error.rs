#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("window size must be at least 1")]
    EmptyWindow,

    #[error("sequence space {seq_space} must be at least twice the window size {window_size}")]
    SeqSpaceTooSmall { window_size: usize, seq_space: usize },

    #[error("retransmission timeout must be positive")]
    ZeroTimeout,

    #[error("{name} must be within [0, 1], got {value}")]
    RateOutOfRange { name: &'static str, value: f64 },

    #[error("min_latency {min} exceeds max_latency {max}")]
    LatencyRange { min: u64, max: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    #[error("message too large: {size} bytes (max {max})")]
    TooLong { size: usize, max: usize },
}
