use crate::config::{ProtocolConfig, SimConfig};
use crate::error::ConfigError;
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct TestScenario {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub config: SimConfigOverride,
    #[serde(default)]
    pub protocol: ProtocolConfigOverride,
    pub actions: Vec<TestAction>,
    pub assertions: Vec<TestAssertion>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct SimConfigOverride {
    pub loss_rate: Option<f64>,
    pub corrupt_rate: Option<f64>,
    pub min_latency: Option<u64>,
    pub max_latency: Option<u64>,
    pub seed: Option<u64>,
    pub time_limit: Option<u64>,
}

impl SimConfigOverride {
    pub fn apply_to(&self, config: &mut SimConfig) {
        if let Some(v) = self.loss_rate {
            config.loss_rate = v;
        }
        if let Some(v) = self.corrupt_rate {
            config.corrupt_rate = v;
        }
        if let Some(v) = self.min_latency {
            config.min_latency = v;
        }
        if let Some(v) = self.max_latency {
            config.max_latency = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
        if let Some(v) = self.time_limit {
            config.time_limit = Some(v);
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ProtocolConfigOverride {
    pub window_size: Option<usize>,
    pub seq_space: Option<usize>,
    pub rtt: Option<u64>,
}

impl ProtocolConfigOverride {
    /// Overlay the set fields on `base` and re-validate the result.
    pub fn apply_to(&self, base: ProtocolConfig) -> Result<ProtocolConfig, ConfigError> {
        ProtocolConfig::new(
            self.window_size.unwrap_or(base.window_size()),
            self.seq_space.unwrap_or(base.seq_space()),
            self.rtt.unwrap_or(base.rtt()),
        )
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAction {
    /// Application hands a message to the sender at a specific time
    AppSend { time: u64, data: String },
    /// Deterministically drop the first packet sent by Sender with given seq number
    DropNextFromSenderSeq { seq: i32 },
    /// Deterministically drop the first ACK sent by Receiver with given ack number
    DropNextFromReceiverAck { ack: i32 },
    /// Deterministically corrupt the first packet sent by Sender with given seq number
    CorruptNextFromSenderSeq { seq: i32 },
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAssertion {
    /// Assert that specific data was delivered to the application layer
    DataDelivered { data: String },
    /// Assert that every accepted message was delivered exactly once, in send order
    DeliveredInOrder,
    /// Assert that the total number of packets sent by Sender is within range
    SenderPacketCount { min: u32, max: Option<u32> },
    /// Assert that the final value of a recorded metric is within range
    MetricRange {
        name: String,
        min: f64,
        max: Option<f64>,
    },
    /// Assert that simulation finishes within time
    MaxDuration { time: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"
name = "single loss"
description = "first data packet is dropped once"

[config]
seed = 7

[protocol]
window_size = 4
seq_space = 8

[[actions]]
type = "app_send"
time = 0
data = "hello"

[[actions]]
type = "drop_next_from_sender_seq"
seq = 0

[[assertions]]
type = "delivered_in_order"

[[assertions]]
type = "metric_range"
name = "packets_resent"
min = 1.0
"#;

    #[test]
    fn parses_a_toml_scenario() {
        let scenario: TestScenario = toml::from_str(SCENARIO).unwrap();
        assert_eq!(scenario.name, "single loss");
        assert_eq!(scenario.actions.len(), 2);
        assert!(matches!(
            scenario.actions[1],
            TestAction::DropNextFromSenderSeq { seq: 0 }
        ));
        assert!(matches!(
            scenario.assertions[1],
            TestAssertion::MetricRange { max: None, .. }
        ));

        let mut sim = SimConfig::default();
        scenario.config.apply_to(&mut sim);
        assert_eq!(sim.seed, 7);
        assert_eq!(sim.loss_rate, 0.0);

        let protocol = scenario
            .protocol
            .apply_to(ProtocolConfig::default())
            .unwrap();
        assert_eq!(protocol.window_size(), 4);
        assert_eq!(protocol.seq_space(), 8);
        assert_eq!(protocol.rtt(), crate::config::RTT);
    }

    #[test]
    fn protocol_override_is_revalidated() {
        let bad = ProtocolConfigOverride {
            window_size: Some(8),
            ..Default::default()
        };
        assert!(bad.apply_to(ProtocolConfig::default()).is_err());
    }
}
