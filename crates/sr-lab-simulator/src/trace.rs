use serde::Serialize;
use sr_lab_abstract::{Message, SimConfig};
use std::collections::{BTreeMap, HashMap};

use crate::engine::LinkEventSummary;

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub config: SimConfig,
    pub duration: u64,
    pub app_messages: Vec<Message>,
    pub accepted_messages: Vec<Message>,
    pub delivered_data: Vec<Vec<u8>>,
    pub sender_packet_count: u32,
    pub receiver_packet_count: u32,
    pub metrics: HashMap<String, Vec<(u64, f64)>>,
    pub final_metrics: BTreeMap<String, f64>,
    pub link_events: Vec<LinkEventSummary>,
}

impl SimulationReport {
    pub fn final_metric(&self, name: &str) -> Option<f64> {
        self.final_metrics.get(name).copied()
    }

    /// `true` when the delivered payloads are exactly the messages the sender
    /// accepted, in order, each once. Messages refused with a full window are
    /// expected to be missing.
    pub fn delivered_in_order(&self) -> bool {
        self.delivered_data.len() == self.accepted_messages.len()
            && self
                .delivered_data
                .iter()
                .zip(&self.accepted_messages)
                .all(|(data, msg)| data[..] == msg.data[..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(accepted: &[u8], delivered: &[u8]) -> SimulationReport {
        let accepted: Vec<Message> = accepted.iter().map(|&b| Message::new([b; 20])).collect();
        SimulationReport {
            config: SimConfig::default(),
            duration: 0,
            app_messages: accepted.clone(),
            accepted_messages: accepted,
            delivered_data: delivered.iter().map(|&b| vec![b; 20]).collect(),
            sender_packet_count: 0,
            receiver_packet_count: 0,
            metrics: HashMap::new(),
            final_metrics: BTreeMap::new(),
            link_events: Vec::new(),
        }
    }

    #[test]
    fn delivery_must_match_accepted_messages_exactly() {
        assert!(report(b"aba", b"aba").delivered_in_order());
        assert!(!report(b"aba", b"ab").delivered_in_order());
        assert!(!report(b"aba", b"baa").delivered_in_order());
    }

    #[test]
    fn duplicate_cannot_stand_in_for_a_refused_message() {
        // "b" was refused; the receiver delivered "a" twice instead
        let mut report = report(b"aa", b"aa");
        report.app_messages = vec![
            Message::new([b'a'; 20]),
            Message::new([b'b'; 20]),
            Message::new([b'a'; 20]),
        ];
        report.accepted_messages.truncate(1);
        report.final_metrics.insert("window_full".to_string(), 1.0);
        assert!(!report.delivered_in_order());
    }
}
