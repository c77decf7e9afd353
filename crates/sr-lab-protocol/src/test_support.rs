use std::collections::BTreeSet;

use sr_lab_abstract::{Packet, SystemContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerCommand {
    Start(u64, u32),
    Cancel(u32),
}

/// Context double that records everything a role asks of it.
#[derive(Default)]
pub struct RecordingContext {
    pub sent: Vec<Packet>,
    pub timer_commands: Vec<TimerCommand>,
    pub delivered: Vec<Vec<u8>>,
    pub logs: Vec<String>,
    pub metrics: Vec<(String, f64)>,
    pub now: u64,
}

impl RecordingContext {
    /// Timer ids that are started and not cancelled since.
    pub fn armed_timers(&self) -> Vec<u32> {
        let mut armed = BTreeSet::new();
        for command in &self.timer_commands {
            match *command {
                TimerCommand::Start(_, id) => {
                    armed.insert(id);
                }
                TimerCommand::Cancel(id) => {
                    armed.remove(&id);
                }
            }
        }
        armed.into_iter().collect()
    }

    /// Latest recorded value of a metric.
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|&(_, v)| v)
    }
}

impl SystemContext for RecordingContext {
    fn send_packet(&mut self, packet: Packet) {
        self.sent.push(packet);
    }

    fn start_timer(&mut self, delay: u64, timer_id: u32) {
        self.timer_commands.push(TimerCommand::Start(delay, timer_id));
    }

    fn cancel_timer(&mut self, timer_id: u32) {
        self.timer_commands.push(TimerCommand::Cancel(timer_id));
    }

    fn deliver_data(&mut self, data: &[u8]) {
        self.delivered.push(data.to_vec());
    }

    fn log(&mut self, message: &str) {
        self.logs.push(message.to_string());
    }

    fn now(&self) -> u64 {
        self.now
    }

    fn record_metric(&mut self, name: &str, value: f64) {
        self.metrics.push((name.to_string(), value));
    }
}
