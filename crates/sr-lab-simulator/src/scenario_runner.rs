//! Load a TOML scenario, run it and grade its assertions.

use anyhow::{Context, Result};
use serde::Serialize;
use sr_lab_abstract::{
    Message, ProtocolConfig, SimConfig, TestAction, TestAssertion, TestScenario,
    TransportProtocol, trim_padding,
};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::engine::Simulator;
use crate::trace::SimulationReport;

/// Builds a sender/receiver pair for the protocol constants a scenario asks for.
pub type ProtocolFactory =
    dyn FnOnce(ProtocolConfig) -> (Box<dyn TransportProtocol>, Box<dyn TransportProtocol>);

#[derive(Debug, Clone, Serialize)]
pub struct AssertionResult {
    pub assertion: String,
    pub passed: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioOutcome {
    pub name: String,
    pub report: SimulationReport,
    pub results: Vec<AssertionResult>,
}

impl ScenarioOutcome {
    pub fn passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }
}

pub fn load_scenario(path: &Path) -> Result<TestScenario> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
    let scenario: TestScenario = toml::from_str(&content)
        .with_context(|| format!("Failed to parse scenario file {}", path.display()))?;
    Ok(scenario)
}

/// Read the scenario at `path` and run it.
pub fn run_scenario_file(
    path: &Path,
    channel: &SimConfig,
    protocol: ProtocolConfig,
    factory: Box<ProtocolFactory>,
) -> Result<ScenarioOutcome> {
    let scenario = load_scenario(path)?;
    run_scenario(&scenario, channel, protocol, factory)
}

/// Run `scenario` to completion and evaluate every assertion.
///
/// `channel` and `protocol` supply whatever the scenario does not override,
/// including the time limit that bounds the run.
pub fn run_scenario(
    scenario: &TestScenario,
    channel: &SimConfig,
    protocol: ProtocolConfig,
    factory: Box<ProtocolFactory>,
) -> Result<ScenarioOutcome> {
    let mut sim = build_simulator(scenario, channel, protocol, factory)?;
    info!("Running scenario '{}': {}", scenario.name, scenario.description);
    sim.run_until_complete();
    let report = sim.export_report();

    let results: Vec<AssertionResult> = scenario
        .assertions
        .iter()
        .map(|assertion| evaluate(assertion, &report))
        .collect();

    for result in &results {
        if result.passed {
            info!("PASS {} ({})", result.assertion, result.detail);
        } else {
            warn!("FAIL {} ({})", result.assertion, result.detail);
        }
    }

    Ok(ScenarioOutcome {
        name: scenario.name.clone(),
        report,
        results,
    })
}

/// Apply the scenario's overrides and actions to a fresh simulator.
pub fn build_simulator(
    scenario: &TestScenario,
    channel: &SimConfig,
    protocol: ProtocolConfig,
    factory: Box<ProtocolFactory>,
) -> Result<Simulator> {
    let mut config = channel.clone();
    scenario.config.apply_to(&mut config);
    config
        .validate()
        .with_context(|| format!("Invalid channel config in scenario '{}'", scenario.name))?;
    let protocol = scenario
        .protocol
        .apply_to(protocol)
        .with_context(|| format!("Invalid protocol config in scenario '{}'", scenario.name))?;

    let (sender, receiver) = factory(protocol);
    let mut sim = Simulator::new(config, sender, receiver);
    configure_actions(&mut sim, &scenario.actions)?;
    Ok(sim)
}

pub fn configure_actions(sim: &mut Simulator, actions: &[TestAction]) -> Result<()> {
    for action in actions {
        match action {
            TestAction::AppSend { time, data } => {
                let message = Message::from_bytes(data.as_bytes())
                    .with_context(|| format!("app_send at {time} carries {data:?}"))?;
                sim.schedule_app_send(*time, message);
            }
            TestAction::DropNextFromSenderSeq { seq } => {
                sim.add_drop_sender_seq_once(*seq);
            }
            TestAction::DropNextFromReceiverAck { ack } => {
                sim.add_drop_receiver_ack_once(*ack);
            }
            TestAction::CorruptNextFromSenderSeq { seq } => {
                sim.add_corrupt_sender_seq_once(*seq);
            }
        }
    }
    Ok(())
}

pub fn evaluate(assertion: &TestAssertion, report: &SimulationReport) -> AssertionResult {
    let (name, passed, detail) = match assertion {
        TestAssertion::DataDelivered { data } => {
            let found = report
                .delivered_data
                .iter()
                .any(|d| trim_padding(d) == data.as_bytes());
            (
                format!("data_delivered {data:?}"),
                found,
                format!("{} payloads delivered", report.delivered_data.len()),
            )
        }
        TestAssertion::DeliveredInOrder => (
            "delivered_in_order".to_string(),
            report.delivered_in_order(),
            format!(
                "{} sent, {} accepted, {} delivered",
                report.app_messages.len(),
                report.accepted_messages.len(),
                report.delivered_data.len()
            ),
        ),
        TestAssertion::SenderPacketCount { min, max } => {
            let count = report.sender_packet_count;
            (
                format!("sender_packet_count in [{min}, {}]", fmt_max(*max)),
                count >= *min && max.is_none_or(|m| count <= m),
                format!("{count} packets"),
            )
        }
        TestAssertion::MetricRange { name, min, max } => {
            let value = report.final_metric(name).unwrap_or(0.0);
            (
                format!("metric {name} in [{min}, {}]", fmt_max(*max)),
                value >= *min && max.is_none_or(|m| value <= m),
                format!("{name} = {value}"),
            )
        }
        TestAssertion::MaxDuration { time } => (
            format!("max_duration {time}"),
            report.duration <= *time,
            format!("finished at {}", report.duration),
        ),
    };
    AssertionResult {
        assertion: name,
        passed,
        detail,
    }
}

fn fmt_max<T: std::fmt::Display>(max: Option<T>) -> String {
    max.map_or_else(|| "inf".to_string(), |m| m.to_string())
}
