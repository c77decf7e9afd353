pub mod engine;
pub mod scenario_runner;
pub mod trace;

pub use engine::{LinkEventSummary, NodeId, Simulator};
pub use scenario_runner::{AssertionResult, ScenarioOutcome};
pub use trace::SimulationReport;
