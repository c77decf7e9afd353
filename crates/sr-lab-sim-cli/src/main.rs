use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sr_lab_abstract::{Message, PAYLOAD_SIZE, ProtocolConfig, SimConfig};
use sr_lab_protocol::{receiver, sender};
use sr_lab_simulator::scenario_runner::{self, ScenarioOutcome};
use sr_lab_simulator::{SimulationReport, Simulator};

#[derive(Parser, Debug)]
#[command(author, version, about = "Selective-Repeat ARQ over an emulated lossy link")]
struct Args {
    /// Run a TOML scenario and grade its assertions instead of the generated workload.
    /// Channel flags other than --time-limit are ignored; the scenario sets its own.
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Number of application messages to generate.
    #[arg(long, default_value_t = 20)]
    messages: usize,

    /// Simulated time between two generated messages.
    #[arg(long, default_value_t = 5)]
    interval: u64,

    /// Probability that the channel loses a packet.
    #[arg(long, default_value_t = 0.1)]
    loss: f64,

    /// Probability that the channel corrupts a packet.
    #[arg(long, default_value_t = 0.1)]
    corrupt: f64,

    /// Shortest one-way channel delay.
    #[arg(long, default_value_t = 2)]
    min_latency: u64,

    /// Longest one-way channel delay.
    #[arg(long, default_value_t = 6)]
    max_latency: u64,

    /// Seed for the channel's loss, corruption and delay draws.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Stop the run at this simulated time even if events remain.
    /// Also applies to scenarios that set no limit of their own.
    #[arg(long, default_value_t = sr_lab_abstract::config::TIME_LIMIT)]
    time_limit: u64,

    /// Maximum number of unacknowledged packets in flight.
    #[arg(long, default_value_t = sr_lab_abstract::config::WINDOW_SIZE)]
    window_size: usize,

    /// Size of the sequence number space, at least twice the window.
    #[arg(long, default_value_t = sr_lab_abstract::config::SEQ_SPACE)]
    seq_space: usize,

    /// Retransmission timeout.
    #[arg(long, default_value_t = sr_lab_abstract::config::RTT)]
    rtt: u64,

    /// Write a JSON trace of the finished simulation.
    #[arg(long)]
    trace_out: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();
    info!("sr-lab-sim starting…");

    let protocol = ProtocolConfig::new(args.window_size, args.seq_space, args.rtt)
        .context("Invalid protocol configuration")?;

    let mut outcome = None;
    let report = if let Some(path) = &args.scenario {
        let channel = SimConfig {
            time_limit: Some(args.time_limit),
            ..Default::default()
        };
        let graded = scenario_runner::run_scenario_file(
            path,
            &channel,
            protocol,
            Box::new(|config| (sender(config), receiver(config))),
        )?;
        let report = graded.report.clone();
        outcome = Some(graded);
        report
    } else {
        run_default_sim(&args, protocol)?
    };
    log_summary(&report);

    if let Some(trace_path) = &args.trace_out {
        write_trace(trace_path, &report)?;
    }

    if let Some(outcome) = &outcome {
        finish_scenario(outcome)?;
    }

    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run_default_sim(args: &Args, protocol: ProtocolConfig) -> Result<SimulationReport> {
    let config = SimConfig {
        loss_rate: args.loss,
        corrupt_rate: args.corrupt,
        min_latency: args.min_latency,
        max_latency: args.max_latency,
        seed: args.seed,
        time_limit: Some(args.time_limit),
    };
    config.validate().context("Invalid channel configuration")?;

    let mut sim = Simulator::new(config, sender(protocol), receiver(protocol));
    for i in 0..args.messages {
        sim.schedule_app_send(i as u64 * args.interval, generated_message(i));
    }

    info!(
        "Sending {} messages (window {}, seq space {}, rtt {})",
        args.messages,
        protocol.window_size(),
        protocol.seq_space(),
        protocol.rtt()
    );
    sim.run_until_complete();
    info!("Simulation complete.");
    Ok(sim.export_report())
}

/// Message `i` is twenty copies of one lowercase letter, cycling through the alphabet.
fn generated_message(i: usize) -> Message {
    Message::new([b'a' + (i % 26) as u8; PAYLOAD_SIZE])
}

fn finish_scenario(outcome: &ScenarioOutcome) -> Result<()> {
    let failed = outcome.results.iter().filter(|r| !r.passed).count();
    if failed > 0 {
        anyhow::bail!(
            "scenario '{}' failed {} of {} assertions",
            outcome.name,
            failed,
            outcome.results.len()
        );
    }
    info!(
        "scenario '{}' passed all {} assertions",
        outcome.name,
        outcome.results.len()
    );
    Ok(())
}

fn log_summary(report: &SimulationReport) {
    info!(
        "Simulated time: {} | packets sent: {} by sender, {} by receiver | deliveries: {}",
        report.duration,
        report.sender_packet_count,
        report.receiver_packet_count,
        report.delivered_data.len()
    );
    for (name, value) in &report.final_metrics {
        if name != "send_window" {
            info!("  {name}: {value}");
        }
    }
    if !report.delivered_in_order() {
        warn!("delivered data does not match the accepted messages");
    }
}

fn write_trace(path: &Path, report: &SimulationReport) -> Result<()> {
    let data = serde_json::to_vec_pretty(report).context("Failed to serialize simulation trace")?;
    fs::write(path, &data)
        .with_context(|| format!("Failed to write trace file {}", path.display()))?;
    Ok(())
}
