use anyhow::{Context, Result};
use arq_lab_abstract::{NodeId, ReceiverConfig, SenderConfig, SimConfig};
use arq_lab_protocol::{Receiver, Sender};
use arq_lab_simulator::scenario_runner::{self, load_scenario};
use arq_lab_simulator::{RECEIVER_START_MS, SENDER_START_MS, STOP_MS, SimulationReport, Simulator};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Stop-and-wait ARQ over a simulated lossy link")]
struct Args {
    /// Load a scenario from disk; its assertions are checked after the run.
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Retransmission timeout in ms.
    #[arg(long, default_value_t = 1000)]
    timeout_ms: u64,

    /// Number of packets the sender transmits.
    #[arg(long, default_value_t = 10)]
    packets: u32,

    /// Payload size of each data frame in bytes.
    #[arg(long, default_value_t = arq_lab_abstract::DATA_PAYLOAD_SIZE)]
    payload_size: usize,

    /// Port the receiver listens on.
    #[arg(long, default_value_t = arq_lab_abstract::DEFAULT_PORT)]
    port: u16,

    /// One-way link latency in ms (lower bound when --max-latency is given).
    #[arg(long, default_value_t = 2)]
    latency_ms: u64,

    /// Upper bound of a uniformly drawn one-way latency in ms.
    #[arg(long)]
    max_latency_ms: Option<u64>,

    /// Probability that a frame is lost.
    #[arg(long, default_value_t = 0.0)]
    loss_rate: f64,

    /// Probability that a frame is delivered twice.
    #[arg(long, default_value_t = 0.0)]
    duplicate_rate: f64,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Drop the nth data frame emitted by the sender, once. Repeatable.
    #[arg(long = "drop-data")]
    drop_data: Vec<u32>,

    /// Drop the nth ack emitted by the receiver, once. Repeatable.
    #[arg(long = "drop-ack")]
    drop_ack: Vec<u32>,

    /// Simulated time at which both applications stop and the run ends.
    #[arg(long, default_value_t = STOP_MS)]
    stop_ms: u64,

    /// Write a JSON trace of the finished simulation.
    #[arg(long)]
    trace_out: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging();
    info!("arq-lab-sim starting…");

    let report = match &args.scenario {
        Some(path) => run_scenario_file(path)?,
        None => run_default_sim(&args),
    };
    log_summary(&report);

    if let Some(trace_path) = &args.trace_out {
        write_trace(trace_path, &report)?;
    }

    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

impl Args {
    fn sim_config(&self) -> SimConfig {
        SimConfig {
            loss_rate: self.loss_rate,
            duplicate_rate: self.duplicate_rate,
            min_latency: self.latency_ms,
            max_latency: self.max_latency_ms.unwrap_or(self.latency_ms),
            seed: self.seed,
        }
    }

    fn sender_config(&self) -> SenderConfig {
        let mut config = SenderConfig {
            timeout_ms: self.timeout_ms,
            total_packets: self.packets,
            payload_size: self.payload_size,
            ..SenderConfig::default()
        };
        config.peer.port = self.port;
        config
    }

    fn receiver_config(&self) -> ReceiverConfig {
        let mut config = ReceiverConfig::default();
        config.local.port = self.port;
        config
    }
}

fn run_default_sim(args: &Args) -> SimulationReport {
    let mut sim = Simulator::new(
        args.sim_config(),
        Sender::new(args.sender_config()),
        Receiver::new(args.receiver_config()),
    );
    for &nth in &args.drop_data {
        sim.add_drop_nth_from(NodeId::Sender, nth);
    }
    for &nth in &args.drop_ack {
        sim.add_drop_nth_from(NodeId::Receiver, nth);
    }
    sim.schedule_start(NodeId::Receiver, RECEIVER_START_MS);
    sim.schedule_start(NodeId::Sender, SENDER_START_MS);
    sim.schedule_stop(NodeId::Sender, args.stop_ms);
    sim.schedule_stop(NodeId::Receiver, args.stop_ms);

    info!("Starting headless simulation…");
    sim.run_until(args.stop_ms);
    info!(
        "Simulation complete: {}/{} packets acknowledged, {} retransmissions",
        sim.sender.packets_sent(),
        sim.sender.total_to_send(),
        sim.sender.retransmissions()
    );
    sim.export_report()
}

fn run_scenario_file(path: &Path) -> Result<SimulationReport> {
    let scenario = load_scenario(path)?;
    let sender = Sender::new(scenario_runner::sender_config(&scenario));
    let receiver = Receiver::new(scenario_runner::receiver_config(&scenario));
    scenario_runner::run_scenario(&scenario, sender, receiver)
        .with_context(|| format!("Scenario {} failed", path.display()))
}

fn log_summary(report: &SimulationReport) {
    info!(
        "Simulation duration: {} ms | sender frames: {} | acks: {} | timeouts: {} | dropped: {}",
        report.duration_ms,
        report.sender.frames_sent,
        report.receiver.frames_sent,
        report.sender.timers_fired,
        report.frames_dropped
    );
    for failure in &report.failures {
        info!("Start failure: {}", failure);
    }
}

fn write_trace(path: &Path, report: &SimulationReport) -> Result<()> {
    let data = serde_json::to_vec_pretty(report).context("Failed to serialize simulation trace")?;
    fs::write(path, &data)
        .with_context(|| format!("Failed to write trace file {}", path.display()))?;
    Ok(())
}
