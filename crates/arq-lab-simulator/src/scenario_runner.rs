//! Load TOML scenarios, run them and check their assertions.

use crate::engine::{RECEIVER_START_MS, SENDER_START_MS, STOP_MS, Simulator};
use crate::trace::SimulationReport;
use anyhow::{Context, Result};
use arq_lab_abstract::{
    Application, NodeId, ReceiverConfig, SenderConfig, SimConfig, TestAction, TestAssertion,
    TestScenario,
};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("scenario '{scenario}' failed {} assertion(s): {}", .failures.len(), .failures.join("; "))]
    AssertionsFailed {
        scenario: String,
        failures: Vec<String>,
    },
}

pub fn load_scenario(path: &Path) -> Result<TestScenario> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
    let scenario: TestScenario = toml::from_str(&content)
        .with_context(|| format!("Failed to parse scenario file {}", path.display()))?;
    Ok(scenario)
}

/// Sender configuration with the scenario's overrides applied.
pub fn sender_config(scenario: &TestScenario) -> SenderConfig {
    let mut config = SenderConfig::default();
    scenario.sender.apply_to(&mut config);
    config
}

pub fn receiver_config(scenario: &TestScenario) -> ReceiverConfig {
    let mut config = ReceiverConfig::default();
    scenario.receiver.apply_to(&mut config);
    config
}

fn last_stop(scenario: &TestScenario) -> Option<u64> {
    scenario
        .actions
        .iter()
        .filter_map(|action| match action {
            TestAction::Stop { time, .. } => Some(*time),
            _ => None,
        })
        .max()
}

/// Simulated time at which `scenario` is cut off: its `duration_ms`, else
/// its last `stop` action, else the default stop time.
pub fn horizon(scenario: &TestScenario) -> u64 {
    scenario
        .duration_ms
        .or_else(|| last_stop(scenario))
        .unwrap_or(STOP_MS)
}

/// Build a simulator for `scenario` with the given applications.
///
/// Without explicit `start` actions the receiver starts at 0 s and the sender
/// at 1 s. Without explicit `stop` actions both stop at 20 s.
pub fn build_simulator<S: Application, R: Application>(
    scenario: &TestScenario,
    sender: S,
    receiver: R,
) -> Simulator<S, R> {
    let mut config = SimConfig::default();
    scenario.config.apply_to(&mut config);
    let mut sim = Simulator::new(config, sender, receiver);

    let has_start = scenario
        .actions
        .iter()
        .any(|action| matches!(action, TestAction::Start { .. }));
    if !has_start {
        sim.schedule_start(NodeId::Receiver, RECEIVER_START_MS);
        sim.schedule_start(NodeId::Sender, SENDER_START_MS);
    }
    if last_stop(scenario).is_none() {
        sim.schedule_stop(NodeId::Sender, STOP_MS);
        sim.schedule_stop(NodeId::Receiver, STOP_MS);
    }

    for action in &scenario.actions {
        match action {
            TestAction::Start { node, time } => sim.schedule_start(*node, *time),
            TestAction::Stop { node, time } => sim.schedule_stop(*node, *time),
            TestAction::DropNthFrom { node, nth } => sim.add_drop_nth_from(*node, *nth),
        }
    }
    sim
}

/// Run `scenario` to its horizon and check every assertion against the report.
pub fn run_scenario<S: Application, R: Application>(
    scenario: &TestScenario,
    sender: S,
    receiver: R,
) -> Result<SimulationReport> {
    let mut sim = build_simulator(scenario, sender, receiver);
    let deadline = horizon(scenario);
    info!("Running scenario '{}' until {} ms", scenario.name, deadline);
    sim.run_until(deadline);
    let report = sim.export_report();
    check_assertions(scenario, &report)?;
    info!("Scenario '{}' passed", scenario.name);
    Ok(report)
}

pub fn check_assertions(
    scenario: &TestScenario,
    report: &SimulationReport,
) -> Result<(), ScenarioError> {
    let failures: Vec<String> = scenario
        .assertions
        .iter()
        .filter_map(|assertion| check(assertion, report).err())
        .collect();

    if failures.is_empty() {
        Ok(())
    } else {
        Err(ScenarioError::AssertionsFailed {
            scenario: scenario.name.clone(),
            failures,
        })
    }
}

fn in_range(what: &str, actual: u32, min: u32, max: Option<u32>) -> Result<(), String> {
    let upper_ok = max.is_none_or(|max| actual <= max);
    if actual >= min && upper_ok {
        Ok(())
    } else {
        Err(match max {
            Some(max) => format!("{what} = {actual}, expected {min}..={max}"),
            None => format!("{what} = {actual}, expected at least {min}"),
        })
    }
}

fn check(assertion: &TestAssertion, report: &SimulationReport) -> Result<(), String> {
    match assertion {
        TestAssertion::FrameCount { node, min, max } => in_range(
            &format!("{:?} frames sent", node),
            report.node(*node).frames_sent,
            *min,
            *max,
        ),
        TestAssertion::DeliveredCount { node, min, max } => in_range(
            &format!("{:?} frames delivered", node),
            report.node(*node).frames_delivered,
            *min,
            *max,
        ),
        TestAssertion::TimeoutCount { min, max } => {
            in_range("timeouts", report.sender.timers_fired, *min, *max)
        }
        TestAssertion::PacketsAcked { count } => {
            let acked = report.last_metric("packets_sent").unwrap_or(0.0) as u32;
            if acked == *count {
                Ok(())
            } else {
                Err(format!("packets acked = {acked}, expected {count}"))
            }
        }
        TestAssertion::AttemptsForPacket { packet, count } => {
            let attempts = report.metric_values("attempts");
            let index = packet.checked_sub(1).map(|i| i as usize);
            match index.and_then(|i| attempts.get(i)) {
                Some(&actual) if actual as u32 == *count => Ok(()),
                Some(&actual) => Err(format!(
                    "packet {packet} took {actual} transmissions, expected {count}"
                )),
                None => Err(format!("packet {packet} was never acknowledged")),
            }
        }
        TestAssertion::AcksMatchArrivals => {
            let arrivals = report.receiver.frames_delivered;
            let acks = report.receiver.frames_sent;
            if arrivals == acks {
                Ok(())
            } else {
                Err(format!("receiver got {arrivals} frames but sent {acks} acks"))
            }
        }
        TestAssertion::MaxDuration { ms } => {
            if report.duration_ms <= *ms {
                Ok(())
            } else {
                Err(format!(
                    "simulation ran {} ms, limit {} ms",
                    report.duration_ms, ms
                ))
            }
        }
    }
}
