//! Runs the TOML scenarios shipped in `scenarios/` through the scenario runner.

use arq_lab_abstract::{TestAssertion, TestScenario};
use arq_lab_protocol::{Receiver, Sender};
use arq_lab_simulator::ScenarioError;
use arq_lab_simulator::scenario_runner::{
    horizon, load_scenario, receiver_config, run_scenario, sender_config,
};
use std::path::PathBuf;

fn scenario_path(file: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../scenarios")
        .join(file)
}

fn run(scenario: &TestScenario) -> anyhow::Result<arq_lab_simulator::SimulationReport> {
    let sender = Sender::new(sender_config(scenario));
    let receiver = Receiver::new(receiver_config(scenario));
    run_scenario(scenario, sender, receiver)
}

#[test]
fn shipped_scenarios_pass() {
    for file in [
        "scenario_a_clean_link.toml",
        "scenario_b_lost_ack.toml",
        "unreachable_peer.toml",
        "noisy_link.toml",
    ] {
        let scenario = load_scenario(&scenario_path(file)).unwrap();
        if let Err(err) = run(&scenario) {
            panic!("{file}: {err:#}");
        }
    }
}

#[test]
fn lost_ack_scenario_reports_one_timeout() {
    let scenario = load_scenario(&scenario_path("scenario_b_lost_ack.toml")).unwrap();
    let report = run(&scenario).unwrap();

    assert_eq!(report.sender.timers_fired, 1);
    assert_eq!(report.metric_values("attempts")[2], 2.0);
    assert!(
        report
            .link_events
            .iter()
            .any(|e| e.description.contains("DROP (deterministic) Receiver frame #3"))
    );
}

#[test]
fn failing_assertion_is_reported() {
    let mut scenario = load_scenario(&scenario_path("scenario_a_clean_link.toml")).unwrap();
    scenario.assertions = vec![
        TestAssertion::TimeoutCount { min: 1, max: None },
        TestAssertion::PacketsAcked { count: 10 },
    ];

    let err = run(&scenario).unwrap_err();
    let err = err.downcast::<ScenarioError>().unwrap();
    match err {
        ScenarioError::AssertionsFailed { scenario, failures } => {
            assert_eq!(scenario, "clean-link");
            assert_eq!(failures, vec!["timeouts = 0, expected at least 1".to_string()]);
        }
    }
}

#[test]
fn missing_scenario_file_is_an_error() {
    let err = load_scenario(&scenario_path("does_not_exist.toml")).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to read scenario file"));
}

#[test]
fn scenario_without_duration_or_stops_ends_at_default_stop() {
    let scenario: TestScenario = toml::from_str(
        r#"
            name = "dead-link"

            [config]
            loss_rate = 1.0

            [[assertions]]
            type = "max_duration"
            ms = 20000
        "#,
    )
    .unwrap();
    assert_eq!(horizon(&scenario), 20_000);

    let report = run(&scenario).unwrap();
    // Sender starts at 1 s and times out every second until both stop at 20 s.
    assert_eq!(report.duration_ms, 20_000);
    assert_eq!(report.sender.timers_fired, 18);
    assert_eq!(report.sender.frames_sent, 19);
}

#[test]
fn horizon_falls_back_to_last_stop_action() {
    let scenario: TestScenario = toml::from_str(
        r#"
            name = "early-stop"

            [[actions]]
            type = "stop"
            node = "receiver"
            time = 3000

            [[actions]]
            type = "stop"
            node = "sender"
            time = 4500
        "#,
    )
    .unwrap();
    assert_eq!(horizon(&scenario), 4500);

    let with_duration = TestScenario {
        duration_ms: Some(100),
        ..scenario
    };
    assert_eq!(horizon(&with_duration), 100);
}
