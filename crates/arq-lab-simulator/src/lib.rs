pub mod engine;
pub mod scenario_runner;
pub mod sockets;
pub mod trace;

pub use engine::{RECEIVER_START_MS, SENDER_START_MS, STOP_MS, Simulator};
pub use scenario_runner::ScenarioError;
pub use trace::{LinkEventSummary, NodeStats, SimulationReport};
