use crate::config::{ReceiverConfig, SenderConfig, SimConfig};
use crate::packet::{Endpoint, NodeId};
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct TestScenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub config: SimConfigOverride,
    #[serde(default)]
    pub sender: SenderConfigOverride,
    #[serde(default)]
    pub receiver: ReceiverConfigOverride,
    /// Simulated time at which the run is cut off.
    /// Without it the run ends at the last scheduled stop.
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub actions: Vec<TestAction>,
    #[serde(default)]
    pub assertions: Vec<TestAssertion>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct SimConfigOverride {
    pub loss_rate: Option<f64>,
    pub duplicate_rate: Option<f64>,
    pub min_latency: Option<u64>,
    pub max_latency: Option<u64>,
    pub seed: Option<u64>,
}

impl SimConfigOverride {
    pub fn apply_to(&self, config: &mut SimConfig) {
        if let Some(v) = self.loss_rate {
            config.loss_rate = v;
        }
        if let Some(v) = self.duplicate_rate {
            config.duplicate_rate = v;
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
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct SenderConfigOverride {
    pub peer: Option<Endpoint>,
    pub timeout_ms: Option<u64>,
    pub total_packets: Option<u32>,
    pub payload_size: Option<usize>,
}

impl SenderConfigOverride {
    pub fn apply_to(&self, config: &mut SenderConfig) {
        if let Some(v) = self.peer {
            config.peer = v;
        }
        if let Some(v) = self.timeout_ms {
            config.timeout_ms = v;
        }
        if let Some(v) = self.total_packets {
            config.total_packets = v;
        }
        if let Some(v) = self.payload_size {
            config.payload_size = v;
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct ReceiverConfigOverride {
    pub local: Option<Endpoint>,
}

impl ReceiverConfigOverride {
    pub fn apply_to(&self, config: &mut ReceiverConfig) {
        if let Some(v) = self.local {
            config.local = v;
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAction {
    /// Start the application on `node` at `time`
    Start { node: NodeId, time: u64 },
    /// Stop the application on `node` at `time`
    Stop { node: NodeId, time: u64 },
    /// Deterministically drop the `nth` frame (1-based) emitted by `node`
    DropNthFrom { node: NodeId, nth: u32 },
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAssertion {
    /// Number of frames emitted by `node` is within range
    FrameCount {
        node: NodeId,
        min: u32,
        max: Option<u32>,
    },
    /// Number of frames delivered to `node` is within range
    DeliveredCount {
        node: NodeId,
        min: u32,
        max: Option<u32>,
    },
    /// Number of retransmission timeouts that fired is within range
    TimeoutCount { min: u32, max: Option<u32> },
    /// Sender ended with exactly this many acknowledged packets
    PacketsAcked { count: u32 },
    /// Packet number `packet` (1-based) took exactly `count` transmissions
    AttemptsForPacket { packet: u32, count: u32 },
    /// Receiver emitted one ack per frame it was handed
    AcksMatchArrivals,
    /// Last event happened no later than `ms`
    MaxDuration { ms: u64 },
}
