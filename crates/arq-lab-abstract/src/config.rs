use crate::packet::{DATA_PAYLOAD_SIZE, Endpoint, NodeId};
use serde::{Deserialize, Serialize};

/// Fault and latency model of the simulated link.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Probability that a frame is silently dropped.
    pub loss_rate: f64,
    /// Probability that a delivered frame is delivered a second time.
    pub duplicate_rate: f64,
    /// One-way latency bounds in ms. A spread lets later frames overtake earlier ones.
    pub min_latency: u64,
    pub max_latency: u64,
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            duplicate_rate: 0.0,
            min_latency: 2,
            max_latency: 2,
            seed: 0,
        }
    }
}

/// Port the receiver listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// Destination of every data frame.
    pub peer: Endpoint,
    /// Retransmission timeout in ms. Fixed, no backoff.
    pub timeout_ms: u64,
    pub total_packets: u32,
    pub payload_size: usize,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            peer: Endpoint::new(NodeId::Receiver.address(), DEFAULT_PORT),
            timeout_ms: 1000,
            total_packets: 10,
            payload_size: DATA_PAYLOAD_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    pub local: Endpoint,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            local: Endpoint::any(DEFAULT_PORT),
        }
    }
}
