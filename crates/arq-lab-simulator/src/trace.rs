use arq_lab_abstract::{NodeId, SimConfig};
use serde::Serialize;
use std::collections::HashMap;

/// A compact textual summary of important link-layer events.
#[derive(Debug, Clone, Serialize)]
pub struct LinkEventSummary {
    pub time: u64,
    pub description: String,
}

/// Per-node traffic counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct NodeStats {
    /// Frames the node handed to the channel, including ones the channel dropped.
    pub frames_sent: u32,
    /// Frames delivered to the node's application.
    pub frames_delivered: u32,
    /// Timers that expired without being cancelled.
    pub timers_fired: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub config: SimConfig,
    pub duration_ms: u64,
    pub sender: NodeStats,
    pub receiver: NodeStats,
    pub frames_dropped: u32,
    pub frames_duplicated: u32,
    /// Frames that arrived at an endpoint nobody had bound.
    pub frames_unreachable: u32,
    /// Applications that failed to start.
    pub failures: Vec<String>,
    pub metrics: HashMap<String, Vec<(u64, f64)>>,
    pub link_events: Vec<LinkEventSummary>,
}

impl SimulationReport {
    pub fn node(&self, node: NodeId) -> &NodeStats {
        match node {
            NodeId::Sender => &self.sender,
            NodeId::Receiver => &self.receiver,
        }
    }

    /// Values of a metric in recording order.
    pub fn metric_values(&self, name: &str) -> Vec<f64> {
        self.metrics
            .get(name)
            .map(|series| series.iter().map(|(_, v)| *v).collect())
            .unwrap_or_default()
    }

    pub fn last_metric(&self, name: &str) -> Option<f64> {
        self.metrics
            .get(name)
            .and_then(|series| series.last())
            .map(|(_, v)| *v)
    }
}
