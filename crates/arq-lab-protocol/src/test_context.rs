//! Hand-driven [`NodeContext`] for exercising the state machines without a simulator.

use arq_lab_abstract::{
    Channel, ChannelError, Clock, Endpoint, Frame, NodeContext, NodeId, TimerHandle,
};
use std::collections::BTreeMap;

pub struct ManualContext {
    pub node: NodeId,
    pub now: u64,
    pub bound: Option<Endpoint>,
    pub closed: bool,
    pub sent: Vec<(Frame, Endpoint)>,
    /// Pending timers and their deadlines.
    pub armed: BTreeMap<TimerHandle, u64>,
    pub cancelled: Vec<TimerHandle>,
    pub logs: Vec<String>,
    pub metrics: Vec<(String, f64)>,
    next_timer: u64,
}

impl ManualContext {
    pub fn new(node: NodeId) -> Self {
        Self {
            node,
            now: 0,
            bound: None,
            closed: false,
            sent: Vec::new(),
            armed: BTreeMap::new(),
            cancelled: Vec::new(),
            logs: Vec::new(),
            metrics: Vec::new(),
            next_timer: 0,
        }
    }

    /// Pop the earliest armed timer and advance the clock to its deadline.
    pub fn expire_next(&mut self) -> Option<TimerHandle> {
        let (&handle, &deadline) = self.armed.iter().min_by_key(|(h, d)| (**d, **h))?;
        self.armed.remove(&handle);
        self.now = self.now.max(deadline);
        Some(handle)
    }

    pub fn metric(&self, name: &str) -> Vec<f64> {
        self.metrics
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| *v)
            .collect()
    }
}

impl Channel for ManualContext {
    fn bind(&mut self, local: Endpoint) -> Result<Endpoint, ChannelError> {
        if self.bound.is_some() {
            return Err(ChannelError::AlreadyOpen(self.node));
        }
        let resolved = if local.is_unspecified() {
            Endpoint::new(self.node.address(), local.port)
        } else {
            local
        };
        self.bound = Some(resolved);
        self.closed = false;
        Ok(resolved)
    }

    fn connect(&mut self, _peer: Endpoint) -> Result<Endpoint, ChannelError> {
        self.bind(Endpoint::any(49153))
    }

    fn close(&mut self) {
        self.bound = None;
        self.closed = true;
    }

    fn send_frame(&mut self, frame: Frame, to: Endpoint) {
        self.sent.push((frame, to));
    }
}

impl Clock for ManualContext {
    fn now(&self) -> u64 {
        self.now
    }

    fn schedule_after(&mut self, delay_ms: u64) -> TimerHandle {
        let handle = TimerHandle(self.next_timer);
        self.next_timer += 1;
        self.armed.insert(handle, self.now.saturating_add(delay_ms));
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.armed.remove(&handle);
        self.cancelled.push(handle);
    }
}

impl NodeContext for ManualContext {
    fn log(&mut self, message: &str) {
        self.logs.push(message.to_string());
    }

    fn record_metric(&mut self, name: &str, value: f64) {
        self.metrics.push((name.to_string(), value));
    }
}
