use crate::sockets::SocketTable;
use crate::trace::{LinkEventSummary, NodeStats, SimulationReport};
use arq_lab_abstract::{
    Application, Channel, ChannelError, Clock, Endpoint, Frame, NodeContext, NodeId, SimConfig,
    TimerHandle,
};
use rand::{Rng, SeedableRng};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use tracing::{debug, info, warn};

/// Default application schedule: the receiver listens first, the sender
/// starts a second later, both stop at 20 s.
pub const RECEIVER_START_MS: u64 = 0;
pub const SENDER_START_MS: u64 = 1000;
pub const STOP_MS: u64 = 20_000;

#[derive(Debug)]
pub enum EventType {
    Start {
        node: NodeId,
    },
    Stop {
        node: NodeId,
    },
    FrameArrival {
        to: Endpoint,
        from: Endpoint,
        frame: Frame,
    },
    TimerExpiry {
        node: NodeId,
        handle: TimerHandle,
    },
}

#[derive(Debug)]
struct Event {
    time: u64,
    event_type: EventType,
    id: u64, // Unique ID to differentiate events at same time
}

// Custom Ord for Min-Heap (smallest time pops first)
impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.id == other.id
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse comparison for time: smallest time is Greater in BinaryHeap
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.id.cmp(&self.id))
    }
}

#[derive(Debug)]
enum TimerOp {
    Arm { handle: TimerHandle, delay: u64 },
    Cancel(TimerHandle),
}

/// Actions buffered during an application callback
#[derive(Default)]
struct ActionBuffer {
    outgoing_frames: Vec<(Frame, Option<Endpoint>, Endpoint)>, // (frame, from, to)
    timer_ops: Vec<TimerOp>,
    logs: Vec<String>,
    metrics: Vec<(String, f64)>,
}

/// Context implementation passed to the application
struct ScopedContext<'a> {
    node: NodeId,
    now: u64,
    buffer: &'a mut ActionBuffer,
    sockets: &'a mut SocketTable,
    next_timer: &'a mut u64,
}

impl Channel for ScopedContext<'_> {
    fn bind(&mut self, local: Endpoint) -> Result<Endpoint, ChannelError> {
        self.sockets.bind(self.node, local)
    }

    fn connect(&mut self, _peer: Endpoint) -> Result<Endpoint, ChannelError> {
        self.sockets.connect(self.node)
    }

    fn close(&mut self) {
        self.sockets.close(self.node);
    }

    fn send_frame(&mut self, frame: Frame, to: Endpoint) {
        let from = self.sockets.local(self.node);
        self.buffer.outgoing_frames.push((frame, from, to));
    }
}

impl Clock for ScopedContext<'_> {
    fn now(&self) -> u64 {
        self.now
    }

    fn schedule_after(&mut self, delay_ms: u64) -> TimerHandle {
        let handle = TimerHandle(*self.next_timer);
        *self.next_timer += 1;
        self.buffer.timer_ops.push(TimerOp::Arm {
            handle,
            delay: delay_ms,
        });
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.buffer.timer_ops.push(TimerOp::Cancel(handle));
    }
}

impl NodeContext for ScopedContext<'_> {
    fn log(&mut self, message: &str) {
        self.buffer.logs.push(message.to_string());
    }

    fn record_metric(&mut self, name: &str, value: f64) {
        self.buffer.metrics.push((name.to_string(), value));
    }
}

enum Callback {
    Start,
    Stop,
    Frame { frame: Frame, from: Endpoint },
    Timer(TimerHandle),
}

/// Discrete-event simulation of a sender and a receiver joined by one lossy link.
///
/// Time jumps straight to the next pending event. Callbacks run one at a time;
/// whatever an application does during a callback (send, arm, cancel) is
/// buffered and applied once the callback returns.
pub struct Simulator<S, R> {
    time: u64,
    event_queue: BinaryHeap<Event>,
    event_id_counter: u64,

    config: SimConfig,
    rng: rand::rngs::StdRng,

    pub sender: S,
    pub receiver: R,

    sockets: SocketTable,
    next_timer_id: u64,
    /// Timers armed and neither fired nor cancelled yet.
    armed_timers: HashMap<TimerHandle, NodeId>,

    sender_stats: NodeStats,
    receiver_stats: NodeStats,
    frames_dropped: u32,
    frames_duplicated: u32,
    frames_unreachable: u32,
    failures: Vec<String>,

    /// Time-series metrics recorded via `NodeContext::record_metric`
    /// Key: metric name, Value: Vec<(time_ms, value)>
    pub metrics: HashMap<String, Vec<(u64, f64)>>,

    // Deterministic fault injection: drop the nth frame emitted by a node, once
    drop_nth_once: Vec<(NodeId, u32)>,

    pub link_events: Vec<LinkEventSummary>,
}

impl<S: Application, R: Application> Simulator<S, R> {
    pub fn new(config: SimConfig, sender: S, receiver: R) -> Self {
        let rng = rand::rngs::StdRng::seed_from_u64(config.seed);

        Self {
            time: 0,
            event_queue: BinaryHeap::new(),
            event_id_counter: 0,
            config,
            rng,
            sender,
            receiver,
            sockets: SocketTable::default(),
            next_timer_id: 0,
            armed_timers: HashMap::new(),
            sender_stats: NodeStats::default(),
            receiver_stats: NodeStats::default(),
            frames_dropped: 0,
            frames_duplicated: 0,
            frames_unreachable: 0,
            failures: Vec::new(),
            metrics: HashMap::new(),
            drop_nth_once: Vec::new(),
            link_events: Vec::new(),
        }
    }

    /// Register a deterministic fault: drop the `nth` (1-based) frame emitted by `node`.
    pub fn add_drop_nth_from(&mut self, node: NodeId, nth: u32) {
        self.drop_nth_once.push((node, nth));
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Return a slice of (time_ms, value) samples for a named metric, if present.
    pub fn metric_series(&self, name: &str) -> Option<&[(u64, f64)]> {
        self.metrics.get(name).map(|v| v.as_slice())
    }

    pub fn stats(&self, node: NodeId) -> &NodeStats {
        match node {
            NodeId::Sender => &self.sender_stats,
            NodeId::Receiver => &self.receiver_stats,
        }
    }

    /// Timers of `node` currently armed.
    pub fn armed_timers(&self, node: NodeId) -> usize {
        self.armed_timers
            .values()
            .filter(|owner| **owner == node)
            .count()
    }

    fn stats_mut(&mut self, node: NodeId) -> &mut NodeStats {
        match node {
            NodeId::Sender => &mut self.sender_stats,
            NodeId::Receiver => &mut self.receiver_stats,
        }
    }

    fn push_event(&mut self, time: u64, event_type: EventType) {
        self.event_queue.push(Event {
            time,
            event_type,
            id: self.event_id_counter,
        });
        self.event_id_counter += 1;
    }

    fn record_link_event(&mut self, description: String) {
        self.link_events.push(LinkEventSummary {
            time: self.time,
            description,
        });
    }

    pub fn schedule_start(&mut self, node: NodeId, time: u64) {
        self.push_event(time, EventType::Start { node });
    }

    pub fn schedule_stop(&mut self, node: NodeId, time: u64) {
        self.push_event(time, EventType::Stop { node });
    }

    /// Start the receiver, then the sender, at the current time.
    pub fn init(&mut self) {
        self.schedule_start(NodeId::Receiver, self.time);
        self.schedule_start(NodeId::Sender, self.time);
    }

    /// Receiver at 0 s, sender at 1 s, both stopped at 20 s.
    pub fn schedule_default_lifecycle(&mut self) {
        self.schedule_start(NodeId::Receiver, RECEIVER_START_MS);
        self.schedule_start(NodeId::Sender, SENDER_START_MS);
        self.schedule_stop(NodeId::Sender, STOP_MS);
        self.schedule_stop(NodeId::Receiver, STOP_MS);
    }

    pub fn peek_next_event_time(&self) -> Option<u64> {
        self.event_queue.peek().map(|e| e.time)
    }

    pub fn current_time(&self) -> u64 {
        self.time
    }

    pub fn remaining_events(&self) -> usize {
        self.event_queue.len()
    }

    /// Process the next event. Returns true if an event was processed, false if queue is empty.
    pub fn step(&mut self) -> bool {
        let event = match self.event_queue.pop() {
            Some(e) => e,
            None => return false,
        };

        self.time = event.time;
        debug!("Processing event at {}: {:?}", self.time, event.event_type);

        match event.event_type {
            EventType::Start { node } => {
                self.record_link_event(format!("[{:?}] START", node));
                self.dispatch(node, Callback::Start);
            }
            EventType::Stop { node } => {
                self.record_link_event(format!("[{:?}] STOP", node));
                self.dispatch(node, Callback::Stop);
                self.armed_timers.retain(|_, owner| *owner != node);
            }
            EventType::FrameArrival { to, from, frame } => match self.sockets.owner(&to) {
                Some(node) => {
                    self.stats_mut(node).frames_delivered += 1;
                    self.record_link_event(format!(
                        "[{} -> {}] DELIVER {} bytes to {:?}",
                        from,
                        to,
                        frame.len(),
                        node
                    ));
                    self.dispatch(node, Callback::Frame { frame, from });
                }
                None => {
                    debug!("No endpoint bound at {}, discarding frame from {}", to, from);
                    self.frames_unreachable += 1;
                    self.record_link_event(format!("[{} -> {}] UNREACHABLE", from, to));
                }
            },
            EventType::TimerExpiry { node, handle } => {
                if self.armed_timers.remove(&handle).is_none() {
                    debug!("Skipping cancelled timer {:?}", handle);
                    return true; // Event processed (by being ignored)
                }
                self.stats_mut(node).timers_fired += 1;
                self.record_link_event(format!("[{:?}] TIMEOUT {:?}", node, handle));
                self.dispatch(node, Callback::Timer(handle));
            }
        }
        true
    }

    /// Run until no event is left.
    ///
    /// A sender whose peer never answers retransmits forever, so without a
    /// scheduled stop this never returns; use [`Simulator::run_until`] then.
    pub fn run_until_complete(&mut self) {
        while self.step() {}
    }

    /// Process every event due at or before `deadline`.
    pub fn run_until(&mut self, deadline: u64) {
        while self
            .peek_next_event_time()
            .is_some_and(|time| time <= deadline)
        {
            self.step();
        }
    }

    /// Produce a serializable snapshot of the current simulation state.
    pub fn export_report(&self) -> SimulationReport {
        SimulationReport {
            config: self.config.clone(),
            duration_ms: self.time,
            sender: self.sender_stats,
            receiver: self.receiver_stats,
            frames_dropped: self.frames_dropped,
            frames_duplicated: self.frames_duplicated,
            frames_unreachable: self.frames_unreachable,
            failures: self.failures.clone(),
            metrics: self.metrics.clone(),
            link_events: self.link_events.clone(),
        }
    }

    fn dispatch(&mut self, node: NodeId, callback: Callback) {
        let mut buffer = ActionBuffer::default();
        let result = {
            let mut ctx = ScopedContext {
                node,
                now: self.time,
                buffer: &mut buffer,
                sockets: &mut self.sockets,
                next_timer: &mut self.next_timer_id,
            };
            let app: &mut dyn Application = match node {
                NodeId::Sender => &mut self.sender,
                NodeId::Receiver => &mut self.receiver,
            };
            match callback {
                Callback::Start => app.start(&mut ctx),
                Callback::Stop => {
                    app.stop(&mut ctx);
                    Ok(())
                }
                Callback::Frame { frame, from } => {
                    app.on_frame(&mut ctx, frame, from);
                    Ok(())
                }
                Callback::Timer(handle) => {
                    app.on_timer(&mut ctx, handle);
                    Ok(())
                }
            }
        };

        if let Err(err) = result {
            warn!("[{:?}] failed to start: {}", node, err);
            self.record_link_event(format!("[{:?}] START FAILED: {}", node, err));
            self.failures.push(format!("{:?}: {}", node, err));
        }
        self.process_actions(node, buffer);
    }

    fn sample_latency(&mut self) -> u64 {
        let low = self.config.min_latency.min(self.config.max_latency);
        let high = self.config.min_latency.max(self.config.max_latency);
        self.rng.random_range(low..=high)
    }

    fn process_actions(&mut self, source_node: NodeId, buffer: ActionBuffer) {
        // First, fold metrics into simulator-wide store
        for (name, value) in buffer.metrics {
            self.metrics
                .entry(name)
                .or_default()
                .push((self.time, value));
        }

        for log in buffer.logs {
            info!("[{:?} t={}ms] {}", source_node, self.time, log);
        }

        // Applied in call order so that arming and cancelling the same
        // handle within one callback leaves it cancelled.
        for op in buffer.timer_ops {
            match op {
                TimerOp::Arm { handle, delay } => {
                    self.armed_timers.insert(handle, source_node);
                    self.push_event(
                        self.time.saturating_add(delay),
                        EventType::TimerExpiry {
                            node: source_node,
                            handle,
                        },
                    );
                }
                TimerOp::Cancel(handle) => {
                    if self.armed_timers.remove(&handle).is_some() {
                        debug!("[{:?}] cancelled timer {:?}", source_node, handle);
                    }
                }
            }
        }

        // Frame transmission logic (Channel)
        for (frame, from, to) in buffer.outgoing_frames {
            let stats = self.stats_mut(source_node);
            stats.frames_sent += 1;
            let nth = stats.frames_sent;

            let Some(from) = from else {
                warn!("[{:?}] sent a frame without an open endpoint", source_node);
                self.frames_dropped += 1;
                self.record_link_event(format!("[{:?}] DROP (no endpoint) #{}", source_node, nth));
                continue;
            };

            if let Some(pos) = self
                .drop_nth_once
                .iter()
                .position(|&(node, n)| node == source_node && n == nth)
            {
                self.drop_nth_once.remove(pos);
                self.frames_dropped += 1;
                self.record_link_event(format!(
                    "[{} -> {}] DROP (deterministic) {:?} frame #{}",
                    from, to, source_node, nth
                ));
                debug!("Deterministically dropping {:?} frame #{}", source_node, nth);
                continue;
            }

            // 1. Check Loss
            if self.rng.random::<f64>() < self.config.loss_rate {
                self.frames_dropped += 1;
                self.record_link_event(format!(
                    "[{} -> {}] DROP (random loss) {:?} frame #{}",
                    from, to, source_node, nth
                ));
                debug!("Frame lost in channel");
                continue;
            }

            // 2. Calculate Latency
            let latency = self.sample_latency();
            self.record_link_event(format!(
                "[{} -> {}] SEND {:?} frame #{} ({} bytes, latency={}ms)",
                from,
                to,
                source_node,
                nth,
                frame.len(),
                latency
            ));

            // 3. Check Duplication
            if self.rng.random::<f64>() < self.config.duplicate_rate {
                let copy_latency = self.sample_latency();
                self.frames_duplicated += 1;
                self.record_link_event(format!(
                    "[{} -> {}] DUPLICATE {:?} frame #{} (latency={}ms)",
                    from, to, source_node, nth, copy_latency
                ));
                debug!("Frame duplicated in channel");
                self.push_event(
                    self.time.saturating_add(copy_latency),
                    EventType::FrameArrival {
                        to,
                        from,
                        frame: frame.clone(),
                    },
                );
            }

            self.push_event(
                self.time.saturating_add(latency),
                EventType::FrameArrival { to, from, frame },
            );
        }
    }
}
