use crate::error::ChannelError;
use crate::packet::{Endpoint, Frame};
use serde::{Deserialize, Serialize};

/// Opaque handle of a scheduled timeout, issued by [`Clock::schedule_after`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimerHandle(pub u64);

/// Unreliable datagram channel as seen from one node.
///
/// Frames may be dropped, delayed, reordered or duplicated. Inbound frames are
/// handed to [`Application::on_frame`] together with their source endpoint.
pub trait Channel {
    /// Bind a local endpoint. An unspecified address resolves to the node's own address.
    fn bind(&mut self, local: Endpoint) -> Result<Endpoint, ChannelError>;

    /// Open an ephemeral local endpoint for talking to `peer`.
    fn connect(&mut self, peer: Endpoint) -> Result<Endpoint, ChannelError>;

    /// Release the node's endpoint. Closing twice is a no-op.
    fn close(&mut self);

    /// Send a frame to `to`. Never fails: undeliverable frames vanish like lost ones.
    fn send_frame(&mut self, frame: Frame, to: Endpoint);
}

/// Discrete-event clock with cancellable deferred callbacks.
pub trait Clock {
    /// Current simulated time in ms.
    fn now(&self) -> u64;

    /// Schedule a call to [`Application::on_timer`] `delay_ms` from now.
    fn schedule_after(&mut self, delay_ms: u64) -> TimerHandle;

    /// Cancel a pending timer.
    /// Cancelling a handle that already fired or was already cancelled is a no-op.
    fn cancel(&mut self, handle: TimerHandle);
}

/// Everything the environment provides to an application during a callback.
pub trait NodeContext: Channel + Clock {
    /// Log a message to the simulator's output.
    fn log(&mut self, message: &str);

    /// Record a numeric sample (e.g. the current sequence bit) for the trace.
    fn record_metric(&mut self, _name: &str, _value: f64) {
        // Default no-op so contexts without a trace don't need to care.
    }
}

/// Lifecycle and event hooks of an application running on a node.
///
/// Callbacks are invoked one at a time by a single scheduler; an
/// implementation never sees two of them overlap.
pub trait Application {
    fn start(&mut self, ctx: &mut dyn NodeContext) -> Result<(), ChannelError>;

    fn stop(&mut self, ctx: &mut dyn NodeContext);

    /// Called when a frame arrives at the node's endpoint.
    fn on_frame(&mut self, ctx: &mut dyn NodeContext, frame: Frame, from: Endpoint);

    /// Called when a timer armed by this application expires.
    fn on_timer(&mut self, ctx: &mut dyn NodeContext, handle: TimerHandle);
}
