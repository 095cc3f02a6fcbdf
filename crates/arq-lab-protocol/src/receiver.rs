use arq_lab_abstract::{
    Application, ChannelError, Endpoint, Frame, NodeContext, ReceiverConfig, SequenceBit,
    TimerHandle,
};
use tracing::debug;

/// Stop-and-wait receiver: acks every frame it is handed.
///
/// There is no duplicate detection. A retransmission of a frame that already
/// arrived is acked again, so the sender sees one ack per delivered frame.
pub struct Receiver {
    config: ReceiverConfig,
    local: Option<Endpoint>,
    // Kept for parity with the sender; frames carry nothing to compare it to.
    expected_seq: SequenceBit,
    frames_received: u32,
    acks_sent: u32,
}

impl Receiver {
    pub fn new(config: ReceiverConfig) -> Self {
        Self {
            config,
            local: None,
            expected_seq: SequenceBit::Zero,
            frames_received: 0,
            acks_sent: 0,
        }
    }

    pub fn expected_seq(&self) -> SequenceBit {
        self.expected_seq
    }

    pub fn frames_received(&self) -> u32 {
        self.frames_received
    }

    pub fn acks_sent(&self) -> u32 {
        self.acks_sent
    }

    pub fn local_endpoint(&self) -> Option<Endpoint> {
        self.local
    }

    pub fn is_listening(&self) -> bool {
        self.local.is_some()
    }

    pub fn on_packet_received(&mut self, ctx: &mut dyn NodeContext, frame: Frame, from: Endpoint) {
        if self.local.is_none() {
            debug!("receiver not listening, dropping frame from {}", from);
            return;
        }
        self.frames_received += 1;
        ctx.log(&format!(
            "Received packet ({} bytes) from {}. Sending ACK...",
            frame.len(),
            from
        ));
        ctx.send_frame(Frame::ack(), from);
        self.acks_sent += 1;
    }
}

impl Application for Receiver {
    fn start(&mut self, ctx: &mut dyn NodeContext) -> Result<(), ChannelError> {
        let local = ctx.bind(self.config.local)?;
        self.local = Some(local);
        ctx.log(&format!("Receiver listening on {}", local));
        Ok(())
    }

    fn stop(&mut self, ctx: &mut dyn NodeContext) {
        ctx.close();
        self.local = None;
        ctx.log(&format!(
            "Receiver stopped after {} frames, {} acks",
            self.frames_received, self.acks_sent
        ));
    }

    fn on_frame(&mut self, ctx: &mut dyn NodeContext, frame: Frame, from: Endpoint) {
        self.on_packet_received(ctx, frame, from);
    }

    fn on_timer(&mut self, _ctx: &mut dyn NodeContext, _handle: TimerHandle) {
        // Receiver has no timers
    }
}
