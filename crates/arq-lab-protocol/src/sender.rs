use arq_lab_abstract::{
    Application, ChannelError, Endpoint, Frame, NodeContext, SenderConfig, SequenceBit,
    TimerHandle,
};
use bytes::Bytes;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderPhase {
    /// Not started yet.
    Idle,
    /// One frame in flight, retransmission timer armed.
    AwaitingAck,
    /// Every packet acknowledged.
    Complete,
    Stopped,
}

/// The single frame in flight and the timer guarding it.
#[derive(Debug, Clone)]
pub struct PendingTransmission {
    pub seq: SequenceBit,
    pub payload: Bytes,
    pub timer: TimerHandle,
    /// Transmissions of this packet so far, 1 for the first send.
    pub attempts: u32,
}

/// Stop-and-wait sender.
///
/// Sends `total_packets` fixed-size frames to the peer, one at a time. Every
/// inbound frame is taken as the ack of whatever is in flight, because frames
/// carry no sequence information. A timeout resends the same packet at a
/// fixed interval with no retry limit.
pub struct Sender {
    config: SenderConfig,
    local: Option<Endpoint>,
    current_seq: SequenceBit,
    packets_sent: u32,
    pending: Option<PendingTransmission>,
    stopped: bool,
    transmissions: u32,
    retransmissions: u32,
    attempts_per_packet: Vec<u32>,
}

impl Sender {
    pub fn new(config: SenderConfig) -> Self {
        Self {
            config,
            local: None,
            current_seq: SequenceBit::Zero,
            packets_sent: 0,
            pending: None,
            stopped: false,
            transmissions: 0,
            retransmissions: 0,
            attempts_per_packet: Vec::new(),
        }
    }

    pub fn config(&self) -> &SenderConfig {
        &self.config
    }

    pub fn current_seq(&self) -> SequenceBit {
        self.current_seq
    }

    /// Packets acknowledged so far.
    pub fn packets_sent(&self) -> u32 {
        self.packets_sent
    }

    pub fn total_to_send(&self) -> u32 {
        self.config.total_packets
    }

    pub fn pending(&self) -> Option<&PendingTransmission> {
        self.pending.as_ref()
    }

    pub fn active_timer(&self) -> Option<TimerHandle> {
        self.pending.as_ref().map(|p| p.timer)
    }

    /// Frames put on the wire, retransmissions included.
    pub fn transmissions(&self) -> u32 {
        self.transmissions
    }

    pub fn retransmissions(&self) -> u32 {
        self.retransmissions
    }

    /// Transmissions each acknowledged packet needed, in order.
    pub fn attempts_per_packet(&self) -> &[u32] {
        &self.attempts_per_packet
    }

    pub fn local_endpoint(&self) -> Option<Endpoint> {
        self.local
    }

    pub fn phase(&self) -> SenderPhase {
        if self.stopped {
            SenderPhase::Stopped
        } else if self.pending.is_some() {
            SenderPhase::AwaitingAck
        } else if self.local.is_some() && self.packets_sent >= self.config.total_packets {
            SenderPhase::Complete
        } else {
            SenderPhase::Idle
        }
    }

    /// Put the frame for the current sequence bit on the wire and arm its timer.
    ///
    /// On a retransmission the previous handle is replaced; it has usually
    /// fired already, and cancelling it again is harmless.
    pub fn send(&mut self, ctx: &mut dyn NodeContext) {
        if self.stopped || self.packets_sent >= self.config.total_packets {
            return;
        }

        // An ack always clears `pending`, so anything still here is the
        // same packet going out again.
        let (payload, attempts) = match self.pending.take() {
            Some(previous) => {
                debug_assert_eq!(previous.seq, self.current_seq);
                ctx.cancel(previous.timer);
                (previous.payload, previous.attempts + 1)
            }
            None => (Bytes::from(vec![0u8; self.config.payload_size]), 1),
        };

        let now = ctx.now();
        ctx.log(&format!(
            "Sending pkt seq {} at {:.3}s (packet {}/{}, attempt {})",
            self.current_seq,
            now as f64 / 1000.0,
            self.packets_sent + 1,
            self.config.total_packets,
            attempts
        ));
        ctx.send_frame(Frame::new(payload.clone()), self.config.peer);
        let timer = ctx.schedule_after(self.config.timeout_ms);

        self.transmissions += 1;
        if attempts > 1 {
            self.retransmissions += 1;
        }
        self.pending = Some(PendingTransmission {
            seq: self.current_seq,
            payload,
            timer,
            attempts,
        });
    }

    /// Treat `frame` as the ack of the packet in flight.
    ///
    /// The frame's content is never inspected, so a duplicate ack of the
    /// previous packet is accepted for the current one.
    pub fn on_ack_received(&mut self, ctx: &mut dyn NodeContext, frame: Frame) {
        if self.stopped {
            debug!("sender stopped, ignoring {} byte frame", frame.len());
            return;
        }
        if self.packets_sent >= self.config.total_packets {
            ctx.log(&format!(
                "Ignoring {} byte frame: all {} packets already acknowledged",
                frame.len(),
                self.config.total_packets
            ));
            return;
        }
        let Some(pending) = self.pending.take() else {
            debug!("sender not started, ignoring {} byte frame", frame.len());
            return;
        };

        ctx.cancel(pending.timer);
        let now = ctx.now();
        ctx.log(&format!(
            "Received ACK for seq {} at {:.3}s",
            self.current_seq,
            now as f64 / 1000.0
        ));

        self.current_seq = self.current_seq.flip();
        self.packets_sent += 1;
        self.attempts_per_packet.push(pending.attempts);

        ctx.record_metric("seq_bit", f64::from(self.current_seq.as_u8()));
        ctx.record_metric("packets_sent", f64::from(self.packets_sent));
        ctx.record_metric("attempts", f64::from(pending.attempts));

        if self.packets_sent < self.config.total_packets {
            self.send(ctx);
        } else {
            ctx.log(&format!(
                "All {} packets acknowledged ({} retransmissions)",
                self.packets_sent, self.retransmissions
            ));
        }
    }

    /// Retransmit the packet in flight if `handle` is its timer.
    pub fn on_timeout(&mut self, ctx: &mut dyn NodeContext, handle: TimerHandle) {
        match &self.pending {
            Some(pending) if pending.timer == handle => {
                ctx.log(&format!(
                    "Timeout for seq {} after {} ms, retransmitting",
                    pending.seq, self.config.timeout_ms
                ));
            }
            _ => {
                debug!("ignoring stale timer {:?}", handle);
                return;
            }
        }
        self.send(ctx);
    }
}

impl Application for Sender {
    fn start(&mut self, ctx: &mut dyn NodeContext) -> Result<(), ChannelError> {
        let local = ctx.connect(self.config.peer)?;
        self.local = Some(local);
        self.stopped = false;
        ctx.log(&format!(
            "Sender up on {} -> {} (timeout {} ms, {} packets of {} bytes)",
            local,
            self.config.peer,
            self.config.timeout_ms,
            self.config.total_packets,
            self.config.payload_size
        ));
        self.send(ctx);
        Ok(())
    }

    fn stop(&mut self, ctx: &mut dyn NodeContext) {
        if let Some(pending) = self.pending.take() {
            ctx.cancel(pending.timer);
        }
        ctx.close();
        self.stopped = true;
        ctx.log(&format!(
            "Sender stopped after {} acknowledged packets",
            self.packets_sent
        ));
    }

    fn on_frame(&mut self, ctx: &mut dyn NodeContext, frame: Frame, _from: Endpoint) {
        self.on_ack_received(ctx, frame);
    }

    fn on_timer(&mut self, ctx: &mut dyn NodeContext, handle: TimerHandle) {
        self.on_timeout(ctx, handle);
    }
}

#[cfg(test)]
mod tests {
    use super::{Sender, SenderPhase};
    use crate::test_context::ManualContext;
    use arq_lab_abstract::{
        Application, Endpoint, Frame, NodeId, SenderConfig, SequenceBit,
    };
    use rstest::rstest;

    fn config(total_packets: u32) -> SenderConfig {
        SenderConfig {
            total_packets,
            ..SenderConfig::default()
        }
    }

    fn receiver_endpoint() -> Endpoint {
        Endpoint::new(NodeId::Receiver.address(), 8080)
    }

    fn started(total_packets: u32) -> (Sender, ManualContext) {
        let mut ctx = ManualContext::new(NodeId::Sender);
        let mut sender = Sender::new(config(total_packets));
        sender.start(&mut ctx).unwrap();
        (sender, ctx)
    }

    fn ack(sender: &mut Sender, ctx: &mut ManualContext) {
        sender.on_frame(ctx, Frame::ack(), receiver_endpoint());
    }

    #[test]
    fn start_sends_first_frame_and_arms_timer() {
        let (sender, ctx) = started(10);

        assert_eq!(ctx.sent.len(), 1);
        let (frame, to) = &ctx.sent[0];
        assert_eq!(frame.len(), 1024);
        assert_eq!(*to, receiver_endpoint());
        assert_eq!(ctx.armed.len(), 1);
        assert_eq!(ctx.armed.values().next(), Some(&1000));
        assert_eq!(sender.phase(), SenderPhase::AwaitingAck);
        assert_eq!(sender.current_seq(), SequenceBit::Zero);
        assert_eq!(sender.active_timer(), ctx.armed.keys().next().copied());
    }

    #[test]
    fn ack_cancels_timer_flips_bit_and_sends_next() {
        let (mut sender, mut ctx) = started(10);
        let first_timer = sender.active_timer().unwrap();

        ack(&mut sender, &mut ctx);

        assert!(ctx.cancelled.contains(&first_timer));
        assert!(!ctx.armed.contains_key(&first_timer));
        assert_eq!(sender.current_seq(), SequenceBit::One);
        assert_eq!(sender.packets_sent(), 1);
        assert_eq!(ctx.sent.len(), 2);
        assert_eq!(ctx.armed.len(), 1);
        assert_eq!(sender.attempts_per_packet(), &[1]);
    }

    #[test]
    fn timeout_resends_same_sequence_bit() {
        let (mut sender, mut ctx) = started(10);

        let fired = ctx.expire_next().unwrap();
        sender.on_timer(&mut ctx, fired);

        assert_eq!(ctx.now, 1000);
        assert_eq!(ctx.sent.len(), 2);
        assert_eq!(sender.current_seq(), SequenceBit::Zero);
        assert_eq!(sender.packets_sent(), 0);
        assert_eq!(sender.retransmissions(), 1);
        assert_eq!(sender.pending().unwrap().attempts, 2);
        assert_eq!(ctx.armed.len(), 1);
        assert_eq!(ctx.armed.values().next(), Some(&2000));
        assert!(ctx.logs.iter().any(|l| l.starts_with("Timeout for seq 0")));
    }

    #[test]
    fn retransmission_after_ack_reuses_new_packet_payload() {
        let (mut sender, mut ctx) = started(10);
        ack(&mut sender, &mut ctx);

        let fired = ctx.expire_next().unwrap();
        sender.on_timer(&mut ctx, fired);
        let fired = ctx.expire_next().unwrap();
        sender.on_timer(&mut ctx, fired);

        // Packet 2 went out three times, each with the same payload.
        let pending = sender.pending().unwrap();
        assert_eq!(pending.seq, SequenceBit::One);
        assert_eq!(pending.attempts, 3);
        assert_eq!(ctx.sent.len(), 4);
        assert!(ctx.sent[1..].iter().all(|(frame, _)| *frame == ctx.sent[1].0));
        assert_eq!(ctx.cancelled.len(), 3);
    }

    #[test]
    fn stale_timer_is_ignored() {
        let (mut sender, mut ctx) = started(10);
        let first_timer = sender.active_timer().unwrap();
        ack(&mut sender, &mut ctx);

        sender.on_timer(&mut ctx, first_timer);

        assert_eq!(ctx.sent.len(), 2);
        assert_eq!(sender.retransmissions(), 0);
    }

    #[test]
    fn sequence_bit_alternates_once_per_ack() {
        let (mut sender, mut ctx) = started(9);
        for _ in 0..9 {
            ack(&mut sender, &mut ctx);
        }

        assert_eq!(
            ctx.metric("seq_bit"),
            vec![1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0]
        );
        assert_eq!(sender.current_seq(), SequenceBit::One);
    }

    #[test]
    fn unacknowledged_packet_is_retransmitted_forever() {
        let (mut sender, mut ctx) = started(2);
        for round in 1..=50 {
            let fired = ctx.expire_next().unwrap();
            sender.on_timer(&mut ctx, fired);
            assert_eq!(ctx.now, round * 1000);
            assert!(ctx.armed.len() <= 1);
        }

        assert_eq!(ctx.sent.len(), 51);
        assert_eq!(sender.packets_sent(), 0);
        assert_eq!(sender.current_seq(), SequenceBit::Zero);
        assert_eq!(sender.pending().unwrap().attempts, 51);
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(10)]
    fn stops_after_total_packets(#[case] total: u32) {
        let (mut sender, mut ctx) = started(total);
        for _ in 0..total {
            ack(&mut sender, &mut ctx);
        }

        assert_eq!(ctx.sent.len(), total as usize);
        assert_eq!(sender.packets_sent(), total);
        assert_eq!(sender.phase(), SenderPhase::Complete);
        assert!(ctx.armed.is_empty());
    }

    #[test]
    fn acks_after_completion_do_not_overcount() {
        let (mut sender, mut ctx) = started(2);
        for _ in 0..4 {
            ack(&mut sender, &mut ctx);
        }

        assert_eq!(sender.packets_sent(), 2);
        assert_eq!(ctx.sent.len(), 2);
    }

    #[test]
    fn duplicate_ack_is_taken_for_the_packet_in_flight() {
        // Ack of packet 1 delayed past the timeout: the retransmission is acked
        // too, and the second ack is credited to packet 2.
        let (mut sender, mut ctx) = started(3);
        let fired = ctx.expire_next().unwrap();
        sender.on_timer(&mut ctx, fired);

        ack(&mut sender, &mut ctx);
        ack(&mut sender, &mut ctx);

        assert_eq!(sender.packets_sent(), 2);
        assert_eq!(sender.attempts_per_packet(), &[2, 1]);
        assert_eq!(ctx.sent.len(), 4);
        assert!(sender.pending().is_some());
    }

    #[test]
    fn stop_cancels_timer_and_ignores_later_events() {
        let (mut sender, mut ctx) = started(10);
        let timer = sender.active_timer().unwrap();

        sender.stop(&mut ctx);
        ack(&mut sender, &mut ctx);
        sender.on_timer(&mut ctx, timer);

        assert!(ctx.closed);
        assert!(ctx.armed.is_empty());
        assert_eq!(ctx.sent.len(), 1);
        assert_eq!(sender.packets_sent(), 0);
        assert_eq!(sender.phase(), SenderPhase::Stopped);
    }

    #[test]
    fn frames_before_start_are_ignored() {
        let mut ctx = ManualContext::new(NodeId::Sender);
        let mut sender = Sender::new(config(3));
        ack(&mut sender, &mut ctx);

        assert_eq!(sender.phase(), SenderPhase::Idle);
        assert!(ctx.sent.is_empty());
    }
}
