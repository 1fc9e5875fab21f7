use std::any::Any;
use std::collections::VecDeque;

use pktsim_abstract::{
    Linkspeed, NodeSnapshot, Packet, PacketKind, PacketSink, QueueCounters, SimContext,
    TraceEventKind, transmission_time,
};
use tracing::warn;

pub(crate) const TOKEN_SERVICE: u32 = 0;

/// State shared by every queue variant: the service line, the byte gauge
/// and the counters. Variants own their buffers and their enqueue policy;
/// the core never decides what to accept.
pub(crate) struct QueueCore {
    pub name: String,
    pub rate: Linkspeed,
    pub max_bytes: u64,
    pub bytes: u64,
    /// A completion event is outstanding.
    pub busy: bool,
    /// PFC pause; the in-service packet still completes.
    pub paused: bool,
    pub stats: QueueCounters,
}

impl QueueCore {
    pub fn new(rate: Linkspeed, max_bytes: u64, name: impl Into<String>) -> Self {
        assert!(rate > 0, "queue service rate must be positive");
        assert!(max_bytes > 0, "queue capacity must be positive");
        Self {
            name: name.into(),
            rate,
            max_bytes,
            bytes: 0,
            busy: false,
            paused: false,
            stats: QueueCounters::default(),
        }
    }

    /// `enqueued` counts every offered packet so that
    /// `enqueued = dequeued + dropped + buffered` holds.
    pub fn note_arrival(&mut self) {
        self.stats.enqueued += 1;
    }

    pub fn would_overflow(&self, size: u64) -> bool {
        self.bytes + size > self.max_bytes
    }

    pub fn note_enqueue(&mut self, pkt: &Packet, ctx: &mut dyn SimContext) {
        self.bytes += pkt.size;
        self.stats.bytes_enqueued += pkt.size;
        ctx.trace(TraceEventKind::QueueEnqueue {
            flow: pkt.flow,
            bytes: pkt.size,
            queued_bytes: self.bytes,
        });
    }

    pub fn drop_arriving(&mut self, pkt: Packet, ctx: &mut dyn SimContext) {
        self.stats.dropped += 1;
        self.stats.bytes_dropped += pkt.size;
        ctx.trace(TraceEventKind::QueueDrop {
            flow: pkt.flow,
            bytes: pkt.size,
        });
        ctx.drop_packet(pkt);
    }

    /// Begin transmitting the head-of-line packet of `size` bytes.
    pub fn start_service(&mut self, size: u64, ctx: &mut dyn SimContext) {
        debug_assert!(!self.busy, "service line already busy");
        self.busy = true;
        ctx.schedule_in(transmission_time(size, self.rate), TOKEN_SERVICE);
    }

    pub fn note_dequeue(&mut self, pkt: &Packet, ctx: &mut dyn SimContext) {
        debug_assert!(self.bytes >= pkt.size, "queue gauge underflow");
        self.bytes -= pkt.size;
        self.busy = false;
        self.stats.dequeued += 1;
        ctx.trace(TraceEventKind::QueueDequeue {
            flow: pkt.flow,
            bytes: pkt.size,
            queued_bytes: self.bytes,
        });
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot::Queue {
            name: self.name.clone(),
            buffered_bytes: self.bytes,
            counters: self.stats.clone(),
        }
    }
}

/// Decrement the TTL at queue ingress; true when the packet expired and
/// must be policy-dropped.
pub(crate) fn ttl_expired(pkt: &mut Packet) -> bool {
    if pkt.ttl == 0 {
        return true;
    }
    pkt.ttl -= 1;
    false
}

/// Drop-tail FIFO: reject an arrival that would push the buffer past
/// `max_bytes`, otherwise serve in arrival order at the configured rate.
pub struct FifoQueue {
    core: QueueCore,
    buffer: VecDeque<Packet>,
}

impl FifoQueue {
    pub fn new(rate: Linkspeed, max_bytes: u64, name: impl Into<String>) -> Self {
        Self {
            core: QueueCore::new(rate, max_bytes, name),
            buffer: VecDeque::new(),
        }
    }

    pub fn buffered_bytes(&self) -> u64 {
        self.core.bytes
    }

    pub fn counters(&self) -> &QueueCounters {
        &self.core.stats
    }
}

impl PacketSink for FifoQueue {
    fn receive(&mut self, mut pkt: Packet, ctx: &mut dyn SimContext) {
        if pkt.kind() == PacketKind::Pause {
            warn!(queue = %self.core.name, "pause frame at a lossy queue, ignoring");
            ctx.release_packet(pkt);
            return;
        }
        self.core.note_arrival();
        if ttl_expired(&mut pkt) || self.core.would_overflow(pkt.size) {
            self.core.drop_arriving(pkt, ctx);
            return;
        }
        self.core.note_enqueue(&pkt, ctx);
        self.buffer.push_back(pkt);
        if !self.core.busy && !self.core.paused {
            let head = self.buffer.front().expect("just pushed").size;
            self.core.start_service(head, ctx);
        }
    }

    fn do_next_event(&mut self, _token: u32, ctx: &mut dyn SimContext) {
        let pkt = self
            .buffer
            .pop_front()
            .expect("service completion with an empty buffer");
        self.core.note_dequeue(&pkt, ctx);
        ctx.forward(pkt);
        if !self.core.paused
            && let Some(head) = self.buffer.front()
        {
            let size = head.size;
            self.core.start_service(size, ctx);
        }
    }

    fn name(&self) -> &str {
        &self.core.name
    }

    fn snapshot(&self) -> Option<NodeSnapshot> {
        Some(self.core.snapshot())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Simulator;
    use crate::pipe::Pipe;
    use pktsim_abstract::{FlowId, PacketHeader, Route, SimSettings, mbps};
    use std::rc::Rc;

    struct Collector {
        name: String,
        got: Vec<(u64, u64)>, // (time, seqno)
    }

    impl PacketSink for Collector {
        fn receive(&mut self, pkt: Packet, ctx: &mut dyn SimContext) {
            if let PacketHeader::TcpData { seqno, .. } = pkt.header {
                self.got.push((ctx.now(), seqno));
            }
            let (flow, size) = (pkt.flow, pkt.size);
            ctx.delivered(flow, size, 1);
            ctx.release_packet(pkt);
        }

        fn do_next_event(&mut self, _token: u32, _ctx: &mut dyn SimContext) {}

        fn name(&self) -> &str {
            &self.name
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn send_one(sim: &mut Simulator, route: &Rc<Route>, seqno: u64, size: u64) {
        // hand-deliver a packet into the queue at the current time
        struct OneShot {
            route: Rc<Route>,
            seqno: u64,
            size: u64,
        }
        impl PacketSink for OneShot {
            fn receive(&mut self, _pkt: Packet, _ctx: &mut dyn SimContext) {}
            fn do_next_event(&mut self, _token: u32, ctx: &mut dyn SimContext) {
                let mut pkt = ctx.alloc_packet(PacketHeader::TcpData {
                    seqno: self.seqno,
                    syn: false,
                    ts: ctx.now(),
                    retransmit: false,
                    dsn: None,
                });
                pkt.size = self.size;
                pkt.flow = FlowId(1);
                pkt.route = Some(self.route.clone());
                ctx.forward(pkt);
            }
            fn name(&self) -> &str {
                "oneshot"
            }
            fn as_any_mut(&mut self) -> &mut dyn Any {
                self
            }
        }
        let shot = sim.add_node(Box::new(OneShot {
            route: route.clone(),
            seqno,
            size,
        }));
        sim.schedule_node(shot, sim.now(), 0);
    }

    #[test]
    fn serves_at_link_rate_and_drops_at_capacity() {
        let mut sim = Simulator::new(SimSettings::default());
        // 1 Mbps, room for exactly three 1000-byte packets
        let q = sim.add_node(Box::new(FifoQueue::new(mbps(1), 3000, "bottleneck")));
        let dst = sim.add_node(Box::new(Collector {
            name: "dst".into(),
            got: Vec::new(),
        }));
        sim.register_static_flow(FlowId(1), "f");
        let route = Rc::new(Route::new(vec![q, dst]));

        for seq in 0..4 {
            send_one(&mut sim, &route, seq, 1000);
        }
        sim.run_to_completion();

        let counters = sim.node_as::<FifoQueue>(q).unwrap().counters().clone();
        assert_eq!(counters.enqueued, 4);
        assert_eq!(counters.dropped, 1); // fourth arrival hit max_bytes exactly full
        assert_eq!(counters.dequeued, 3);

        // 1000 B at 1 Mbps = 8 ms per packet, back to back
        let dst = sim.node_as::<Collector>(dst).unwrap();
        let times: Vec<u64> = dst.got.iter().map(|(t, _)| *t).collect();
        assert_eq!(times.len(), 3);
        assert_eq!(times[0], 8_000_000_000);
        assert_eq!(times[1], 16_000_000_000);
        assert_eq!(times[2], 24_000_000_000);
    }

    #[test]
    fn conservation_invariant() {
        let mut sim = Simulator::new(SimSettings::default());
        let q = sim.add_node(Box::new(FifoQueue::new(mbps(10), 2500, "q")));
        let pipe = sim.add_node(Box::new(Pipe::new(1000, "p")));
        let dst = sim.add_node(Box::new(Collector {
            name: "dst".into(),
            got: Vec::new(),
        }));
        sim.register_static_flow(FlowId(1), "f");
        let route = Rc::new(Route::new(vec![q, pipe, dst]));
        for seq in 0..10 {
            send_one(&mut sim, &route, seq, 1000);
        }
        sim.run_to_completion();
        let fq = sim.node_as::<FifoQueue>(q).unwrap();
        let c = fq.counters();
        let buffered = fq.buffer.len() as u64;
        assert_eq!(c.enqueued, c.dequeued + c.dropped + buffered);
        assert_eq!(fq.buffered_bytes(), 0);
    }
}
