use std::any::Any;
use std::collections::VecDeque;

use pktsim_abstract::{
    FlowId, Linkspeed, LosslessParams, NodeSnapshot, PAUSE_FRAME_BYTES, Packet, PacketHeader,
    PacketSink, QueueCounters, SimContext, SinkId, TraceEventKind,
};
use tracing::warn;

use crate::queue::{QueueCore, ttl_expired};

/// Lossless (PFC-style) queue: instead of dropping on overflow it pauses
/// its upstream neighbor when occupancy crosses the high watermark and
/// resumes it below the low watermark. Packets are never dropped for
/// occupancy; TTL expiry is still a policy drop. A paused queue finishes
/// the packet already on the wire, then withholds service until resumed.
pub struct LosslessQueue {
    core: QueueCore,
    buffer: VecDeque<Packet>,
    params: LosslessParams,
    upstream: Option<SinkId>,
    pause_sent: bool,
}

impl LosslessQueue {
    pub fn new(
        rate: Linkspeed,
        max_bytes: u64,
        params: LosslessParams,
        upstream: Option<SinkId>,
        name: impl Into<String>,
    ) -> Self {
        assert!(
            params.low_watermark < params.high_watermark,
            "lossless watermarks inverted"
        );
        Self {
            core: QueueCore::new(rate, max_bytes, name),
            buffer: VecDeque::new(),
            params,
            upstream,
            pause_sent: false,
        }
    }

    pub fn counters(&self) -> &QueueCounters {
        &self.core.stats
    }

    pub fn buffered_bytes(&self) -> u64 {
        self.core.bytes
    }

    pub fn is_paused(&self) -> bool {
        self.core.paused
    }

    fn send_flow_control(&mut self, pause: bool, ctx: &mut dyn SimContext) {
        let Some(upstream) = self.upstream else {
            return;
        };
        let mut frame = ctx.alloc_packet(PacketHeader::Pause { pause });
        frame.size = PAUSE_FRAME_BYTES;
        frame.flow = FlowId(0);
        ctx.trace(TraceEventKind::QueuePause { pause });
        ctx.deliver_to(upstream, frame);
        self.pause_sent = pause;
    }
}

impl PacketSink for LosslessQueue {
    fn receive(&mut self, mut pkt: Packet, ctx: &mut dyn SimContext) {
        if let PacketHeader::Pause { pause } = pkt.header {
            // our own downstream is applying backpressure
            self.core.paused = pause;
            ctx.release_packet(pkt);
            if !pause
                && !self.core.busy
                && let Some(head) = self.buffer.front()
            {
                let size = head.size;
                self.core.start_service(size, ctx);
            }
            return;
        }

        self.core.note_arrival();
        if ttl_expired(&mut pkt) {
            self.core.drop_arriving(pkt, ctx);
            return;
        }
        if self.core.would_overflow(pkt.size) {
            // headroom misconfigured; a lossless queue still never drops
            warn!(
                queue = %self.core.name,
                buffered = self.core.bytes,
                "occupancy past max_bytes, accepting anyway"
            );
        }
        self.core.note_enqueue(&pkt, ctx);
        self.buffer.push_back(pkt);

        if self.core.bytes > self.params.high_watermark && !self.pause_sent {
            self.send_flow_control(true, ctx);
        }
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

        if self.core.bytes < self.params.low_watermark && self.pause_sent {
            self.send_flow_control(false, ctx);
        }
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
    use pktsim_abstract::{Route, SimSettings, mbps};
    use std::rc::Rc;

    struct Sink {
        name: String,
        received: u64,
    }

    impl PacketSink for Sink {
        fn receive(&mut self, pkt: Packet, ctx: &mut dyn SimContext) {
            self.received += 1;
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

    struct Burst {
        route: Rc<Route>,
        count: u64,
    }

    impl PacketSink for Burst {
        fn receive(&mut self, pkt: Packet, ctx: &mut dyn SimContext) {
            ctx.release_packet(pkt);
        }
        fn do_next_event(&mut self, _token: u32, ctx: &mut dyn SimContext) {
            for seq in 0..self.count {
                let mut pkt = ctx.alloc_packet(PacketHeader::TcpData {
                    seqno: seq,
                    syn: false,
                    ts: ctx.now(),
                    retransmit: false,
                    dsn: None,
                });
                pkt.size = 1000;
                pkt.flow = FlowId(1);
                pkt.route = Some(self.route.clone());
                ctx.forward(pkt);
            }
        }
        fn name(&self) -> &str {
            "burst"
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn backpressure_pauses_upstream_and_nothing_is_dropped() {
        let mut sim = Simulator::new(SimSettings::default());
        sim.register_static_flow(FlowId(1), "f");

        // upstream (fast) feeds downstream (slow); downstream pauses upstream
        let upstream = sim.add_node(Box::new(LosslessQueue::new(
            mbps(100),
            1 << 20,
            LosslessParams {
                high_watermark: 1 << 19,
                low_watermark: 1 << 18,
            },
            None,
            "upstream",
        )));
        let downstream = sim.add_node(Box::new(LosslessQueue::new(
            mbps(8),
            1 << 20,
            LosslessParams {
                high_watermark: 4_000,
                low_watermark: 2_000,
            },
            Some(upstream),
            "downstream",
        )));
        let dst = sim.add_node(Box::new(Sink {
            name: "dst".into(),
            received: 0,
        }));
        let route = Rc::new(Route::new(vec![upstream, downstream, dst]));
        let src = sim.add_node(Box::new(Burst { route, count: 20 }));

        sim.schedule_node(src, 0, 0);
        sim.run_to_completion();

        let down = sim.node_as::<LosslessQueue>(downstream).unwrap();
        assert_eq!(down.counters().dropped, 0);
        assert!(!down.is_paused());
        let up = sim.node_as::<LosslessQueue>(upstream).unwrap();
        assert_eq!(up.counters().dropped, 0);
        // the fast upstream was paused at least once while the slow
        // downstream drained
        assert_eq!(sim.node_as::<Sink>(dst).unwrap().received, 20);
    }

    #[test]
    fn ttl_expiry_is_still_a_policy_drop() {
        let mut sim = Simulator::new(SimSettings::default());
        sim.register_static_flow(FlowId(1), "f");
        let q = sim.add_node(Box::new(LosslessQueue::new(
            mbps(8),
            1 << 20,
            LosslessParams::default(),
            None,
            "ll",
        )));
        let dst = sim.add_node(Box::new(Sink {
            name: "dst".into(),
            received: 0,
        }));
        let route = Rc::new(Route::new(vec![q, dst]));

        struct ExpiredShot {
            route: Rc<Route>,
        }
        impl PacketSink for ExpiredShot {
            fn receive(&mut self, pkt: Packet, ctx: &mut dyn SimContext) {
                ctx.release_packet(pkt);
            }
            fn do_next_event(&mut self, _token: u32, ctx: &mut dyn SimContext) {
                let mut pkt = ctx.alloc_packet(PacketHeader::TcpData {
                    seqno: 0,
                    syn: false,
                    ts: 0,
                    retransmit: false,
                    dsn: None,
                });
                pkt.size = 1000;
                pkt.flow = FlowId(1);
                pkt.ttl = 0;
                pkt.route = Some(self.route.clone());
                ctx.forward(pkt);
            }
            fn name(&self) -> &str {
                "shot"
            }
            fn as_any_mut(&mut self) -> &mut dyn Any {
                self
            }
        }
        let src = sim.add_node(Box::new(ExpiredShot { route }));
        sim.schedule_node(src, 0, 0);
        sim.run_to_completion();

        assert_eq!(
            sim.node_as::<LosslessQueue>(q).unwrap().counters().dropped,
            1
        );
        assert_eq!(sim.node_as::<Sink>(dst).unwrap().received, 0);
    }
}
