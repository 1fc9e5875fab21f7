use std::any::Any;
use std::collections::VecDeque;

use pktsim_abstract::{
    Linkspeed, NodeSnapshot, Packet, PacketKind, PacketSink, QueueCounters, RedParams, SimContext,
    TraceEventKind,
};
use rand::Rng;
use rand::rngs::StdRng;
use tracing::warn;

use crate::queue::{QueueCore, ttl_expired};

/// Random early detection over the smoothed queue occupancy. Below
/// `min_thresh` every arrival is accepted; between the thresholds the
/// drop (or mark) probability rises linearly to `max_prob`; above
/// `max_thresh` every arrival is dropped or marked. The tail of the
/// physical buffer still drop-tails.
///
/// The random decision draws from a per-queue `StdRng` seeded from
/// `RedParams::seed`, so runs reproduce exactly for a given seed.
pub struct RedQueue {
    core: QueueCore,
    buffer: VecDeque<Packet>,
    params: RedParams,
    avg: f64,
    rng: StdRng,
}

enum RedVerdict {
    Accept,
    Congested,
}

impl RedQueue {
    pub fn new(
        rate: Linkspeed,
        max_bytes: u64,
        params: RedParams,
        name: impl Into<String>,
    ) -> Self {
        use rand::SeedableRng;
        assert!(
            params.min_thresh < params.max_thresh,
            "RED thresholds inverted"
        );
        assert!(
            (0.0..=1.0).contains(&params.max_prob) && (0.0..=1.0).contains(&params.ewma_weight),
            "RED probabilities out of range"
        );
        let rng = StdRng::seed_from_u64(params.seed);
        Self {
            core: QueueCore::new(rate, max_bytes, name),
            buffer: VecDeque::new(),
            params,
            avg: 0.0,
            rng,
        }
    }

    pub fn counters(&self) -> &QueueCounters {
        &self.core.stats
    }

    pub fn average_queue(&self) -> f64 {
        self.avg
    }

    fn verdict(&mut self) -> RedVerdict {
        let p = &self.params;
        if self.avg < p.min_thresh as f64 {
            return RedVerdict::Accept;
        }
        if self.avg >= p.max_thresh as f64 {
            return RedVerdict::Congested;
        }
        let fraction =
            (self.avg - p.min_thresh as f64) / (p.max_thresh as f64 - p.min_thresh as f64);
        if self.rng.random::<f64>() < fraction * p.max_prob {
            RedVerdict::Congested
        } else {
            RedVerdict::Accept
        }
    }
}

impl PacketSink for RedQueue {
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

        // EWMA over the instantaneous occupancy seen by this arrival
        let w = self.params.ewma_weight;
        self.avg = (1.0 - w) * self.avg + w * self.core.bytes as f64;

        if let RedVerdict::Congested = self.verdict() {
            if self.params.ecn_marking && pkt.kind() == PacketKind::TcpData {
                pkt.ecn = true;
                self.core.stats.marked += 1;
                ctx.trace(TraceEventKind::QueueMark { flow: pkt.flow });
            } else {
                self.core.drop_arriving(pkt, ctx);
                return;
            }
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
    use crate::testutil::CaptureCtx;
    use pktsim_abstract::{FlowId, PacketHeader, mbps};

    fn data(ctx: &mut CaptureCtx, size: u64) -> Packet {
        let mut pkt = ctx.pool.alloc(PacketHeader::TcpData {
            seqno: 0,
            syn: false,
            ts: 0,
            retransmit: false,
            dsn: None,
        });
        pkt.size = size;
        pkt.flow = FlowId(1);
        pkt
    }

    fn params(seed: u64) -> RedParams {
        RedParams {
            min_thresh: 2_000,
            max_thresh: 8_000,
            // deterministic: only the above-max region is congested
            max_prob: 0.0,
            ewma_weight: 1.0, // track the instantaneous queue for the test
            ecn_marking: false,
            seed,
        }
    }

    #[test]
    fn below_min_threshold_never_drops() {
        let mut ctx = CaptureCtx::new();
        let mut q = RedQueue::new(mbps(10), 100_000, params(7), "red");
        for _ in 0..2 {
            let pkt = data(&mut ctx, 500);
            q.receive(pkt, &mut ctx);
        }
        assert_eq!(q.counters().dropped, 0);
        assert_eq!(q.counters().enqueued, 2);
    }

    #[test]
    fn above_max_threshold_always_drops() {
        let mut ctx = CaptureCtx::new();
        let mut q = RedQueue::new(mbps(10), 100_000, params(7), "red");
        // fill past max_thresh
        for _ in 0..9 {
            let pkt = data(&mut ctx, 1000);
            q.receive(pkt, &mut ctx);
        }
        // avg is now >= 8000 with weight 1.0; every further arrival drops
        let before = q.counters().dropped;
        for _ in 0..5 {
            let pkt = data(&mut ctx, 1000);
            q.receive(pkt, &mut ctx);
        }
        assert_eq!(q.counters().dropped, before + 5);
    }

    #[test]
    fn same_seed_same_decisions() {
        let run = |seed: u64| {
            let mut ctx = CaptureCtx::new();
            let mut p = params(seed);
            p.max_prob = 1.0; // exercise the random region
            let mut q = RedQueue::new(mbps(10), 100_000, p, "red");
            for _ in 0..40 {
                let pkt = data(&mut ctx, 500);
                q.receive(pkt, &mut ctx);
            }
            q.counters().dropped
        };
        assert_eq!(run(42), run(42));
    }

    #[test]
    fn marking_replaces_dropping_for_data() {
        let mut ctx = CaptureCtx::new();
        let mut p = params(7);
        p.ecn_marking = true;
        let mut q = RedQueue::new(mbps(10), 100_000, p, "red");
        for _ in 0..12 {
            let pkt = data(&mut ctx, 1000);
            q.receive(pkt, &mut ctx);
        }
        assert_eq!(q.counters().dropped, 0);
        assert!(q.counters().marked > 0);
    }
}
