use std::any::Any;
use std::collections::VecDeque;

use pktsim_abstract::{
    Linkspeed, NodeSnapshot, Packet, PacketKind, PacketSink, PriorityParams, QueueCounters,
    SimContext,
};
use tracing::warn;

use crate::queue::{QueueCore, ttl_expired};

struct Class {
    buffer: VecDeque<Packet>,
    bytes: u64,
    quota: Option<u64>,
    served: u64,
}

/// Strict-priority queue: class 0 is served to completion before class 1,
/// and so on, all classes sharing one byte budget. An optional per-class
/// byte quota bounds starvation: a class that has served its quota while
/// lower classes wait yields to them, and quotas reset once every waiting
/// class is exhausted or the queue drains.
pub struct PriorityQueue {
    core: QueueCore,
    classes: Vec<Class>,
    serving: Option<usize>,
}

impl PriorityQueue {
    pub fn new(
        rate: Linkspeed,
        max_bytes: u64,
        params: PriorityParams,
        name: impl Into<String>,
    ) -> Self {
        assert!(
            !params.class_quotas.is_empty(),
            "priority queue needs at least one class"
        );
        let classes = params
            .class_quotas
            .iter()
            .map(|quota| Class {
                buffer: VecDeque::new(),
                bytes: 0,
                quota: *quota,
                served: 0,
            })
            .collect();
        Self {
            core: QueueCore::new(rate, max_bytes, name),
            classes,
            serving: None,
        }
    }

    pub fn counters(&self) -> &QueueCounters {
        &self.core.stats
    }

    pub fn class_backlog(&self, class: usize) -> u64 {
        self.classes.get(class).map_or(0, |c| c.bytes)
    }

    fn class_of(&self, pkt: &Packet) -> usize {
        (pkt.priority as usize).min(self.classes.len() - 1)
    }

    fn pick_class(&mut self) -> Option<usize> {
        let mut any_waiting = false;
        for (i, c) in self.classes.iter().enumerate() {
            if c.buffer.is_empty() {
                continue;
            }
            any_waiting = true;
            if c.quota.is_none_or(|q| c.served < q) {
                return Some(i);
            }
        }
        if !any_waiting {
            return None;
        }
        // every waiting class exhausted its quota: new cycle
        for c in &mut self.classes {
            c.served = 0;
        }
        self.classes.iter().position(|c| !c.buffer.is_empty())
    }

    fn maybe_start(&mut self, ctx: &mut dyn SimContext) {
        if self.core.busy || self.core.paused {
            return;
        }
        if let Some(class) = self.pick_class() {
            self.serving = Some(class);
            let head = self.classes[class].buffer.front().expect("picked").size;
            self.core.start_service(head, ctx);
        } else {
            // drained; quotas start fresh
            for c in &mut self.classes {
                c.served = 0;
            }
        }
    }
}

impl PacketSink for PriorityQueue {
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
        let class = self.class_of(&pkt);
        self.core.note_enqueue(&pkt, ctx);
        self.classes[class].bytes += pkt.size;
        self.classes[class].buffer.push_back(pkt);
        self.maybe_start(ctx);
    }

    fn do_next_event(&mut self, _token: u32, ctx: &mut dyn SimContext) {
        let class = self.serving.take().expect("completion with no class in service");
        let pkt = self.classes[class]
            .buffer
            .pop_front()
            .expect("service completion with an empty class");
        self.classes[class].bytes -= pkt.size;
        self.classes[class].served += pkt.size;
        self.core.note_dequeue(&pkt, ctx);
        ctx.forward(pkt);
        self.maybe_start(ctx);
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
