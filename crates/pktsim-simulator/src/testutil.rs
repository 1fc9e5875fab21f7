//! Shared harness for unit tests: a context that captures everything a
//! component emits so its handlers can be driven directly.

use pktsim_abstract::{
    EventHandle, FlowId, Packet, PacketHeader, PacketPool, SimContext, SimTime, SinkId,
    TraceEventKind,
};

pub(crate) struct CaptureCtx {
    pub now: SimTime,
    pub pool: PacketPool,
    pub sent: Vec<Packet>,
    pub scheduled: Vec<(SimTime, u32)>,
    pub cancelled: u64,
    pub dropped: u64,
    pub delivered_bytes: u64,
    next_seq: u64,
}

impl CaptureCtx {
    pub fn new() -> Self {
        Self {
            now: 0,
            pool: PacketPool::new(1 << 16),
            sent: Vec::new(),
            scheduled: Vec::new(),
            cancelled: 0,
            dropped: 0,
            delivered_bytes: 0,
            next_seq: 0,
        }
    }

    pub fn drain(&mut self) -> Vec<Packet> {
        std::mem::take(&mut self.sent)
    }

    pub fn release_all(&mut self) {
        for pkt in std::mem::take(&mut self.sent) {
            self.pool.release(pkt);
        }
    }
}

impl SimContext for CaptureCtx {
    fn now(&self) -> SimTime {
        self.now
    }

    fn schedule_at(&mut self, at: SimTime, token: u32) -> EventHandle {
        self.scheduled.push((at, token));
        self.next_seq += 1;
        EventHandle::new(self.next_seq)
    }

    fn schedule_in(&mut self, delay: SimTime, token: u32) -> EventHandle {
        self.schedule_at(self.now + delay, token)
    }

    fn cancel(&mut self, _handle: EventHandle) {
        self.cancelled += 1;
    }

    fn trigger_now(&mut self, _target: SinkId, _token: u32) {}

    fn alloc_packet(&mut self, header: PacketHeader) -> Packet {
        self.pool.alloc(header)
    }

    fn release_packet(&mut self, pkt: Packet) {
        self.pool.release(pkt);
    }

    fn forward(&mut self, pkt: Packet) {
        self.sent.push(pkt);
    }

    fn deliver_to(&mut self, _to: SinkId, pkt: Packet) {
        self.sent.push(pkt);
    }

    fn drop_packet(&mut self, pkt: Packet) {
        self.dropped += 1;
        self.pool.release(pkt);
    }

    fn delivered(&mut self, _flow: FlowId, bytes: u64, _packets: u64) {
        self.delivered_bytes += bytes;
    }

    fn trace(&mut self, _kind: TraceEventKind) {}

    fn record_metric(&mut self, _name: &str, _value: f64) {}

    fn log_enabled(&self) -> bool {
        false
    }
}
