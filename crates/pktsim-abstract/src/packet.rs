use std::rc::Rc;

use crate::flow::FlowId;
use crate::route::Route;
use crate::time::SimTime;

pub const DEFAULT_TTL: u8 = 64;

/// Wire size of a PFC pause frame.
pub const PAUSE_FRAME_BYTES: u64 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    TcpData,
    TcpAck,
    Pause,
}

/// Protocol headers as a tagged sum. Only the fields the simulation reasons
/// about are modelled; everything else is folded into the wire size.
#[derive(Debug, Clone, PartialEq)]
pub enum PacketHeader {
    TcpData {
        /// First byte offset carried by this segment.
        seqno: u64,
        syn: bool,
        /// Send timestamp, echoed back by the sink for RTT estimation.
        ts: SimTime,
        retransmit: bool,
        /// Connection-level data sequence number when the segment belongs
        /// to an MPTCP subflow.
        dsn: Option<u64>,
    },
    TcpAck {
        /// Cumulative ack: next byte offset expected in order.
        ackno: u64,
        /// Up to three selective-ack ranges `[start, end)`.
        sack: Vec<(u64, u64)>,
        /// Advertised receive window in bytes.
        wnd: u64,
        ts_echo: SimTime,
        retx_echo: bool,
        ecn_echo: bool,
        syn: bool,
    },
    Pause {
        /// true = pause upstream service, false = resume.
        pause: bool,
    },
}

impl PacketHeader {
    pub fn kind(&self) -> PacketKind {
        match self {
            PacketHeader::TcpData { .. } => PacketKind::TcpData,
            PacketHeader::TcpAck { .. } => PacketKind::TcpAck,
            PacketHeader::Pause { .. } => PacketKind::Pause,
        }
    }
}

/// The unit of traffic. Ownership is linear: a packet is moved hop to hop
/// along its route and finally released back to the pool at the terminal
/// sink or wherever it is dropped.
#[derive(Debug, Clone)]
pub struct Packet {
    pub header: PacketHeader,
    /// Wire size in bytes, simulated headers included.
    pub size: u64,
    pub flow: FlowId,
    pub route: Option<Rc<Route>>,
    /// Index of the next sink on `route` to visit.
    pub hop: usize,
    pub reverse_route: Option<Rc<Route>>,
    /// IP-level congestion-experienced mark, set by marking queues.
    pub ecn: bool,
    pub ttl: u8,
    /// Service class for priority queues; 0 is the highest class.
    pub priority: u8,
    /// Set by lossless/trim variants when a packet is turned around
    /// instead of dropped.
    pub bounced: bool,
    pub sent_time: SimTime,
}

impl Packet {
    pub fn kind(&self) -> PacketKind {
        self.header.kind()
    }

    pub fn next_hop(&self) -> Option<crate::route::SinkId> {
        self.route.as_ref().and_then(|r| r.hop(self.hop))
    }

    fn blank(header: PacketHeader) -> Self {
        Self {
            header,
            size: 0,
            flow: FlowId(0),
            route: None,
            hop: 0,
            reverse_route: None,
            ecn: false,
            ttl: DEFAULT_TTL,
            priority: 0,
            bounced: false,
            sent_time: 0,
        }
    }
}

/// Per-kind free lists with a shared ceiling on live packets. Growing past
/// the ceiling is resource exhaustion and fails loudly rather than letting a
/// pathological scenario eat unbounded memory.
#[derive(Debug)]
pub struct PacketPool {
    free: Vec<Vec<Packet>>,
    live: usize,
    peak: usize,
    ceiling: usize,
}

fn kind_slot(kind: PacketKind) -> usize {
    match kind {
        PacketKind::TcpData => 0,
        PacketKind::TcpAck => 1,
        PacketKind::Pause => 2,
    }
}

impl PacketPool {
    pub fn new(ceiling: usize) -> Self {
        assert!(ceiling > 0, "packet pool ceiling must be positive");
        Self {
            free: vec![Vec::new(), Vec::new(), Vec::new()],
            live: 0,
            peak: 0,
            ceiling,
        }
    }

    /// Hand out a recycled or fresh packet of the given kind, with `header`
    /// installed and every other field reset to its blank state.
    pub fn alloc(&mut self, header: PacketHeader) -> Packet {
        if self.live >= self.ceiling {
            panic!(
                "packet pool exhausted: {} live packets at the configured ceiling of {}; \
                 raise SimSettings::packet_ceiling or shorten the scenario",
                self.live, self.ceiling
            );
        }
        self.live += 1;
        self.peak = self.peak.max(self.live);
        match self.free[kind_slot(header.kind())].pop() {
            Some(mut pkt) => {
                pkt.header = header;
                pkt.size = 0;
                pkt.flow = FlowId(0);
                pkt.route = None;
                pkt.hop = 0;
                pkt.reverse_route = None;
                pkt.ecn = false;
                pkt.ttl = DEFAULT_TTL;
                pkt.priority = 0;
                pkt.bounced = false;
                pkt.sent_time = 0;
                pkt
            }
            None => Packet::blank(header),
        }
    }

    /// Return a packet to its kind's free list. Linear ownership means a
    /// double release cannot be expressed; the caller gives the packet up.
    pub fn release(&mut self, mut pkt: Packet) {
        debug_assert!(self.live > 0, "pool release with no live packets");
        self.live -= 1;
        pkt.route = None;
        pkt.reverse_route = None;
        let slot = kind_slot(pkt.kind());
        self.free[slot].push(pkt);
    }

    pub fn live(&self) -> usize {
        self.live
    }

    pub fn peak(&self) -> usize {
        self.peak
    }
}
