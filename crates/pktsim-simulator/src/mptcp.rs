use std::any::Any;
use std::collections::{BTreeMap, VecDeque};

use pktsim_abstract::{
    CouplingAlgo, FlowId, MptcpConfig, NodeSnapshot, Packet, PacketHeader, PacketSink, SimContext,
    SimTime, TraceEventKind, time,
};
use tracing::warn;

use crate::tcp::{AckSignal, TcpSink, TcpSource};

/// Start token for the coordinator itself; subflow tokens are
/// `(slot + 1) << 8 | tcp_token` and can never collide with it.
pub const TOKEN_MPTCP_START: u32 = u32::MAX;

const SUBFLOW_SHIFT: u32 = 8;

fn subflow_token_base(slot: usize) -> u32 {
    ((slot as u32) + 1) << SUBFLOW_SHIFT
}

/// Linked-increases alpha:
/// `alpha = w * max_i(w_i / rtt_i^2) / (sum_j w_j / rtt_j)^2`, rtt in
/// seconds. Falls back to 1 until every subflow has an RTT sample.
pub(crate) fn lia_alpha(cwnds: &[u64], rtts: &[SimTime]) -> f64 {
    debug_assert_eq!(cwnds.len(), rtts.len());
    if cwnds.is_empty() || rtts.iter().any(|r| *r == 0) {
        return 1.0;
    }
    let w: f64 = cwnds.iter().map(|c| *c as f64).sum();
    let mut best = 0.0_f64;
    let mut denom = 0.0_f64;
    for (c, r) in cwnds.iter().zip(rtts) {
        let rtt = time::as_secs(*r);
        best = best.max(*c as f64 / (rtt * rtt));
        denom += *c as f64 / rtt;
    }
    if denom == 0.0 {
        return 1.0;
    }
    w * best / (denom * denom)
}

/// Per-ACK congestion-avoidance increment for subflow `i`, in bytes.
pub(crate) fn coupling_increment(
    algo: CouplingAlgo,
    alpha: f64,
    mss: u64,
    cwnds: &[u64],
    i: usize,
) -> f64 {
    let m = mss as f64;
    let wi = cwnds[i] as f64;
    let w: f64 = cwnds.iter().map(|c| *c as f64).sum();
    match algo {
        CouplingAlgo::Uncoupled => m * m / wi,
        CouplingAlgo::FullyCoupled => m * m / w,
        // retains per-subflow responsiveness but never beats single Reno
        CouplingAlgo::CoupledInc => (alpha * m * m / w).max(m * m / (2.0 * wi)).min(m * m / wi),
        CouplingAlgo::CoupledTcp => (alpha * m * m / w).min(m * m / wi),
        CouplingAlgo::CoupledEpsilon { epsilon } => {
            m * m * wi.powf(1.0 - epsilon) / w.powf(2.0 - epsilon)
        }
    }
}

/// MPTCP source: owns its TCP subflows, schedules connection-level data
/// across them in mss chunks (DSN-tagged), enforces the shared receive
/// window and applies the configured coupling rule to every
/// congestion-avoidance increase. Loss response stays subflow-local.
pub struct MptcpSource {
    name: String,
    cfg: MptcpConfig,
    subflows: Vec<Option<TcpSource>>,
    /// Next fresh connection-level byte offset to hand out.
    next_dsn: u64,
    /// Chunks orphaned by a removed subflow, served before fresh data.
    requeue: VecDeque<u64>,
    chunk: u64,
    alpha: f64,
    alpha_updated: SimTime,
}

impl MptcpSource {
    pub fn new(cfg: MptcpConfig, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cfg,
            subflows: Vec::new(),
            next_dsn: 0,
            requeue: VecDeque::new(),
            chunk: 0,
            alpha: 1.0,
            alpha_updated: 0,
        }
    }

    /// Register a subflow before the connection starts. Chunking follows
    /// the first subflow's mss.
    pub fn push_subflow(&mut self, mut subflow: TcpSource) -> usize {
        let slot = self.subflows.len();
        subflow.set_coupled(subflow_token_base(slot));
        if self.chunk == 0 {
            self.chunk = subflow.mss();
        }
        self.subflows.push(Some(subflow));
        slot
    }

    /// Install a registered subflow's forward and reverse routes.
    pub fn connect_subflow(
        &mut self,
        slot: usize,
        route: std::rc::Rc<pktsim_abstract::Route>,
        reverse: std::rc::Rc<pktsim_abstract::Route>,
    ) {
        if let Some(sf) = self.subflows.get_mut(slot).and_then(Option::as_mut) {
            sf.connect(route, reverse);
        }
    }

    /// Attach a subflow to a running connection; it starts in slow start
    /// from one mss, per subflow-management rules.
    pub fn add_subflow_live(&mut self, mut subflow: TcpSource, ctx: &mut dyn SimContext) -> usize {
        subflow.set_cwnd(subflow.mss());
        let slot = self.push_subflow(subflow);
        let sf = self.subflows[slot].as_mut().expect("just pushed");
        sf.start(ctx);
        self.pump(ctx);
        slot
    }

    /// Detach a subflow; its outstanding chunks are requeued onto the
    /// survivors. Removing the last subflow resets the connection.
    pub fn remove_subflow(&mut self, slot: usize, ctx: &mut dyn SimContext) {
        let Some(mut sf) = self.subflows.get_mut(slot).and_then(Option::take) else {
            warn!(name = %self.name, slot, "removing unknown subflow");
            return;
        };
        sf.abort(ctx);
        for dsn in sf.take_unacked_dsns() {
            self.requeue.push_back(dsn);
        }
        if self.subflows.iter().all(Option::is_none) {
            warn!(name = %self.name, "last subflow removed, connection reset");
            self.requeue.clear();
            return;
        }
        self.pump(ctx);
    }

    pub fn subflow_count(&self) -> usize {
        self.subflows.iter().flatten().count()
    }

    pub fn subflow_cwnds(&self) -> Vec<u64> {
        self.subflows.iter().flatten().map(|s| s.cwnd()).collect()
    }

    pub fn aggregate_cwnd(&self) -> u64 {
        self.subflows.iter().flatten().map(|s| s.cwnd()).sum()
    }

    pub fn subflow_sent(&self) -> Vec<u64> {
        self.subflows
            .iter()
            .flatten()
            .map(|s| s.packets_sent())
            .collect()
    }

    fn total_in_flight(&self) -> u64 {
        self.subflows
            .iter()
            .flatten()
            .map(|s| s.bytes_in_flight())
            .sum()
    }

    /// Give every subflow a chance to transmit, bounded by the shared
    /// receive window. Chunk allocation prefers requeued data.
    fn pump(&mut self, ctx: &mut dyn SimContext) {
        let mut budget = self
            .cfg
            .receive_window
            .saturating_sub(self.total_in_flight());
        let chunk = self.chunk;
        let Self {
            subflows,
            next_dsn,
            requeue,
            ..
        } = self;
        for slot in subflows.iter_mut() {
            let Some(sf) = slot else { continue };
            if budget == 0 {
                break;
            }
            let mut alloc = || -> Option<u64> {
                if let Some(d) = requeue.pop_front() {
                    return Some(d);
                }
                let d = *next_dsn;
                *next_dsn += chunk;
                Some(d)
            };
            sf.send_available(ctx, &mut Some(&mut budget), &mut Some(&mut alloc));
        }
    }

    fn refresh_alpha(&mut self, acked_slot: usize, ctx: &mut dyn SimContext) {
        let (cwnds, rtts): (Vec<u64>, Vec<SimTime>) = self
            .subflows
            .iter()
            .flatten()
            .map(|s| (s.cwnd(), s.srtt()))
            .unzip();
        let cadence = self.subflows[acked_slot]
            .as_ref()
            .map_or(0, |s| s.srtt());
        let due = self.cfg.alpha_per_ack || ctx.now() >= self.alpha_updated + cadence;
        if due {
            self.alpha = lia_alpha(&cwnds, &rtts);
            self.alpha_updated = ctx.now();
        }
    }

    fn apply_increase(&mut self, slot: usize) {
        // index of `slot` among the live subflows
        let mut live_index = 0;
        for s in self.subflows.iter().take(slot) {
            if s.is_some() {
                live_index += 1;
            }
        }
        let cwnds = self.subflow_cwnds();
        let sf = self.subflows[slot].as_mut().expect("live subflow");
        let inc = coupling_increment(self.cfg.algo, self.alpha, sf.mss(), &cwnds, live_index);
        let inc = (inc.round() as u64).max(1);
        sf.set_cwnd(sf.cwnd() + inc);
    }

    fn slot_of_flow(&self, flow: FlowId) -> Option<usize> {
        self.subflows
            .iter()
            .position(|s| s.as_ref().is_some_and(|sf| sf.flow() == flow))
    }
}

impl PacketSink for MptcpSource {
    fn receive(&mut self, pkt: Packet, ctx: &mut dyn SimContext) {
        let PacketHeader::TcpAck {
            ackno,
            ref sack,
            wnd,
            ts_echo,
            retx_echo,
            ecn_echo,
            syn,
        } = pkt.header
        else {
            warn!(name = %self.name, "unexpected packet at MPTCP source");
            ctx.release_packet(pkt);
            return;
        };
        let Some(slot) = self.slot_of_flow(pkt.flow) else {
            warn!(name = %self.name, flow = ?pkt.flow, "ACK for unknown subflow");
            ctx.release_packet(pkt);
            return;
        };
        let sack = sack.clone();
        ctx.release_packet(pkt);

        let signal = {
            let sf = self.subflows[slot].as_mut().expect("slot checked");
            sf.process_ack(ackno, sack, wnd, ts_echo, retx_echo, ecn_echo, syn, ctx)
        };
        match signal {
            AckSignal::CaIncrease => {
                self.refresh_alpha(slot, ctx);
                self.apply_increase(slot);
                ctx.trace(TraceEventKind::CwndSample {
                    cwnd: self.aggregate_cwnd(),
                    ssthresh: 0,
                });
            }
            AckSignal::Loss => {
                // subflow already halved itself; the aggregate follows
                self.refresh_alpha(slot, ctx);
            }
            AckSignal::None => {}
        }
        self.pump(ctx);
        if ctx.log_enabled() {
            ctx.record_metric("aggregate_cwnd", self.aggregate_cwnd() as f64);
        }
    }

    fn do_next_event(&mut self, token: u32, ctx: &mut dyn SimContext) {
        if token == TOKEN_MPTCP_START {
            for slot in self.subflows.iter_mut() {
                if let Some(sf) = slot {
                    sf.start(ctx);
                }
            }
            self.pump(ctx);
            return;
        }
        let slot = (token >> SUBFLOW_SHIFT) as usize;
        if slot == 0 {
            warn!(name = %self.name, token, "event token without a subflow slot");
            return;
        }
        let slot = slot - 1;
        if let Some(sf) = self.subflows.get_mut(slot).and_then(Option::as_mut) {
            sf.dispatch_token(token & 0xff, ctx);
        }
        self.pump(ctx);
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn snapshot(&self) -> Option<NodeSnapshot> {
        Some(NodeSnapshot::TcpConnection {
            name: self.name.clone(),
            cwnd: self.aggregate_cwnd(),
            ssthresh: 0,
            srtt: self
                .subflows
                .iter()
                .flatten()
                .map(|s| s.srtt())
                .max()
                .unwrap_or(0),
            packets_sent: 0,
            retransmits: 0,
            rtos: 0,
            rto: 0,
        })
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// MPTCP sink: per-subflow TCP sinks feeding a connection-level reorder
/// buffer keyed by DSN. Application delivery is in connection order, and
/// the advertised window is the shared budget minus reorder occupancy.
pub struct MptcpSink {
    name: String,
    conn_flow: FlowId,
    rcv_window: u64,
    subsinks: Vec<Option<TcpSink>>,
    /// dsn -> chunk bytes, waiting for the in-order point to catch up.
    reorder: BTreeMap<u64, u64>,
    reorder_bytes: u64,
    next_dsn: u64,
}

impl MptcpSink {
    pub fn new(cfg: &MptcpConfig, conn_flow: FlowId, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            conn_flow,
            rcv_window: cfg.receive_window,
            subsinks: Vec::new(),
            reorder: BTreeMap::new(),
            reorder_bytes: 0,
            next_dsn: 0,
        }
    }

    pub fn push_subsink(&mut self, sink: TcpSink) -> usize {
        self.subsinks.push(Some(sink));
        self.subsinks.len() - 1
    }

    /// Install a subsink's reverse (ACK) route.
    pub fn connect_subsink(&mut self, slot: usize, reverse: std::rc::Rc<pktsim_abstract::Route>) {
        if let Some(sk) = self.subsinks.get_mut(slot).and_then(Option::as_mut) {
            sk.connect(reverse);
        }
    }

    pub fn remove_subsink(&mut self, slot: usize) {
        if let Some(s) = self.subsinks.get_mut(slot) {
            *s = None;
        }
    }

    pub fn conn_delivered_through(&self) -> u64 {
        self.next_dsn
    }

    fn slot_of_flow(&self, flow: FlowId) -> Option<usize> {
        self.subsinks
            .iter()
            .position(|s| s.as_ref().is_some_and(|sk| sk.flow() == flow))
    }

    fn admit(&mut self, dsn: Option<u64>, bytes: u64, ctx: &mut dyn SimContext) {
        let Some(dsn) = dsn else {
            // a segment without a DSN cannot be reordered; count it through
            warn!(name = %self.name, "subflow segment without a DSN");
            ctx.delivered(self.conn_flow, bytes, 1);
            return;
        };
        if crate::tcp::seq_lt(dsn, self.next_dsn) || self.reorder.contains_key(&dsn) {
            return; // duplicate chunk, e.g. re-sent on another path
        }
        self.reorder.insert(dsn, bytes);
        self.reorder_bytes += bytes;
        // drain everything now contiguous
        while let Some((&d, &b)) = self.reorder.first_key_value() {
            if crate::tcp::seq_lt(self.next_dsn, d) {
                break;
            }
            self.reorder.remove(&d);
            self.reorder_bytes -= b;
            ctx.trace(TraceEventKind::PacketDelivered {
                flow: self.conn_flow,
                bytes: b,
            });
            ctx.delivered(self.conn_flow, b, 1);
            self.next_dsn = self.next_dsn.max(d + b);
        }
    }
}

impl PacketSink for MptcpSink {
    fn receive(&mut self, pkt: Packet, ctx: &mut dyn SimContext) {
        if !matches!(pkt.header, PacketHeader::TcpData { .. }) {
            warn!(name = %self.name, "unexpected packet at MPTCP sink");
            ctx.release_packet(pkt);
            return;
        }
        let Some(slot) = self.slot_of_flow(pkt.flow) else {
            warn!(name = %self.name, flow = ?pkt.flow, "data for unknown subflow");
            ctx.release_packet(pkt);
            return;
        };
        let shared_wnd = self.rcv_window.saturating_sub(self.reorder_bytes);
        let mut delivered: Vec<(Option<u64>, u64)> = Vec::new();
        {
            let sink = self.subsinks[slot].as_mut().expect("slot checked");
            sink.set_window_override(shared_wnd);
            sink.process_data(pkt, ctx, Some(&mut delivered));
        }
        for (dsn, bytes) in delivered {
            self.admit(dsn, bytes, ctx);
        }
    }

    fn do_next_event(&mut self, _token: u32, _ctx: &mut dyn SimContext) {}

    fn name(&self) -> &str {
        &self.name
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
