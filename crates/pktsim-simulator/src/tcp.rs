use std::any::Any;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use pktsim_abstract::{
    EventHandle, FlowId, NodeSnapshot, Packet, PacketHeader, PacketSink, Route, SimContext,
    SimTime, TcpConfig, TraceEventKind,
};
use tracing::{debug, warn};

pub const TOKEN_TCP_START: u32 = 0;
pub const TOKEN_TCP_RTO: u32 = 1;

/// Wrap-safe sequence comparison: `a < b` iff `(i64)(a - b) < 0`.
pub fn seq_lt(a: u64, b: u64) -> bool {
    (a.wrapping_sub(b) as i64) < 0
}

pub fn seq_geq(a: u64, b: u64) -> bool {
    !seq_lt(a, b)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpState {
    Closed,
    SynSent,
    Established,
    FastRecovery,
}

impl TcpState {
    fn as_str(self) -> &'static str {
        match self {
            TcpState::Closed => "closed",
            TcpState::SynSent => "syn_sent",
            TcpState::Established => "established",
            TcpState::FastRecovery => "fast_recovery",
        }
    }
}

/// What an ACK did to the congestion state; consumed by the MPTCP
/// coordinator, ignored by a standalone source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AckSignal {
    None,
    /// Congestion-avoidance ACK on a coupled subflow: the coordinator
    /// owns the increase.
    CaIncrease,
    /// Entered fast recovery (local halving already applied).
    Loss,
}

/// Reno-style TCP source with SACK-assisted recovery and Jacobson/Karels
/// RTO estimation. Sequence numbers are byte offsets.
pub struct TcpSource {
    name: String,
    cfg: TcpConfig,
    flow: FlowId,
    route: Option<Rc<Route>>,
    reverse_route: Option<Rc<Route>>,
    state: TcpState,

    highest_sent: u64,
    last_acked: u64,
    recover: u64,
    dup_acks: u32,
    cwnd: u64,
    ssthresh: u64,

    srtt: SimTime, // 0 until the first sample
    mdev: SimTime,
    rto: SimTime,
    backoff: u32,
    rto_handle: Option<EventHandle>,

    peer_wnd: u64,
    sacked: Vec<(u64, u64)>,
    hole_cursor: u64,
    ecn_recover: u64,

    /// MPTCP subflow mode: congestion-avoidance increases are computed by
    /// the owning coordinator.
    coupled: bool,
    token_base: u32,
    /// mss-chunk map from subflow sequence to connection-level DSN.
    dsn_map: VecDeque<(u64, u64)>,

    packets_sent: u64,
    retransmits: u64,
    rtos: u64,
}

impl TcpSource {
    pub fn new(cfg: TcpConfig, flow: FlowId, name: impl Into<String>) -> Self {
        let cwnd = cfg.init_cwnd_pkts * cfg.mss;
        let ssthresh = cfg.init_ssthresh;
        let rto = cfg.init_rto;
        let peer_wnd = cfg.receive_window;
        Self {
            name: name.into(),
            cfg,
            flow,
            route: None,
            reverse_route: None,
            state: TcpState::Closed,
            highest_sent: 0,
            last_acked: 0,
            recover: 0,
            dup_acks: 0,
            cwnd,
            ssthresh,
            srtt: 0,
            mdev: 0,
            rto,
            backoff: 0,
            rto_handle: None,
            peer_wnd,
            sacked: Vec::new(),
            hole_cursor: 0,
            ecn_recover: 0,
            coupled: false,
            token_base: 0,
            dsn_map: VecDeque::new(),
            packets_sent: 0,
            retransmits: 0,
            rtos: 0,
        }
    }

    /// Install forward and reverse routes; the wiring layer schedules the
    /// start event separately.
    pub fn connect(&mut self, route: Rc<Route>, reverse: Rc<Route>) {
        self.route = Some(route);
        self.reverse_route = Some(reverse);
    }

    pub(crate) fn set_coupled(&mut self, token_base: u32) {
        self.coupled = true;
        self.token_base = token_base;
    }

    pub fn flow(&self) -> FlowId {
        self.flow
    }

    pub fn cwnd(&self) -> u64 {
        self.cwnd
    }

    pub(crate) fn set_cwnd(&mut self, cwnd: u64) {
        self.cwnd = cwnd.max(self.cfg.mss);
    }

    pub fn ssthresh(&self) -> u64 {
        self.ssthresh
    }

    pub fn srtt(&self) -> SimTime {
        self.srtt
    }

    pub fn state(&self) -> TcpState {
        self.state
    }

    pub fn mss(&self) -> u64 {
        self.cfg.mss
    }

    pub fn bytes_in_flight(&self) -> u64 {
        self.highest_sent - self.last_acked
    }

    pub fn packets_sent(&self) -> u64 {
        self.packets_sent
    }

    fn seq_base(&self) -> u64 {
        if self.cfg.handshake { 1 } else { 0 }
    }

    fn send_limit(&self) -> Option<u64> {
        self.cfg.flow_bytes.map(|n| self.seq_base() + n)
    }

    fn all_data_acked(&self) -> bool {
        match self.send_limit() {
            Some(end) => seq_geq(self.last_acked, end),
            None => false,
        }
    }

    /// Begin the flow: straight to established, or send a SYN first when
    /// the handshake is modelled.
    pub(crate) fn start(&mut self, ctx: &mut dyn SimContext) {
        if self.cfg.handshake {
            self.set_state(TcpState::SynSent, ctx);
            self.highest_sent = 1; // SYN consumes one sequence number
            self.last_acked = 0;
            self.send_syn(false, ctx);
            self.arm_rto(ctx);
        } else {
            self.set_state(TcpState::Established, ctx);
            if !self.coupled {
                // subflows transmit only when the coordinator pumps them,
                // so every segment carries its connection-level chunk
                self.send_available(ctx, &mut None, &mut None);
            }
        }
    }

    fn send_syn(&mut self, retransmit: bool, ctx: &mut dyn SimContext) {
        let mut pkt = ctx.alloc_packet(PacketHeader::TcpData {
            seqno: 0,
            syn: true,
            ts: ctx.now(),
            retransmit,
            dsn: None,
        });
        pkt.size = self.cfg.header_bytes;
        pkt.flow = self.flow;
        pkt.route = self.route.clone();
        pkt.reverse_route = self.reverse_route.clone();
        pkt.priority = 1;
        pkt.sent_time = ctx.now();
        self.packets_sent += 1;
        if retransmit {
            self.retransmits += 1;
        }
        ctx.forward(pkt);
    }

    fn set_state(&mut self, state: TcpState, ctx: &mut dyn SimContext) {
        if self.state != state {
            self.state = state;
            ctx.trace(TraceEventKind::TcpStateChange {
                state: state.as_str(),
            });
        }
    }

    fn effective_window(&self) -> u64 {
        self.cwnd.min(self.peer_wnd)
    }

    /// Transmit new data while the window (and, for subflows, the shared
    /// receive-window budget) has room. `dsn_source` hands out
    /// connection-level chunks in subflow mode.
    pub(crate) fn send_available(
        &mut self,
        ctx: &mut dyn SimContext,
        budget: &mut Option<&mut u64>,
        dsn_source: &mut Option<&mut dyn FnMut() -> Option<u64>>,
    ) {
        if !matches!(self.state, TcpState::Established | TcpState::FastRecovery) {
            return;
        }
        let limit = self.send_limit();
        loop {
            let wnd = self.effective_window();
            let mut payload = self.cfg.mss;
            if let Some(end) = limit {
                if seq_geq(self.highest_sent, end) {
                    break;
                }
                payload = payload.min(end - self.highest_sent);
            }
            if self.bytes_in_flight() + payload > wnd {
                break;
            }
            if let Some(b) = budget {
                if **b < payload {
                    break;
                }
            }
            let dsn = match dsn_source {
                Some(alloc) => match alloc() {
                    Some(d) => {
                        self.dsn_map.push_back((self.highest_sent, d));
                        Some(d)
                    }
                    None => break, // no connection-level data for us
                },
                None => None,
            };
            let seq = self.highest_sent;
            self.emit_segment(seq, payload, false, dsn, ctx);
            self.highest_sent += payload;
            if let Some(b) = budget {
                **b -= payload;
            }
        }
        if self.bytes_in_flight() > 0 {
            self.arm_rto(ctx);
        }
    }

    fn emit_segment(
        &mut self,
        seq: u64,
        payload: u64,
        retransmit: bool,
        dsn: Option<u64>,
        ctx: &mut dyn SimContext,
    ) {
        let mut pkt = ctx.alloc_packet(PacketHeader::TcpData {
            seqno: seq,
            syn: false,
            ts: ctx.now(),
            retransmit,
            dsn,
        });
        pkt.size = payload + self.cfg.header_bytes;
        pkt.flow = self.flow;
        pkt.route = self.route.clone();
        pkt.reverse_route = self.reverse_route.clone();
        pkt.priority = 1;
        pkt.sent_time = ctx.now();
        self.packets_sent += 1;
        if retransmit {
            self.retransmits += 1;
        }
        ctx.trace(TraceEventKind::PacketSent {
            flow: self.flow,
            seqno: seq,
            bytes: pkt.size,
            retransmit,
        });
        ctx.forward(pkt);
    }

    fn retransmit_segment(&mut self, seq: u64, ctx: &mut dyn SimContext) {
        let mut payload = self.cfg.mss;
        if let Some(end) = self.send_limit() {
            if seq_geq(seq, end) {
                return;
            }
            payload = payload.min(end - seq);
        }
        let dsn = self
            .dsn_map
            .iter()
            .find(|(s, _)| *s == seq)
            .map(|(_, d)| *d);
        self.emit_segment(seq, payload, true, dsn, ctx);
        self.arm_rto(ctx);
    }

    fn arm_rto(&mut self, ctx: &mut dyn SimContext) {
        if self.rto_handle.is_none() {
            self.rto_handle = Some(ctx.schedule_in(self.rto, self.token_base | TOKEN_TCP_RTO));
        }
    }

    fn restart_rto(&mut self, ctx: &mut dyn SimContext) {
        if let Some(h) = self.rto_handle.take() {
            ctx.cancel(h);
        }
        self.arm_rto(ctx);
    }

    fn cancel_rto(&mut self, ctx: &mut dyn SimContext) {
        if let Some(h) = self.rto_handle.take() {
            ctx.cancel(h);
        }
    }

    fn update_rtt(&mut self, sample: SimTime, ctx: &mut dyn SimContext) {
        if self.srtt == 0 {
            self.srtt = sample;
            self.mdev = sample / 2;
        } else {
            // Jacobson/Karels: srtt += err/8, mdev += (|err| - mdev)/4
            let err = sample as i64 - self.srtt as i64;
            self.srtt = (self.srtt as i64 + err / 8).max(1) as SimTime;
            self.mdev = (self.mdev as i64 + (err.abs() - self.mdev as i64) / 4).max(0) as SimTime;
        }
        self.rto = (self.srtt + 4 * self.mdev).clamp(self.cfg.min_rto, self.cfg.max_rto);
        ctx.trace(TraceEventKind::RttSample {
            rtt: self.srtt,
            rto: self.rto,
        });
    }

    fn sample_cwnd(&self, ctx: &mut dyn SimContext) {
        if ctx.log_enabled() {
            ctx.trace(TraceEventKind::CwndSample {
                cwnd: self.cwnd,
                ssthresh: self.ssthresh,
            });
            ctx.record_metric("cwnd", self.cwnd as f64);
        }
    }

    /// First sequence at or above `from` not covered by the latest SACK
    /// ranges.
    fn next_hole(&self, from: u64) -> u64 {
        let mut start = from;
        let mut ranges: Vec<(u64, u64)> = self.sacked.clone();
        ranges.sort_unstable();
        for (s, e) in ranges {
            if seq_geq(start, s) && seq_lt(start, e) {
                start = e;
            }
        }
        start
    }

    /// Congestion and reliability bookkeeping for one ACK. The segments a
    /// coupled subflow may now send are pumped by the caller.
    pub(crate) fn process_ack(
        &mut self,
        ackno: u64,
        sack: Vec<(u64, u64)>,
        wnd: u64,
        ts_echo: SimTime,
        retx_echo: bool,
        ecn_echo: bool,
        syn: bool,
        ctx: &mut dyn SimContext,
    ) -> AckSignal {
        self.peer_wnd = wnd;

        if self.state == TcpState::SynSent {
            if syn && ackno >= 1 {
                self.last_acked = 1;
                self.cancel_rto(ctx);
                self.set_state(TcpState::Established, ctx);
            }
            return AckSignal::None;
        }

        if seq_lt(self.highest_sent, ackno) {
            // an ACK for data never sent: scenario anomaly, not a crash
            warn!(name = %self.name, ackno, highest = self.highest_sent,
                  "ACK beyond highest_sent, ignoring");
            return AckSignal::None;
        }

        self.sacked = sack;

        if ecn_echo && seq_geq(self.last_acked, self.ecn_recover) {
            // one multiplicative cut per window of data
            self.ssthresh = (self.cwnd / 2).max(2 * self.cfg.mss);
            self.cwnd = self.ssthresh;
            self.ecn_recover = self.highest_sent;
            self.sample_cwnd(ctx);
        }

        let mut signal = AckSignal::None;

        if seq_lt(self.last_acked, ackno) {
            // cumulative advance
            if !retx_echo && ts_echo > 0 {
                let sample = ctx.now().saturating_sub(ts_echo);
                self.update_rtt(sample, ctx); // Karn: retransmits never sampled
            }
            self.last_acked = ackno;
            self.dup_acks = 0;
            self.backoff = 0;

            match self.state {
                TcpState::FastRecovery => {
                    if seq_geq(ackno, self.recover) {
                        self.cwnd = self.ssthresh;
                        self.set_state(TcpState::Established, ctx);
                        self.sample_cwnd(ctx);
                    } else {
                        // partial ACK: the next hole is lost too
                        self.retransmit_segment(self.next_hole(ackno), ctx);
                    }
                }
                TcpState::Established => {
                    if self.cwnd < self.ssthresh {
                        self.cwnd += self.cfg.mss;
                    } else if self.coupled {
                        signal = AckSignal::CaIncrease;
                    } else {
                        self.cwnd += (self.cfg.mss * self.cfg.mss / self.cwnd).max(1);
                    }
                    self.sample_cwnd(ctx);
                }
                _ => {}
            }

            if self.last_acked == self.highest_sent {
                self.cancel_rto(ctx);
            } else {
                self.restart_rto(ctx);
            }

            while let Some((s, _)) = self.dsn_map.front() {
                if seq_lt(*s, self.last_acked) {
                    self.dsn_map.pop_front();
                } else {
                    break;
                }
            }

            if self.all_data_acked() {
                self.cancel_rto(ctx);
                self.set_state(TcpState::Closed, ctx);
            }
        } else if ackno == self.last_acked && self.bytes_in_flight() > 0 {
            self.dup_acks += 1;
            match self.state {
                TcpState::FastRecovery => {
                    // window inflation, plus SACK-guided hole repair
                    self.cwnd += self.cfg.mss;
                    let hole = self.next_hole(self.hole_cursor.max(self.last_acked));
                    if seq_lt(hole, self.recover)
                        && seq_lt(hole, self.highest_sent)
                        && hole >= self.hole_cursor
                    {
                        self.retransmit_segment(hole, ctx);
                        self.hole_cursor = hole + self.cfg.mss;
                    }
                    self.sample_cwnd(ctx);
                }
                TcpState::Established if self.dup_acks == 3 => {
                    self.enter_recovery(ctx);
                    signal = AckSignal::Loss;
                }
                _ => {}
            }
        }

        signal
    }

    fn enter_recovery(&mut self, ctx: &mut dyn SimContext) {
        self.ssthresh = (self.cwnd / 2).max(2 * self.cfg.mss);
        self.cwnd = self.ssthresh + 3 * self.cfg.mss;
        self.recover = self.highest_sent;
        self.hole_cursor = self.last_acked + self.cfg.mss;
        self.set_state(TcpState::FastRecovery, ctx);
        self.sample_cwnd(ctx);
        self.retransmit_segment(self.last_acked, ctx);
    }

    pub(crate) fn handle_rto(&mut self, ctx: &mut dyn SimContext) {
        self.rto_handle = None;
        if self.bytes_in_flight() == 0 || self.state == TcpState::Closed {
            return;
        }
        if self.state == TcpState::SynSent {
            // the SYN itself was lost
            self.rtos += 1;
            self.backoff += 1;
            self.rto = (self.rto * 2).min(self.cfg.max_rto);
            self.send_syn(true, ctx);
            self.arm_rto(ctx);
            return;
        }
        self.rtos += 1;
        self.backoff += 1;
        ctx.trace(TraceEventKind::RtoFired {
            backoff: self.backoff,
        });
        debug!(name = %self.name, backoff = self.backoff, "retransmission timeout");
        self.ssthresh = (self.cwnd / 2).max(2 * self.cfg.mss);
        self.cwnd = self.cfg.mss;
        self.dup_acks = 0;
        self.set_state(TcpState::Established, ctx);
        self.sample_cwnd(ctx);
        self.rto = (self.rto * 2).min(self.cfg.max_rto); // exponential backoff
        self.retransmit_segment(self.last_acked, ctx);
    }

    pub(crate) fn dispatch_token(&mut self, token: u32, ctx: &mut dyn SimContext) {
        match token & 0xff {
            TOKEN_TCP_START => self.start(ctx),
            TOKEN_TCP_RTO => self.handle_rto(ctx),
            other => warn!(name = %self.name, token = other, "unknown event token"),
        }
    }

    /// Drain the not-yet-acked DSN chunks (for subflow removal).
    pub(crate) fn take_unacked_dsns(&mut self) -> Vec<u64> {
        let mut out: Vec<u64> = self.dsn_map.drain(..).map(|(_, d)| d).collect();
        out.sort_unstable();
        out
    }

    pub(crate) fn abort(&mut self, ctx: &mut dyn SimContext) {
        self.cancel_rto(ctx);
        self.set_state(TcpState::Closed, ctx);
    }

    fn snapshot_node(&self) -> NodeSnapshot {
        NodeSnapshot::TcpConnection {
            name: self.name.clone(),
            cwnd: self.cwnd,
            ssthresh: self.ssthresh,
            srtt: self.srtt,
            rto: self.rto,
            packets_sent: self.packets_sent,
            retransmits: self.retransmits,
            rtos: self.rtos,
        }
    }

}

impl PacketSink for TcpSource {
    fn receive(&mut self, pkt: Packet, ctx: &mut dyn SimContext) {
        match &pkt.header {
            PacketHeader::TcpAck {
                ackno,
                sack,
                wnd,
                ts_echo,
                retx_echo,
                ecn_echo,
                syn,
            } => {
                let (ackno, wnd, ts_echo, retx_echo, ecn_echo, syn) =
                    (*ackno, *wnd, *ts_echo, *retx_echo, *ecn_echo, *syn);
                let sack = sack.clone();
                ctx.release_packet(pkt);
                self.process_ack(ackno, sack, wnd, ts_echo, retx_echo, ecn_echo, syn, ctx);
                self.send_available(ctx, &mut None, &mut None);
            }
            _ => {
                warn!(name = %self.name, "unexpected packet at TCP source");
                ctx.release_packet(pkt);
            }
        }
    }

    fn do_next_event(&mut self, token: u32, ctx: &mut dyn SimContext) {
        self.dispatch_token(token, ctx);
        self.send_available(ctx, &mut None, &mut None);
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn snapshot(&self) -> Option<NodeSnapshot> {
        Some(self.snapshot_node())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// TCP sink: cumulative ACK plus an out-of-order segment set reported as
/// SACK blocks. ACKs travel the reverse route.
pub struct TcpSink {
    name: String,
    flow: FlowId,
    ack_bytes: u64,
    header_bytes: u64,
    rcv_buffer: u64,
    reverse_route: Option<Rc<Route>>,
    cumulative: u64,
    /// start -> (end, dsn); mss-granular segments, no merging.
    ooo: BTreeMap<u64, (u64, Option<u64>)>,
    ooo_bytes: u64,
    /// Shared-budget override installed by an MPTCP coordinator.
    wnd_override: Option<u64>,
}

impl TcpSink {
    pub fn new(cfg: &TcpConfig, flow: FlowId, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flow,
            ack_bytes: cfg.ack_bytes,
            header_bytes: cfg.header_bytes,
            rcv_buffer: cfg.receive_window,
            reverse_route: None,
            cumulative: 0,
            ooo: BTreeMap::new(),
            ooo_bytes: 0,
            wnd_override: None,
        }
    }

    pub fn connect(&mut self, reverse: Rc<Route>) {
        self.reverse_route = Some(reverse);
    }

    pub fn flow(&self) -> FlowId {
        self.flow
    }

    pub fn cumulative_ack(&self) -> u64 {
        self.cumulative
    }

    pub(crate) fn set_window_override(&mut self, wnd: u64) {
        self.wnd_override = Some(wnd);
    }

    fn advertised_window(&self) -> u64 {
        match self.wnd_override {
            Some(w) => w,
            None => self.rcv_buffer.saturating_sub(self.ooo_bytes),
        }
    }

    fn sack_blocks(&self) -> Vec<(u64, u64)> {
        self.ooo
            .iter()
            .take(3)
            .map(|(s, (e, _))| (*s, *e))
            .collect()
    }

    /// Process one data segment; in-order connection-level chunks are
    /// appended to `delivered_out` when an MPTCP coordinator is listening,
    /// otherwise delivery is accounted here.
    pub(crate) fn process_data(
        &mut self,
        pkt: Packet,
        ctx: &mut dyn SimContext,
        mut delivered_out: Option<&mut Vec<(Option<u64>, u64)>>,
    ) {
        let PacketHeader::TcpData {
            seqno,
            syn,
            ts,
            retransmit,
            dsn,
        } = pkt.header
        else {
            warn!(name = %self.name, "unexpected packet at TCP sink");
            ctx.release_packet(pkt);
            return;
        };
        let ecn = pkt.ecn;
        let payload = pkt.size.saturating_sub(self.header_bytes);
        let reverse = self
            .reverse_route
            .clone()
            .or_else(|| pkt.reverse_route.clone());
        ctx.release_packet(pkt);

        if syn {
            if self.cumulative == 0 {
                self.cumulative = 1; // SYN consumes one sequence number
            }
            self.emit_ack(reverse, ts, retransmit, ecn, true, ctx);
            return;
        }

        let end = seqno.wrapping_add(payload);
        if seq_lt(seqno, self.cumulative) {
            // old duplicate; re-ACK so the source sees progress
        } else if seqno == self.cumulative {
            self.cumulative = end;
            self.account_delivery(dsn, payload, &mut delivered_out, ctx);
            // absorb any now-contiguous buffered segments
            while let Some((&s, &(e, d))) = self.ooo.first_key_value() {
                if seq_lt(self.cumulative, s) {
                    break;
                }
                self.ooo.remove(&s);
                self.ooo_bytes -= e - s;
                if seq_lt(self.cumulative, e) {
                    self.account_delivery(d, e - s, &mut delivered_out, ctx);
                    self.cumulative = e;
                }
            }
        } else if !self.ooo.contains_key(&seqno) {
            self.ooo.insert(seqno, (end, dsn));
            self.ooo_bytes += payload;
        }

        self.emit_ack(reverse, ts, retransmit, ecn, false, ctx);
    }

    fn account_delivery(
        &mut self,
        dsn: Option<u64>,
        bytes: u64,
        delivered_out: &mut Option<&mut Vec<(Option<u64>, u64)>>,
        ctx: &mut dyn SimContext,
    ) {
        match delivered_out {
            Some(out) => out.push((dsn, bytes)),
            None => {
                ctx.trace(TraceEventKind::PacketDelivered {
                    flow: self.flow,
                    bytes,
                });
                ctx.delivered(self.flow, bytes, 1);
            }
        }
    }

    fn emit_ack(
        &mut self,
        reverse: Option<Rc<Route>>,
        ts_echo: SimTime,
        retx_echo: bool,
        ecn_echo: bool,
        syn: bool,
        ctx: &mut dyn SimContext,
    ) {
        let Some(route) = reverse else {
            warn!(name = %self.name, "data packet with no reverse route, cannot ACK");
            return;
        };
        let mut ack = ctx.alloc_packet(PacketHeader::TcpAck {
            ackno: self.cumulative,
            sack: self.sack_blocks(),
            wnd: self.advertised_window(),
            ts_echo,
            retx_echo,
            ecn_echo,
            syn,
        });
        ack.size = self.ack_bytes;
        ack.flow = self.flow;
        ack.route = Some(route);
        ack.priority = 0; // ACKs ahead of data in priority queues
        ack.sent_time = ctx.now();
        ctx.forward(ack);
    }
}

impl PacketSink for TcpSink {
    fn receive(&mut self, pkt: Packet, ctx: &mut dyn SimContext) {
        match pkt.header {
            PacketHeader::TcpData { .. } => self.process_data(pkt, ctx, None),
            _ => {
                warn!(name = %self.name, "unexpected packet at TCP sink");
                ctx.release_packet(pkt);
            }
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
