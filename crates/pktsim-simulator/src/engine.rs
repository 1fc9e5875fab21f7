use std::collections::{HashMap, VecDeque};

use pktsim_abstract::{
    DYNAMIC_FLOW_BASE, EventHandle, FlowId, Packet, PacketFlow, PacketHeader, PacketPool,
    PacketSink, SimContext, SimSettings, SimTime, SinkId, TraceEventKind, time,
};
use tracing::{debug, warn};

use crate::eventlist::EventList;
use crate::trace::{FlowReport, SimulationReport, TraceLog};

#[derive(Debug)]
struct FlowRecord {
    flow: PacketFlow,
    delivered_bytes: u64,
    delivered_packets: u64,
    dropped_packets: u64,
    last_delivery: SimTime,
}

impl FlowRecord {
    fn new(flow: PacketFlow) -> Self {
        Self {
            flow,
            delivered_bytes: 0,
            delivered_packets: 0,
            dropped_packets: 0,
            last_delivery: 0,
        }
    }
}

/// Owns the event list, the node arena, the packet pool and the flow table.
/// Strictly single-threaded: the only source of progress is dispatching one
/// event at a time, then draining the same-instant delivery queue to
/// fixation before the clock may advance again.
pub struct Simulator {
    eventlist: EventList,
    nodes: Vec<Box<dyn PacketSink>>,
    pool: PacketPool,
    flows: HashMap<FlowId, FlowRecord>,
    next_dynamic_flow: u64,
    trace: TraceLog,
    pending: VecDeque<(SinkId, Packet)>,
}

impl Simulator {
    pub fn new(settings: SimSettings) -> Self {
        Self {
            eventlist: EventList::new(),
            nodes: Vec::new(),
            pool: PacketPool::new(settings.packet_ceiling),
            flows: HashMap::new(),
            next_dynamic_flow: DYNAMIC_FLOW_BASE,
            trace: TraceLog::new(),
            pending: VecDeque::new(),
        }
    }

    pub fn add_node(&mut self, node: Box<dyn PacketSink>) -> SinkId {
        let id = SinkId(self.nodes.len());
        debug!(?id, name = node.name(), "node added");
        self.nodes.push(node);
        id
    }

    /// Typed access to a node for the wiring layer.
    pub fn node_as<T: 'static>(&mut self, id: SinkId) -> Option<&mut T> {
        self.nodes
            .get_mut(id.0)
            .and_then(|n| n.as_any_mut().downcast_mut::<T>())
    }

    pub fn node_name(&self, id: SinkId) -> Option<&str> {
        self.nodes.get(id.0).map(|n| n.name())
    }

    pub fn register_flow(&mut self, name: impl Into<String>) -> FlowId {
        let id = FlowId(self.next_dynamic_flow);
        self.next_dynamic_flow += 1;
        self.flows
            .insert(id, FlowRecord::new(PacketFlow::new(id, name)));
        id
    }

    /// Scenario-assigned id; must stay below the dynamic base.
    pub fn register_static_flow(&mut self, id: FlowId, name: impl Into<String>) {
        assert!(
            id.0 < DYNAMIC_FLOW_BASE,
            "static flow id {} collides with the dynamic range",
            id.0
        );
        self.flows
            .insert(id, FlowRecord::new(PacketFlow::new(id, name)));
    }

    pub fn now(&self) -> SimTime {
        self.eventlist.now()
    }

    pub fn set_endtime(&mut self, end: SimTime) {
        self.eventlist.set_endtime(end);
    }

    /// Schedule a node's event from outside any handler (wiring layer).
    pub fn schedule_node(&mut self, id: SinkId, at: SimTime, token: u32) -> EventHandle {
        self.eventlist.schedule(id, at, token)
    }

    pub fn trigger_node(&mut self, id: SinkId, token: u32) {
        self.eventlist.trigger_now(id, token);
    }

    /// Attach the passive observer to a component (`log_to`).
    pub fn log_component(&mut self, id: SinkId) {
        self.trace.enable(id);
    }

    pub fn log_all_components(&mut self) {
        self.trace.enable_all();
    }

    pub fn trace_log(&self) -> &TraceLog {
        &self.trace
    }

    pub fn pending_events(&self) -> usize {
        self.eventlist.pending_events()
    }

    /// Dispatch one event; false once the queue is drained or the end time
    /// is reached.
    pub fn do_next_event(&mut self) -> bool {
        let Some((target, token)) = self.eventlist.do_next_event() else {
            return false;
        };
        self.invoke_event(target, token);
        self.drain_pending();
        true
    }

    pub fn run_until(&mut self, end: SimTime) {
        self.eventlist.set_endtime(end);
        while self.do_next_event() {}
    }

    pub fn run_to_completion(&mut self) {
        while self.do_next_event() {}
    }

    fn invoke_event(&mut self, target: SinkId, token: u32) {
        let Self {
            eventlist,
            nodes,
            pool,
            flows,
            trace,
            pending,
            ..
        } = self;
        assert!(target.0 < nodes.len(), "event for unknown node {target:?}");
        let mut ctx = EngineCtx {
            node: target,
            eventlist,
            pool,
            flows,
            trace,
            pending,
        };
        nodes[target.0].do_next_event(token, &mut ctx);
    }

    /// Same-instant packet handoffs, FIFO, until no handler emits more.
    fn drain_pending(&mut self) {
        while let Some((to, pkt)) = self.pending.pop_front() {
            let Self {
                eventlist,
                nodes,
                pool,
                flows,
                trace,
                pending,
                ..
            } = self;
            if to.0 >= nodes.len() {
                warn!(?to, "packet delivered to unknown sink, dropping");
                pool.release(pkt);
                continue;
            }
            let mut ctx = EngineCtx {
                node: to,
                eventlist,
                pool,
                flows,
                trace,
                pending,
            };
            nodes[to.0].receive(pkt, &mut ctx);
        }
    }

    pub fn export_report(&self) -> SimulationReport {
        let duration = self.eventlist.now();
        let secs = time::as_secs(duration);
        let mut flows: Vec<FlowReport> = self
            .flows
            .iter()
            .map(|(id, rec)| FlowReport {
                id: *id,
                name: rec.flow.name.clone(),
                delivered_bytes: rec.delivered_bytes,
                delivered_packets: rec.delivered_packets,
                dropped_packets: rec.dropped_packets,
                throughput_bps: if secs > 0.0 {
                    rec.delivered_bytes as f64 * 8.0 / secs
                } else {
                    0.0
                },
                last_delivery: rec.last_delivery,
            })
            .collect();
        flows.sort_by_key(|f| f.id);

        SimulationReport {
            duration_ps: duration,
            flows,
            nodes: self.nodes.iter().filter_map(|n| n.snapshot()).collect(),
            metrics: self.trace.metrics().clone(),
            events: self.trace.events().to_vec(),
            packets_peak_live: self.pool.peak(),
        }
    }
}

struct EngineCtx<'a> {
    node: SinkId,
    eventlist: &'a mut EventList,
    pool: &'a mut PacketPool,
    flows: &'a mut HashMap<FlowId, FlowRecord>,
    trace: &'a mut TraceLog,
    pending: &'a mut VecDeque<(SinkId, Packet)>,
}

impl SimContext for EngineCtx<'_> {
    fn now(&self) -> SimTime {
        self.eventlist.now()
    }

    fn schedule_at(&mut self, at: SimTime, token: u32) -> EventHandle {
        self.eventlist.schedule(self.node, at, token)
    }

    fn schedule_in(&mut self, delay: SimTime, token: u32) -> EventHandle {
        self.eventlist.schedule_in(self.node, delay, token)
    }

    fn cancel(&mut self, handle: EventHandle) {
        self.eventlist.cancel(handle);
    }

    fn trigger_now(&mut self, target: SinkId, token: u32) {
        self.eventlist.trigger_now(target, token);
    }

    fn alloc_packet(&mut self, header: PacketHeader) -> Packet {
        self.pool.alloc(header)
    }

    fn release_packet(&mut self, pkt: Packet) {
        self.pool.release(pkt);
    }

    fn forward(&mut self, mut pkt: Packet) {
        let Some(next) = pkt.next_hop() else {
            // scenario misconfiguration, not engine corruption
            warn!(
                node = ?self.node,
                flow = ?pkt.flow,
                hop = pkt.hop,
                "packet has no next hop, dropping"
            );
            self.drop_packet(pkt);
            return;
        };
        pkt.hop += 1;
        self.pending.push_back((next, pkt));
    }

    fn deliver_to(&mut self, to: SinkId, pkt: Packet) {
        self.pending.push_back((to, pkt));
    }

    fn drop_packet(&mut self, pkt: Packet) {
        if let Some(rec) = self.flows.get_mut(&pkt.flow) {
            rec.dropped_packets += 1;
        }
        self.pool.release(pkt);
    }

    fn delivered(&mut self, flow: FlowId, bytes: u64, packets: u64) {
        let now = self.eventlist.now();
        if let Some(rec) = self.flows.get_mut(&flow) {
            rec.delivered_bytes += bytes;
            rec.delivered_packets += packets;
            rec.last_delivery = now;
        }
    }

    fn trace(&mut self, kind: TraceEventKind) {
        self.trace.record(self.eventlist.now(), self.node, kind);
    }

    fn record_metric(&mut self, name: &str, value: f64) {
        self.trace.record_metric(name, self.eventlist.now(), value);
    }

    fn log_enabled(&self) -> bool {
        self.trace.is_enabled(self.node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pktsim_abstract::Route;
    use std::any::Any;
    use std::rc::Rc;

    /// Minimal sink that counts receptions and forwards.
    struct Relay {
        name: String,
        received: u64,
    }

    impl PacketSink for Relay {
        fn receive(&mut self, pkt: Packet, ctx: &mut dyn SimContext) {
            self.received += 1;
            if pkt.next_hop().is_some() {
                ctx.forward(pkt);
            } else {
                let bytes = pkt.size;
                let flow = pkt.flow;
                ctx.delivered(flow, bytes, 1);
                ctx.release_packet(pkt);
            }
        }

        fn do_next_event(&mut self, _token: u32, ctx: &mut dyn SimContext) {
            // emit one packet down a two-relay route
            let mut pkt = ctx.alloc_packet(PacketHeader::TcpData {
                seqno: 0,
                syn: false,
                ts: ctx.now(),
                retransmit: false,
                dsn: None,
            });
            pkt.size = 100;
            pkt.flow = FlowId(1);
            pkt.route = Some(Rc::new(Route::new(vec![SinkId(1), SinkId(2)])));
            ctx.forward(pkt);
        }

        fn name(&self) -> &str {
            &self.name
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn relay(name: &str) -> Box<Relay> {
        Box::new(Relay {
            name: name.to_string(),
            received: 0,
        })
    }

    #[test]
    fn same_instant_delivery_chain() {
        let mut sim = Simulator::new(SimSettings::default());
        let src = sim.add_node(relay("src"));
        let a = sim.add_node(relay("a"));
        let b = sim.add_node(relay("b"));
        sim.register_static_flow(FlowId(1), "test");

        sim.schedule_node(src, 10, 0);
        assert!(sim.do_next_event());
        // the whole route was traversed within one virtual instant
        assert_eq!(sim.now(), 10);
        assert_eq!(sim.node_as::<Relay>(a).unwrap().received, 1);
        assert_eq!(sim.node_as::<Relay>(b).unwrap().received, 1);

        let report = sim.export_report();
        assert_eq!(report.flow(FlowId(1)).unwrap().delivered_bytes, 100);
        assert!(!sim.do_next_event());
    }

    #[test]
    fn dynamic_flow_ids_start_at_reserved_base() {
        let mut sim = Simulator::new(SimSettings::default());
        let id = sim.register_flow("dyn");
        assert!(id.0 >= DYNAMIC_FLOW_BASE);
        let id2 = sim.register_flow("dyn2");
        assert!(id2.0 > id.0);
    }
}
