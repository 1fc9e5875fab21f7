//! Wiring glue: route construction, endpoint connection and the canned
//! topologies experiments are built from. The wiring layer owns every
//! component; components only ever hold `SinkId` references to each other.

use std::rc::Rc;

use pktsim_abstract::{
    FlowId, Linkspeed, MptcpConfig, Route, SimTime, SinkId, TcpConfig,
};
use thiserror::Error;

use crate::engine::Simulator;
use crate::mptcp::{MptcpSink, MptcpSource, TOKEN_MPTCP_START};
use crate::pipe::Pipe;
use crate::queue::FifoQueue;
use crate::tcp::{TOKEN_TCP_START, TcpSink, TcpSource};

#[derive(Debug, Error)]
pub enum WiringError {
    #[error("node {0:?} is not a {1}")]
    WrongNodeKind(SinkId, &'static str),
    #[error("subflow path count {0} does not match registered subflows {1}")]
    SubflowMismatch(usize, usize),
}

/// Install routes on a TCP pair and schedule the first transmission.
/// `fwd_hops`/`rev_hops` list the intermediate elements only; the terminal
/// endpoints are appended here.
pub fn connect_tcp(
    sim: &mut Simulator,
    src: SinkId,
    sink: SinkId,
    fwd_hops: Vec<SinkId>,
    rev_hops: Vec<SinkId>,
    start: SimTime,
) -> Result<(), WiringError> {
    let mut fwd = fwd_hops;
    fwd.push(sink);
    let mut rev = rev_hops;
    rev.push(src);
    let fwd = Rc::new(Route::new(fwd));
    let rev = Rc::new(Route::new(rev));

    sim.node_as::<TcpSource>(src)
        .ok_or(WiringError::WrongNodeKind(src, "TcpSource"))?
        .connect(fwd, rev.clone());
    sim.node_as::<TcpSink>(sink)
        .ok_or(WiringError::WrongNodeKind(sink, "TcpSink"))?
        .connect(rev);
    sim.schedule_node(src, start, TOKEN_TCP_START);
    Ok(())
}

/// Install per-subflow routes on an MPTCP pair and schedule the start.
/// `paths[i]` carries the intermediate hops for subflow `i`, forward and
/// reverse.
pub fn connect_mptcp(
    sim: &mut Simulator,
    src: SinkId,
    sink: SinkId,
    paths: Vec<(Vec<SinkId>, Vec<SinkId>)>,
    start: SimTime,
) -> Result<(), WiringError> {
    let n_paths = paths.len();
    {
        let msrc = sim
            .node_as::<MptcpSource>(src)
            .ok_or(WiringError::WrongNodeKind(src, "MptcpSource"))?;
        if msrc.subflow_count() != n_paths {
            return Err(WiringError::SubflowMismatch(n_paths, msrc.subflow_count()));
        }
    }
    for (slot, (fwd_hops, rev_hops)) in paths.into_iter().enumerate() {
        let mut fwd = fwd_hops;
        fwd.push(sink);
        let mut rev = rev_hops;
        rev.push(src);
        let fwd = Rc::new(Route::new(fwd));
        let rev = Rc::new(Route::new(rev));
        sim.node_as::<MptcpSource>(src)
            .expect("checked above")
            .connect_subflow(slot, fwd, rev.clone());
        sim.node_as::<MptcpSink>(sink)
            .ok_or(WiringError::WrongNodeKind(sink, "MptcpSink"))?
            .connect_subsink(slot, rev);
    }
    sim.schedule_node(src, start, TOKEN_MPTCP_START);
    Ok(())
}

/// One direction of a link: rate-limited queue feeding a fixed-delay pipe.
#[derive(Debug, Clone)]
pub struct LinkParams {
    pub rate: Linkspeed,
    pub delay: SimTime,
    pub queue_bytes: u64,
}

pub struct DumbbellHandles {
    pub sources: Vec<SinkId>,
    pub sinks: Vec<SinkId>,
    pub flows: Vec<FlowId>,
    pub bottleneck: SinkId,
}

/// N TCP flows sharing one bottleneck queue and pipe; ACKs return over an
/// uncontended reverse pipe of the same propagation delay.
pub fn dumbbell(
    sim: &mut Simulator,
    link: &LinkParams,
    tcp: &TcpConfig,
    starts: &[SimTime],
) -> Result<DumbbellHandles, WiringError> {
    let bottleneck = sim.add_node(Box::new(FifoQueue::new(
        link.rate,
        link.queue_bytes,
        "bottleneck",
    )));
    let fwd_pipe = sim.add_node(Box::new(Pipe::new(link.delay, "fwd-pipe")));
    let rev_pipe = sim.add_node(Box::new(Pipe::new(link.delay, "rev-pipe")));

    let mut handles = DumbbellHandles {
        sources: Vec::new(),
        sinks: Vec::new(),
        flows: Vec::new(),
        bottleneck,
    };
    for (i, start) in starts.iter().enumerate() {
        let flow = sim.register_flow(format!("tcp{i}"));
        let src = sim.add_node(Box::new(TcpSource::new(
            tcp.clone(),
            flow,
            format!("src{i}"),
        )));
        let sink = sim.add_node(Box::new(TcpSink::new(tcp, flow, format!("sink{i}"))));
        connect_tcp(
            sim,
            src,
            sink,
            vec![bottleneck, fwd_pipe],
            vec![rev_pipe],
            *start,
        )?;
        handles.sources.push(src);
        handles.sinks.push(sink);
        handles.flows.push(flow);
    }
    Ok(handles)
}

pub struct MultipathHandles {
    pub source: SinkId,
    pub sink: SinkId,
    pub conn_flow: FlowId,
    pub subflow_flows: Vec<FlowId>,
    pub path_queues: Vec<SinkId>,
}

/// One MPTCP connection over two disjoint paths, each with its own
/// bottleneck queue and delay.
pub fn two_path_mptcp(
    sim: &mut Simulator,
    paths: &[LinkParams],
    tcp: &TcpConfig,
    mptcp: &MptcpConfig,
    start: SimTime,
) -> Result<MultipathHandles, WiringError> {
    let conn_flow = sim.register_flow("mptcp-conn");
    let mut msrc = MptcpSource::new(mptcp.clone(), "mptcp-src");
    let mut msink = MptcpSink::new(mptcp, conn_flow, "mptcp-sink");

    let mut subflow_flows = Vec::new();
    for i in 0..paths.len() {
        let flow = sim.register_flow(format!("subflow{i}"));
        msrc.push_subflow(TcpSource::new(tcp.clone(), flow, format!("subflow{i}")));
        msink.push_subsink(TcpSink::new(tcp, flow, format!("subsink{i}")));
        subflow_flows.push(flow);
    }

    let mut path_queues = Vec::new();
    let mut hop_lists = Vec::new();
    for (i, path) in paths.iter().enumerate() {
        let q = sim.add_node(Box::new(FifoQueue::new(
            path.rate,
            path.queue_bytes,
            format!("path{i}-queue"),
        )));
        let fwd_pipe = sim.add_node(Box::new(Pipe::new(path.delay, format!("path{i}-fwd"))));
        let rev_pipe = sim.add_node(Box::new(Pipe::new(path.delay, format!("path{i}-rev"))));
        path_queues.push(q);
        hop_lists.push((vec![q, fwd_pipe], vec![rev_pipe]));
    }

    let source = sim.add_node(Box::new(msrc));
    let sink = sim.add_node(Box::new(msink));
    connect_mptcp(sim, source, sink, hop_lists, start)?;

    Ok(MultipathHandles {
        source,
        sink,
        conn_flow,
        subflow_flows,
        path_queues,
    })
}

pub struct IncastHandles {
    pub sources: Vec<SinkId>,
    pub flows: Vec<FlowId>,
    pub fanin: SinkId,
}

/// Synchronized fan-in: N senders each pushing `bytes_each` through one
/// shared queue toward one receiving host.
pub fn incast(
    sim: &mut Simulator,
    n_senders: usize,
    link: &LinkParams,
    tcp: &TcpConfig,
    bytes_each: u64,
    start: SimTime,
) -> Result<IncastHandles, WiringError> {
    let fanin = sim.add_node(Box::new(FifoQueue::new(
        link.rate,
        link.queue_bytes,
        "fanin",
    )));
    let fwd_pipe = sim.add_node(Box::new(Pipe::new(link.delay, "fanin-pipe")));
    let rev_pipe = sim.add_node(Box::new(Pipe::new(link.delay, "ack-pipe")));

    let mut cfg = tcp.clone();
    cfg.flow_bytes = Some(bytes_each);

    let mut handles = IncastHandles {
        sources: Vec::new(),
        flows: Vec::new(),
        fanin,
    };
    for i in 0..n_senders {
        let flow = sim.register_flow(format!("worker{i}"));
        let src = sim.add_node(Box::new(TcpSource::new(
            cfg.clone(),
            flow,
            format!("worker{i}"),
        )));
        let sink = sim.add_node(Box::new(TcpSink::new(&cfg, flow, format!("aggregator{i}"))));
        connect_tcp(sim, src, sink, vec![fanin, fwd_pipe], vec![rev_pipe], start)?;
        handles.sources.push(src);
        handles.flows.push(flow);
    }
    Ok(handles)
}
