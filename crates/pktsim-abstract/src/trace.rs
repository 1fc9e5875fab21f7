use serde::Serialize;

use crate::flow::FlowId;
use crate::route::SinkId;
use crate::time::SimTime;

/// One observer record. Loggers are passive: records describe state changes
/// and never feed back into the simulation.
#[derive(Debug, Clone, Serialize)]
pub struct TraceEvent {
    pub time: SimTime,
    pub node: SinkId,
    #[serde(flatten)]
    pub kind: TraceEventKind,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEventKind {
    QueueEnqueue { flow: FlowId, bytes: u64, queued_bytes: u64 },
    QueueDequeue { flow: FlowId, bytes: u64, queued_bytes: u64 },
    QueueDrop { flow: FlowId, bytes: u64 },
    QueueMark { flow: FlowId },
    QueuePause { pause: bool },
    PacketSent { flow: FlowId, seqno: u64, bytes: u64, retransmit: bool },
    PacketDelivered { flow: FlowId, bytes: u64 },
    TcpStateChange { state: &'static str },
    CwndSample { cwnd: u64, ssthresh: u64 },
    RttSample { rtt: SimTime, rto: SimTime },
    RtoFired { backoff: u32 },
}

/// Per-queue counters, exported into the final report. The conservation
/// invariant `enqueued = dequeued + dropped + buffered` holds at every
/// event boundary.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueCounters {
    pub enqueued: u64,
    pub dequeued: u64,
    pub dropped: u64,
    pub marked: u64,
    pub bytes_enqueued: u64,
    pub bytes_dropped: u64,
}

/// End-of-run state a component exposes for the report.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "node_kind", rename_all = "snake_case")]
pub enum NodeSnapshot {
    Queue {
        name: String,
        buffered_bytes: u64,
        counters: QueueCounters,
    },
    TcpConnection {
        name: String,
        cwnd: u64,
        ssthresh: u64,
        srtt: SimTime,
        rto: SimTime,
        packets_sent: u64,
        retransmits: u64,
        rtos: u64,
    },
}
