pub mod config;
pub mod flow;
pub mod interface;
pub mod packet;
pub mod route;
pub mod time;
pub mod trace;

pub use config::{
    CouplingAlgo, LosslessParams, MptcpConfig, PriorityParams, RedParams, SimSettings, TcpConfig,
};
pub use flow::{DYNAMIC_FLOW_BASE, FlowId, PacketFlow};
pub use interface::{EventHandle, PacketSink, SimContext};
pub use packet::{PAUSE_FRAME_BYTES, Packet, PacketHeader, PacketKind, PacketPool};
pub use route::{Route, SinkId};
pub use time::{
    Linkspeed, SimTime, as_secs, from_micros, from_millis, from_nanos, from_secs, gbps, mbps,
    pkts_per_sec, transmission_time,
};
pub use trace::{NodeSnapshot, QueueCounters, TraceEvent, TraceEventKind};
