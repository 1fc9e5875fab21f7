pub mod engine;
pub mod eventlist;
pub mod lossless;
pub mod mptcp;
pub mod pipe;
pub mod priority;
pub mod queue;
pub mod red;
pub mod scenario_runner;
pub mod tcp;
pub mod topology;
pub mod trace;

#[cfg(test)]
mod testutil;

pub use engine::Simulator;
pub use eventlist::EventList;
pub use lossless::LosslessQueue;
pub use mptcp::{MptcpSink, MptcpSource, TOKEN_MPTCP_START};
pub use pipe::Pipe;
pub use priority::PriorityQueue;
pub use queue::FifoQueue;
pub use red::RedQueue;
pub use scenario_runner::{Assertion, Scenario, TopologySpec};
pub use tcp::{TOKEN_TCP_START, TcpSink, TcpSource, TcpState};
pub use topology::{
    DumbbellHandles, IncastHandles, LinkParams, MultipathHandles, WiringError, connect_mptcp,
    connect_tcp, dumbbell, incast, two_path_mptcp,
};
pub use trace::{FlowReport, SimulationReport, TraceLog};
