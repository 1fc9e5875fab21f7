use serde::{Deserialize, Serialize};

use crate::time::{SimTime, from_millis, from_secs};

/// Engine-wide knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimSettings {
    /// Hard cap on live packets across all pools.
    pub packet_ceiling: usize,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            packet_ceiling: 1 << 20,
        }
    }
}

/// Random-early-detection parameters. Thresholds are in bytes of smoothed
/// queue occupancy. The drop decision draws from a per-queue `StdRng`
/// seeded with `seed`, so a scenario reproduces exactly given its seed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedParams {
    pub min_thresh: u64,
    pub max_thresh: u64,
    pub max_prob: f64,
    pub ewma_weight: f64,
    /// Mark instead of dropping between the thresholds (tail overflow
    /// still drops).
    pub ecn_marking: bool,
    pub seed: u64,
}

impl Default for RedParams {
    fn default() -> Self {
        Self {
            min_thresh: 15_000,
            max_thresh: 45_000,
            max_prob: 0.1,
            ewma_weight: 0.002,
            ecn_marking: false,
            seed: 0,
        }
    }
}

/// Strict-priority queue: one entry per class, highest priority first.
/// A quota bounds how many bytes the class may serve while lower classes
/// wait; `None` means unbounded (pure strict priority).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityParams {
    pub class_quotas: Vec<Option<u64>>,
}

impl Default for PriorityParams {
    fn default() -> Self {
        Self {
            class_quotas: vec![None, None],
        }
    }
}

/// PFC-style backpressure thresholds in buffered bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LosslessParams {
    pub high_watermark: u64,
    pub low_watermark: u64,
}

impl Default for LosslessParams {
    fn default() -> Self {
        Self {
            high_watermark: 60_000,
            low_watermark: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpConfig {
    /// Payload bytes per segment.
    pub mss: u64,
    /// Simulated header bytes added to every data segment's wire size.
    pub header_bytes: u64,
    /// Wire size of a pure ACK.
    pub ack_bytes: u64,
    /// Initial congestion window, in segments.
    pub init_cwnd_pkts: u64,
    /// Initial slow-start threshold, in bytes.
    pub init_ssthresh: u64,
    pub init_rto: SimTime,
    pub min_rto: SimTime,
    pub max_rto: SimTime,
    /// Receive buffer advertised by the sink.
    pub receive_window: u64,
    /// Model the SYN exchange instead of starting established.
    pub handshake: bool,
    /// Application bytes to transfer; `None` streams forever.
    pub flow_bytes: Option<u64>,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            mss: 1000,
            header_bytes: 40,
            ack_bytes: 40,
            init_cwnd_pkts: 2,
            init_ssthresh: u64::MAX / 2,
            init_rto: from_millis(1000),
            min_rto: from_millis(200),
            max_rto: from_secs(60.0),
            receive_window: 64 << 20,
            handshake: false,
            flow_bytes: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CouplingAlgo {
    Uncoupled,
    FullyCoupled,
    CoupledInc,
    /// Linked increases (LIA).
    CoupledTcp,
    CoupledEpsilon {
        epsilon: f64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MptcpConfig {
    pub algo: CouplingAlgo,
    /// Single receive-window budget shared by every subflow.
    pub receive_window: u64,
    /// Recompute the LIA alpha on every ACK instead of once per RTT.
    pub alpha_per_ack: bool,
}

impl Default for MptcpConfig {
    fn default() -> Self {
        Self {
            algo: CouplingAlgo::Uncoupled,
            receive_window: 64 << 20,
            alpha_per_ack: false,
        }
    }
}
