use std::collections::{HashMap, HashSet};

use pktsim_abstract::{FlowId, NodeSnapshot, SimTime, SinkId, TraceEvent, TraceEventKind};
use serde::Serialize;

/// Global fan-out for passive observation. Components emit typed records
/// through their context; records from nodes that were never enabled are
/// discarded at the emission point.
#[derive(Debug, Default)]
pub struct TraceLog {
    enabled: HashSet<SinkId>,
    log_all: bool,
    events: Vec<TraceEvent>,
    metrics: HashMap<String, Vec<(SimTime, f64)>>,
}

impl TraceLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable(&mut self, node: SinkId) {
        self.enabled.insert(node);
    }

    pub fn enable_all(&mut self) {
        self.log_all = true;
    }

    pub fn is_enabled(&self, node: SinkId) -> bool {
        self.log_all || self.enabled.contains(&node)
    }

    pub fn record(&mut self, time: SimTime, node: SinkId, kind: TraceEventKind) {
        if self.is_enabled(node) {
            self.events.push(TraceEvent { time, node, kind });
        }
    }

    pub fn record_metric(&mut self, name: &str, time: SimTime, value: f64) {
        self.metrics
            .entry(name.to_string())
            .or_default()
            .push((time, value));
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn metric_series(&self, name: &str) -> Option<&[(SimTime, f64)]> {
        self.metrics.get(name).map(|v| v.as_slice())
    }

    pub fn into_parts(self) -> (Vec<TraceEvent>, HashMap<String, Vec<(SimTime, f64)>>) {
        (self.events, self.metrics)
    }

    pub fn metrics(&self) -> &HashMap<String, Vec<(SimTime, f64)>> {
        &self.metrics
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowReport {
    pub id: FlowId,
    pub name: String,
    pub delivered_bytes: u64,
    pub delivered_packets: u64,
    pub dropped_packets: u64,
    /// Goodput over the full run, bits per second.
    pub throughput_bps: f64,
    /// Time of the last in-order delivery, for completion-time spreads.
    pub last_delivery: SimTime,
}

/// Serializable snapshot of a finished (or paused) simulation: the final
/// statistics the engine promises on completion.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub duration_ps: SimTime,
    pub flows: Vec<FlowReport>,
    pub nodes: Vec<NodeSnapshot>,
    pub metrics: HashMap<String, Vec<(SimTime, f64)>>,
    pub events: Vec<TraceEvent>,
    pub packets_peak_live: usize,
}

impl SimulationReport {
    pub fn flow(&self, id: FlowId) -> Option<&FlowReport> {
        self.flows.iter().find(|f| f.id == id)
    }

    pub fn queue(&self, name: &str) -> Option<&NodeSnapshot> {
        self.nodes.iter().find(|n| match n {
            NodeSnapshot::Queue { name: q, .. } => q == name,
            _ => false,
        })
    }

    /// Total packets dropped across every queue in the topology.
    pub fn total_drops(&self) -> u64 {
        self.nodes
            .iter()
            .map(|n| match n {
                NodeSnapshot::Queue { counters, .. } => counters.dropped,
                _ => 0,
            })
            .sum()
    }

    /// Jain's fairness index over the listed flows' throughputs.
    pub fn fairness_index(&self, ids: &[FlowId]) -> f64 {
        let rates: Vec<f64> = ids
            .iter()
            .filter_map(|id| self.flow(*id).map(|f| f.throughput_bps))
            .collect();
        if rates.is_empty() {
            return 0.0;
        }
        let sum: f64 = rates.iter().sum();
        let sum_sq: f64 = rates.iter().map(|r| r * r).sum();
        if sum_sq == 0.0 {
            return 0.0;
        }
        (sum * sum) / (rates.len() as f64 * sum_sq)
    }
}
