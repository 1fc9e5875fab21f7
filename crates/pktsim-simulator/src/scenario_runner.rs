//! Declarative experiments: a TOML scenario picks a canned topology,
//! parameterizes it, and asserts on the resulting report.

use std::fs;
use std::path::Path;

use anyhow::{Context, anyhow};
use pktsim_abstract::{CouplingAlgo, FlowId, MptcpConfig, SimSettings, TcpConfig, time};
use serde::Deserialize;
use tracing::info;

use crate::engine::Simulator;
use crate::topology::{self, LinkParams};
use crate::trace::SimulationReport;

#[derive(Deserialize, Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub description: String,
    pub duration_ms: u64,
    pub topology: TopologySpec,
    #[serde(default)]
    pub assertions: Vec<Assertion>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct PathSpec {
    pub rate_mbps: u64,
    pub delay_us: u64,
    pub queue_bytes: u64,
}

impl PathSpec {
    fn link(&self) -> LinkParams {
        LinkParams {
            rate: time::mbps(self.rate_mbps),
            delay: time::from_micros(self.delay_us),
            queue_bytes: self.queue_bytes,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TopologySpec {
    Dumbbell {
        link: PathSpec,
        start_times_ms: Vec<u64>,
        /// Per-flow transfer size; unbounded stream when absent.
        flow_kbytes: Option<u64>,
    },
    Multipath {
        algo: CouplingAlgo,
        paths: Vec<PathSpec>,
    },
    Incast {
        senders: usize,
        link: PathSpec,
        kbytes_each: u64,
    },
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Assertion {
    /// Aggregate goodput must reach this fraction of the bottleneck
    /// capacity (sum of path capacities for multipath).
    MinThroughputFraction { fraction: f64 },
    /// Jain's fairness index across the scenario's flows.
    FairnessAtLeast { index: f64 },
    /// Total queue drops across the topology.
    DropsAtLeast { count: u64 },
    /// Every finite flow delivered all of its bytes.
    AllFlowsComplete,
}

pub fn run_scenario_file(path: impl AsRef<Path>) -> anyhow::Result<SimulationReport> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
    let scenario: Scenario = toml::from_str(&content).context("Failed to parse scenario")?;
    run(&scenario)
}

pub fn run(scenario: &Scenario) -> anyhow::Result<SimulationReport> {
    info!("Running scenario: {}", scenario.name);
    info!("Description: {}", scenario.description);

    let mut sim = Simulator::new(SimSettings::default());
    let duration = time::from_millis(scenario.duration_ms);

    // capacity the throughput assertions are measured against, plus the
    // flows they apply to and the bytes each finite flow must deliver
    let (capacity_bps, flows, expected_bytes): (u64, Vec<FlowId>, Option<u64>) =
        match &scenario.topology {
            TopologySpec::Dumbbell {
                link,
                start_times_ms,
                flow_kbytes,
            } => {
                let tcp = TcpConfig {
                    flow_bytes: flow_kbytes.map(|k| k * 1000),
                    ..TcpConfig::default()
                };
                let starts: Vec<_> = start_times_ms.iter().map(|ms| time::from_millis(*ms)).collect();
                let handles = topology::dumbbell(&mut sim, &link.link(), &tcp, &starts)?;
                (time::mbps(link.rate_mbps), handles.flows, flow_kbytes.map(|k| k * 1000))
            }
            TopologySpec::Multipath { algo, paths } => {
                let links: Vec<LinkParams> = paths.iter().map(PathSpec::link).collect();
                let tcp = TcpConfig::default();
                let mptcp = MptcpConfig {
                    algo: *algo,
                    ..MptcpConfig::default()
                };
                let handles = topology::two_path_mptcp(&mut sim, &links, &tcp, &mptcp, 0)?;
                let cap = paths.iter().map(|p| time::mbps(p.rate_mbps)).sum();
                (cap, vec![handles.conn_flow], None)
            }
            TopologySpec::Incast {
                senders,
                link,
                kbytes_each,
            } => {
                let tcp = TcpConfig::default();
                let handles = topology::incast(
                    &mut sim,
                    *senders,
                    &link.link(),
                    &tcp,
                    kbytes_each * 1000,
                    0,
                )?;
                (time::mbps(link.rate_mbps), handles.flows, Some(kbytes_each * 1000))
            }
        };

    sim.run_until(duration);
    let report = sim.export_report();

    for assertion in &scenario.assertions {
        match assertion {
            Assertion::MinThroughputFraction { fraction } => {
                let total: f64 = flows
                    .iter()
                    .filter_map(|id| report.flow(*id).map(|f| f.throughput_bps))
                    .sum();
                let needed = capacity_bps as f64 * fraction;
                if total < needed {
                    return Err(anyhow!(
                        "Assertion failed: aggregate throughput {:.0} bps below {:.0} bps \
                         ({} of capacity)",
                        total,
                        needed,
                        fraction
                    ));
                }
            }
            Assertion::FairnessAtLeast { index } => {
                let jain = report.fairness_index(&flows);
                if jain < *index {
                    return Err(anyhow!(
                        "Assertion failed: fairness index {jain:.4} below {index}"
                    ));
                }
            }
            Assertion::DropsAtLeast { count } => {
                let drops = report.total_drops();
                if drops < *count {
                    return Err(anyhow!(
                        "Assertion failed: {drops} drops observed, expected at least {count}"
                    ));
                }
            }
            Assertion::AllFlowsComplete => {
                let Some(expected) = expected_bytes else {
                    return Err(anyhow!(
                        "Assertion failed: all_flows_complete needs finite flows"
                    ));
                };
                for id in &flows {
                    let f = report
                        .flow(*id)
                        .ok_or_else(|| anyhow!("flow {id:?} missing from report"))?;
                    if f.delivered_bytes < expected {
                        return Err(anyhow!(
                            "Assertion failed: flow {} delivered {} of {} bytes",
                            f.name,
                            f.delivered_bytes,
                            expected
                        ));
                    }
                }
            }
        }
    }

    info!("Scenario passed: {}", scenario.name);
    Ok(report)
}
