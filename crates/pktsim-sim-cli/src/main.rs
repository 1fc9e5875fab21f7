use anyhow::{Context, Result, bail};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use pktsim_abstract::{CouplingAlgo, MptcpConfig, SimSettings, TcpConfig, time};
use pktsim_simulator::{
    LinkParams, SimulationReport, Simulator, dumbbell, incast, scenario_runner, two_path_mptcp,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Packet-level congestion-control simulator")]
struct Args {
    /// Run a TOML scenario from disk.
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Run a built-in experiment: dumbbell, fairness, multipath, incast.
    #[arg(long)]
    builtin: Option<String>,

    /// Simulated duration in milliseconds for built-in experiments.
    #[arg(long, default_value_t = 2000)]
    duration_ms: u64,

    /// Coupling algorithm for the multipath built-in:
    /// uncoupled, fully_coupled, coupled_inc, coupled_tcp.
    #[arg(long, default_value = "uncoupled")]
    coupling: String,

    /// Record observer events and metrics from every component.
    #[arg(long, default_value_t = false)]
    log_all: bool,

    /// Write a JSON report of the finished simulation.
    #[arg(long)]
    report_out: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    info!("pktsim-sim-cli starting…");

    let report = if let Some(path) = &args.scenario {
        if args.builtin.is_some() {
            bail!("--scenario and --builtin cannot be used together");
        }
        scenario_runner::run_scenario_file(path)?
    } else {
        let name = args.builtin.as_deref().unwrap_or("dumbbell");
        run_builtin(&args, name)?
    };

    print_summary(&report);
    if let Some(path) = &args.report_out {
        write_report(path, &report)?;
    }
    Ok(())
}

fn parse_coupling(name: &str) -> Result<CouplingAlgo> {
    Ok(match name {
        "uncoupled" => CouplingAlgo::Uncoupled,
        "fully_coupled" => CouplingAlgo::FullyCoupled,
        "coupled_inc" => CouplingAlgo::CoupledInc,
        "coupled_tcp" => CouplingAlgo::CoupledTcp,
        other => bail!("unknown coupling algorithm {other:?}"),
    })
}

fn run_builtin(args: &Args, name: &str) -> Result<SimulationReport> {
    let mut sim = Simulator::new(SimSettings::default());
    if args.log_all {
        sim.log_all_components();
    }
    let duration = time::from_millis(args.duration_ms);
    let tcp = TcpConfig::default();

    match name {
        "dumbbell" => {
            let link = LinkParams {
                rate: time::mbps(10),
                delay: time::from_micros(100),
                queue_bytes: 30 * 1040,
            };
            dumbbell(&mut sim, &link, &tcp, &[0])?;
        }
        "fairness" => {
            let link = LinkParams {
                rate: time::mbps(10),
                delay: time::from_micros(100),
                queue_bytes: 30 * 1040,
            };
            dumbbell(&mut sim, &link, &tcp, &[0, time::from_millis(200)])?;
        }
        "multipath" => {
            let paths = [
                LinkParams {
                    rate: time::mbps(1),
                    delay: time::from_millis(75),
                    queue_bytes: 20_000,
                },
                LinkParams {
                    rate: time::mbps(5),
                    delay: time::from_millis(5),
                    queue_bytes: 10_000,
                },
            ];
            let mptcp = MptcpConfig {
                algo: parse_coupling(&args.coupling)?,
                ..MptcpConfig::default()
            };
            two_path_mptcp(&mut sim, &paths, &tcp, &mptcp, 0)?;
        }
        "incast" => {
            let link = LinkParams {
                rate: time::gbps(10),
                delay: time::from_micros(10),
                queue_bytes: 100 * 1040,
            };
            let tcp = TcpConfig {
                init_rto: time::from_millis(1),
                min_rto: time::from_micros(200),
                ..tcp
            };
            incast(&mut sim, 15, &link, &tcp, 100_000, 0)?;
        }
        other => bail!("unknown builtin experiment {other:?}"),
    }

    info!("running {name} for {} ms simulated", args.duration_ms);
    sim.run_until(duration);
    Ok(sim.export_report())
}

fn print_summary(report: &SimulationReport) {
    info!(
        "simulation finished at {:.6} s",
        time::as_secs(report.duration_ps)
    );
    for flow in &report.flows {
        info!(
            "flow {}: {} bytes delivered, {:.2} Mbps, {} drops",
            flow.name,
            flow.delivered_bytes,
            flow.throughput_bps / 1e6,
            flow.dropped_packets
        );
    }
    info!("queue drops total: {}", report.total_drops());
}

fn write_report(path: &Path, report: &SimulationReport) -> Result<()> {
    let data = serde_json::to_vec_pretty(report).context("Failed to serialize report")?;
    fs::write(path, &data)
        .with_context(|| format!("Failed to write report file {}", path.display()))?;
    info!("report written to {}", path.display());
    Ok(())
}
