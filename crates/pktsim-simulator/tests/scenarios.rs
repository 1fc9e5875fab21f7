//! End-to-end scenarios over the canned topologies. Rates and durations
//! are scaled down from datacenter values so each run stays in the
//! 10^4-10^6 event range.

use pktsim_abstract::{
    CouplingAlgo, MptcpConfig, NodeSnapshot, SimSettings, TcpConfig,
    time::{self, from_micros, from_millis, from_secs, mbps},
};
use pktsim_simulator::{
    LinkParams, MptcpSource, Simulator, dumbbell, incast, two_path_mptcp,
};

fn bottleneck_link() -> LinkParams {
    LinkParams {
        rate: mbps(10),
        delay: from_micros(100),
        queue_bytes: 30 * 1040, // thirty full segments
    }
}

#[test]
fn single_tcp_fills_the_bottleneck() {
    let mut sim = Simulator::new(SimSettings::default());
    let link = bottleneck_link();
    let tcp = TcpConfig::default();
    let handles = dumbbell(&mut sim, &link, &tcp, &[0]).unwrap();
    sim.log_component(handles.sources[0]);

    sim.run_until(from_secs(2.0));
    let report = sim.export_report();

    let flow = report.flow(handles.flows[0]).unwrap();
    // goodput converges near the bottleneck rate (payload 1000 of 1040
    // wire bytes, minus the slow-start ramp)
    assert!(
        flow.throughput_bps > 0.80 * mbps(10) as f64,
        "goodput {} bps too far below the bottleneck",
        flow.throughput_bps
    );

    // a drop-tail bottleneck driven by Reno must overflow at least once
    assert!(report.total_drops() >= 1, "expected at least one drop");

    // cwnd sawtooth: the logged series grows, falls by at least a third,
    // and grows again
    let series = report.metrics.get("cwnd").expect("cwnd series logged");
    let peak = series.iter().map(|(_, v)| *v).fold(0.0, f64::max);
    let mut fell = false;
    let mut prev_peak = 0.0f64;
    for (_, v) in series {
        prev_peak = prev_peak.max(*v);
        if *v < prev_peak * 0.67 {
            fell = true;
            break;
        }
    }
    assert!(peak > 0.0 && fell, "no multiplicative decrease in cwnd series");

    // RTT sanity: the smoothed estimate can never beat two propagation
    // delays
    for node in &report.nodes {
        if let NodeSnapshot::TcpConnection { srtt, .. } = node {
            if *srtt > 0 {
                assert!(*srtt >= 2 * link.delay);
            }
        }
    }
}

#[test]
fn two_flows_share_the_bottleneck_fairly() {
    let mut sim = Simulator::new(SimSettings::default());
    let link = bottleneck_link();
    let tcp = TcpConfig::default();
    let handles = dumbbell(&mut sim, &link, &tcp, &[0, from_millis(200)]).unwrap();

    sim.run_until(from_secs(4.0));
    let report = sim.export_report();

    let jain = report.fairness_index(&handles.flows);
    assert!(jain >= 0.85, "fairness index {jain:.3} too low");
    for id in &handles.flows {
        let f = report.flow(*id).unwrap();
        assert!(
            f.throughput_bps > 0.30 * mbps(10) as f64,
            "flow {} starved at {} bps",
            f.name,
            f.throughput_bps
        );
    }
}

fn multipath_run(algo: CouplingAlgo) -> (f64, Vec<u64>) {
    let mut sim = Simulator::new(SimSettings::default());
    let paths = [
        LinkParams {
            rate: mbps(1),
            delay: from_millis(75), // 150 ms round trip
            queue_bytes: 20_000,
        },
        LinkParams {
            rate: mbps(5),
            delay: from_millis(5), // 10 ms round trip
            queue_bytes: 10_000,
        },
    ];
    let tcp = TcpConfig {
        init_ssthresh: 16_000, // reach congestion avoidance quickly
        ..TcpConfig::default()
    };
    let mptcp = MptcpConfig {
        algo,
        ..MptcpConfig::default()
    };
    let handles = two_path_mptcp(&mut sim, &paths, &tcp, &mptcp, 0).unwrap();

    sim.run_until(from_secs(5.0));
    let report = sim.export_report();
    let agg = report.flow(handles.conn_flow).unwrap().throughput_bps;
    let sent = sim
        .node_as::<MptcpSource>(handles.source)
        .unwrap()
        .subflow_sent();
    (agg, sent)
}

#[test]
fn uncoupled_mptcp_aggregates_both_paths() {
    let (agg, sent) = multipath_run(CouplingAlgo::Uncoupled);
    // ~6 Mbps of raw capacity across the two paths
    assert!(
        agg > 0.65 * mbps(6) as f64,
        "uncoupled aggregate only {agg:.0} bps"
    );
    assert!(sent.iter().all(|s| *s > 0), "an idle subflow: {sent:?}");
}

#[test]
fn fully_coupled_mptcp_backs_off_and_prefers_the_fast_path() {
    let (agg_unc, _) = multipath_run(CouplingAlgo::Uncoupled);
    let (agg_fc, sent_fc) = multipath_run(CouplingAlgo::FullyCoupled);

    // coupling can only make the aggregate more conservative
    assert!(
        agg_fc < agg_unc * 1.05,
        "fully coupled ({agg_fc:.0} bps) should not beat uncoupled ({agg_unc:.0} bps)"
    );
    assert!(agg_fc > mbps(1) as f64, "coupled connection collapsed");
    // traffic concentrates on the fast path
    let total: u64 = sent_fc.iter().sum();
    assert!(
        sent_fc[1] * 2 > total,
        "fast path carried a minority: {sent_fc:?}"
    );
}

#[test]
fn incast_overflows_and_all_workers_finish() {
    let mut sim = Simulator::new(SimSettings::default());
    let link = LinkParams {
        rate: time::gbps(10),
        delay: from_micros(10),
        queue_bytes: 100 * 1040, // hundred-packet shared buffer
    };
    let tcp = TcpConfig {
        init_rto: from_millis(1),
        min_rto: from_micros(200),
        ..TcpConfig::default()
    };
    let handles = incast(&mut sim, 15, &link, &tcp, 100_000, 0).unwrap();

    sim.run_until(from_secs(1.0));
    let report = sim.export_report();

    // every worker delivered its 100 KB despite the congestion
    for id in &handles.flows {
        let f = report.flow(*id).unwrap();
        assert_eq!(f.delivered_bytes, 100_000, "flow {} incomplete", f.name);
    }

    // a synchronized fan-in must overflow the shared buffer repeatedly
    // and push at least one sender into timeout recovery
    assert!(report.total_drops() >= 10, "drops: {}", report.total_drops());
    let rtos: u64 = report
        .nodes
        .iter()
        .map(|n| match n {
            NodeSnapshot::TcpConnection { rtos, .. } => *rtos,
            _ => 0,
        })
        .sum();
    assert!(rtos >= 1, "expected timeout recoveries in incast");

    // completion times stay within a bounded spread
    let fcts: Vec<u64> = report
        .flows
        .iter()
        .filter(|f| f.delivered_bytes > 0)
        .map(|f| f.last_delivery.max(1))
        .collect();
    let max = *fcts.iter().max().unwrap();
    let min = *fcts.iter().min().unwrap();
    assert!(
        max / min < 50,
        "completion spread too wide: {min} .. {max}"
    );
}

#[test]
fn lossless_topology_conserves_packets_in_order() {
    let mut sim = Simulator::new(SimSettings::default());
    let link = LinkParams {
        rate: mbps(10),
        delay: from_micros(100),
        queue_bytes: 10 << 20, // effectively unbounded: nothing drops
    };
    let tcp = TcpConfig {
        flow_bytes: Some(200_000),
        ..TcpConfig::default()
    };
    let handles = dumbbell(&mut sim, &link, &tcp, &[0]).unwrap();

    sim.run_until(from_secs(2.0));
    let report = sim.export_report();

    let flow = report.flow(handles.flows[0]).unwrap();
    // exactly once: every byte delivered, none dropped, no duplicates
    assert_eq!(flow.delivered_bytes, 200_000);
    assert_eq!(flow.dropped_packets, 0);
    assert_eq!(report.total_drops(), 0);
    assert_eq!(flow.delivered_packets, 200);
}
