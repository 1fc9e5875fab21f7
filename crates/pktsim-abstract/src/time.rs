/// Simulation time in picoseconds. The clock only moves forward, and only
/// when the event list dispatches the next event.
pub type SimTime = u64;

/// Link speed in bits per second.
pub type Linkspeed = u64;

pub const PS_PER_SEC: u64 = 1_000_000_000_000;
pub const PS_PER_MS: u64 = 1_000_000_000;
pub const PS_PER_US: u64 = 1_000_000;
pub const PS_PER_NS: u64 = 1_000;

pub fn from_secs(secs: f64) -> SimTime {
    (secs * PS_PER_SEC as f64) as SimTime
}

pub fn from_millis(ms: u64) -> SimTime {
    ms * PS_PER_MS
}

pub fn from_micros(us: u64) -> SimTime {
    us * PS_PER_US
}

pub fn from_nanos(ns: u64) -> SimTime {
    ns * PS_PER_NS
}

pub fn as_secs(t: SimTime) -> f64 {
    t as f64 / PS_PER_SEC as f64
}

pub fn mbps(n: u64) -> Linkspeed {
    n * 1_000_000
}

pub fn gbps(n: u64) -> Linkspeed {
    n * 1_000_000_000
}

/// Rate expressed as packets per second for a reference packet size.
pub fn pkts_per_sec(pps: u64, ref_packet_bytes: u64) -> Linkspeed {
    pps * ref_packet_bytes * 8
}

/// Time to put `bytes` on the wire at `rate` bits per second, exact to the
/// picosecond. u128 intermediate so large byte counts cannot overflow.
pub fn transmission_time(bytes: u64, rate: Linkspeed) -> SimTime {
    assert!(rate > 0, "transmission_time: zero link rate");
    ((bytes as u128 * 8 * PS_PER_SEC as u128) / rate as u128) as SimTime
}
