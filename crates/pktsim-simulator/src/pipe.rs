use std::any::Any;
use std::collections::VecDeque;

use pktsim_abstract::{Packet, PacketSink, SimContext, SimTime};

const TOKEN_ARRIVAL: u32 = 0;

/// Fixed propagation delay: one direction of a wire. No buffer bound and no
/// capacity limit; serialization happens in the queue feeding the pipe.
pub struct Pipe {
    name: String,
    delay: SimTime,
    /// (arrival time, packet); arrival order equals insertion order because
    /// the delay is constant.
    in_transit: VecDeque<(SimTime, Packet)>,
}

impl Pipe {
    pub fn new(delay: SimTime, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            delay,
            in_transit: VecDeque::new(),
        }
    }

    pub fn delay(&self) -> SimTime {
        self.delay
    }
}

impl PacketSink for Pipe {
    fn receive(&mut self, pkt: Packet, ctx: &mut dyn SimContext) {
        let arrival = ctx.now() + self.delay;
        if self.in_transit.is_empty() {
            // one pending wakeup, always for the head
            ctx.schedule_at(arrival, TOKEN_ARRIVAL);
        }
        self.in_transit.push_back((arrival, pkt));
    }

    fn do_next_event(&mut self, _token: u32, ctx: &mut dyn SimContext) {
        let now = ctx.now();
        while let Some((arrival, _)) = self.in_transit.front() {
            if *arrival > now {
                break;
            }
            let (_, pkt) = self.in_transit.pop_front().expect("front checked");
            ctx.forward(pkt);
        }
        if let Some((arrival, _)) = self.in_transit.front() {
            ctx.schedule_at(*arrival, TOKEN_ARRIVAL);
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Simulator;
    use pktsim_abstract::{FlowId, PacketHeader, Route, SimSettings};
    use std::rc::Rc;

    struct Counter {
        name: String,
        arrivals: Vec<SimTime>,
    }

    impl PacketSink for Counter {
        fn receive(&mut self, pkt: Packet, ctx: &mut dyn SimContext) {
            self.arrivals.push(ctx.now());
            ctx.release_packet(pkt);
        }

        fn do_next_event(&mut self, _token: u32, _ctx: &mut dyn SimContext) {}

        fn name(&self) -> &str {
            &self.name
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    struct Emitter {
        name: String,
        route: Rc<Route>,
    }

    impl PacketSink for Emitter {
        fn receive(&mut self, pkt: Packet, ctx: &mut dyn SimContext) {
            ctx.release_packet(pkt);
        }

        fn do_next_event(&mut self, _token: u32, ctx: &mut dyn SimContext) {
            let mut pkt = ctx.alloc_packet(PacketHeader::TcpData {
                seqno: 0,
                syn: false,
                ts: ctx.now(),
                retransmit: false,
                dsn: None,
            });
            pkt.size = 1000;
            pkt.flow = FlowId(1);
            pkt.route = Some(self.route.clone());
            ctx.forward(pkt);
        }

        fn name(&self) -> &str {
            &self.name
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn delivers_after_fixed_delay_in_order() {
        let mut sim = Simulator::new(SimSettings::default());
        let pipe = sim.add_node(Box::new(Pipe::new(500, "wire")));
        let dst = sim.add_node(Box::new(Counter {
            name: "dst".into(),
            arrivals: Vec::new(),
        }));
        let route = Rc::new(Route::new(vec![pipe, dst]));
        let src = sim.add_node(Box::new(Emitter {
            name: "src".into(),
            route,
        }));

        sim.schedule_node(src, 100, 0);
        sim.schedule_node(src, 150, 0);
        sim.run_to_completion();

        let dst = sim.node_as::<Counter>(dst).unwrap();
        assert_eq!(dst.arrivals, vec![600, 650]);
    }

    #[test]
    fn zero_delay_pipe_delivers_same_instant_after_earlier_events() {
        let mut sim = Simulator::new(SimSettings::default());
        let pipe = sim.add_node(Box::new(Pipe::new(0, "zero")));
        let dst = sim.add_node(Box::new(Counter {
            name: "dst".into(),
            arrivals: Vec::new(),
        }));
        let route = Rc::new(Route::new(vec![pipe, dst]));
        let src = sim.add_node(Box::new(Emitter {
            name: "src".into(),
            route,
        }));

        sim.schedule_node(src, 42, 0);
        sim.run_to_completion();
        assert_eq!(sim.node_as::<Counter>(dst).unwrap().arrivals, vec![42]);
        assert_eq!(sim.now(), 42);
    }
}
