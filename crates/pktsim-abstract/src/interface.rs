use std::any::Any;

use crate::flow::FlowId;
use crate::packet::{Packet, PacketHeader};
use crate::route::SinkId;
use crate::time::SimTime;
use crate::trace::TraceEventKind;

/// Handle returned when scheduling an event, used for cancellation.
/// Handles are opaque; an inert handle (from a schedule that was dropped
/// because it fell past the end time) cancels to a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventHandle(u64);

impl EventHandle {
    pub const INERT: EventHandle = EventHandle(u64::MAX);

    pub fn new(seq: u64) -> Self {
        Self(seq)
    }

    pub fn seq(&self) -> u64 {
        self.0
    }

    pub fn is_inert(&self) -> bool {
        self.0 == u64::MAX
    }
}

/// The capability surface handed to a sink while one of its handlers runs.
/// Every side effect a component can have on the simulation flows through
/// here; between events a component "suspends" by scheduling itself and
/// returning.
pub trait SimContext {
    /// Current virtual time.
    fn now(&self) -> SimTime;

    /// Schedule the current node's `do_next_event(token)` at `at`.
    /// Scheduling in the past is a programming error and panics.
    fn schedule_at(&mut self, at: SimTime, token: u32) -> EventHandle;

    fn schedule_in(&mut self, delay: SimTime, token: u32) -> EventHandle;

    /// Idempotent; cancelling a fired or inert handle is a no-op.
    fn cancel(&mut self, handle: EventHandle);

    /// Enqueue a zero-delay callback, drained LIFO before the clock next
    /// advances.
    fn trigger_now(&mut self, target: SinkId, token: u32);

    fn alloc_packet(&mut self, header: PacketHeader) -> Packet;

    /// Return a packet to the pool on clean consumption.
    fn release_packet(&mut self, pkt: Packet);

    /// Hand the packet to the next sink on its route, in this same virtual
    /// instant. A packet whose route is exhausted or missing is logged and
    /// dropped, not a crash.
    fn forward(&mut self, pkt: Packet);

    /// Route-less handoff for control frames (PFC pause).
    fn deliver_to(&mut self, to: SinkId, pkt: Packet);

    /// Drop with per-flow accounting, then release to the pool.
    fn drop_packet(&mut self, pkt: Packet);

    /// Terminal-sink delivery accounting for the flow table.
    fn delivered(&mut self, flow: FlowId, bytes: u64, packets: u64);

    /// Emit an observer record; discarded unless logging is enabled for
    /// the current node.
    fn trace(&mut self, kind: TraceEventKind);

    /// Append to a named metric time series (cwnd, rtt, queue depth...).
    fn record_metric(&mut self, name: &str, value: f64);

    fn log_enabled(&self) -> bool;
}

/// A packet sink: anything that can receive a packet and be woken by the
/// event list. Queues, pipes, TCP endpoints and MPTCP coordinators all
/// implement this.
pub trait PacketSink {
    fn receive(&mut self, pkt: Packet, ctx: &mut dyn SimContext);

    /// Invoked when an event scheduled by this node fires; `token` is the
    /// value passed at schedule time and distinguishes timer kinds.
    fn do_next_event(&mut self, token: u32, ctx: &mut dyn SimContext);

    fn name(&self) -> &str;

    /// End-of-run state for the report; `None` for stateless elements.
    fn snapshot(&self) -> Option<crate::trace::NodeSnapshot> {
        None
    }

    /// Typed access for the wiring layer.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
