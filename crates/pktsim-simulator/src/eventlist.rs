use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use pktsim_abstract::{EventHandle, SimTime, SinkId};
use tracing::debug;

#[derive(Debug)]
struct Entry {
    time: SimTime,
    target: SinkId,
    token: u32,
    seq: u64, // insertion order; unique, breaks ties FIFO
}

// Custom Ord for Min-Heap (smallest time pops first)
impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse comparison for time: smallest time is Greater in BinaryHeap
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// The global scheduler: virtual clock plus a time-ordered multiset of
/// (fire time, target) entries. Exactly one exists per simulation.
///
/// Cancellation is lazy: a handle's sequence number is removed from the
/// live set and the heap entry is discarded when it surfaces. That makes
/// cancel O(1) and double-cancel trivially idempotent.
#[derive(Debug)]
pub struct EventList {
    time: SimTime,
    end_time: Option<SimTime>,
    heap: BinaryHeap<Entry>,
    live: HashSet<u64>,
    /// Immediate callbacks, drained LIFO before any time-ordered pop.
    triggers: Vec<(SinkId, u32)>,
    next_seq: u64,
}

impl Default for EventList {
    fn default() -> Self {
        Self::new()
    }
}

impl EventList {
    pub fn new() -> Self {
        Self {
            time: 0,
            end_time: None,
            heap: BinaryHeap::new(),
            live: HashSet::new(),
            triggers: Vec::new(),
            next_seq: 0,
        }
    }

    pub fn now(&self) -> SimTime {
        self.time
    }

    pub fn set_endtime(&mut self, end: SimTime) {
        self.end_time = Some(end);
    }

    pub fn endtime(&self) -> Option<SimTime> {
        self.end_time
    }

    /// Insert an entry for `target` at `at`. Multiple entries per target
    /// are permitted. Scheduling in the past is a programming error;
    /// scheduling at or past the end time is silently dropped.
    pub fn schedule(&mut self, target: SinkId, at: SimTime, token: u32) -> EventHandle {
        assert!(
            at >= self.time,
            "{:?} scheduled at {} but the clock is already at {}: scheduling in the past",
            target,
            at,
            self.time
        );
        if let Some(end) = self.end_time
            && at >= end
        {
            debug!(?target, at, end, "schedule past end time dropped");
            return EventHandle::INERT;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry {
            time: at,
            target,
            token,
            seq,
        });
        self.live.insert(seq);
        EventHandle::new(seq)
    }

    pub fn schedule_in(&mut self, target: SinkId, delay: SimTime, token: u32) -> EventHandle {
        self.schedule(target, self.time + delay, token)
    }

    /// Idempotent: cancelling a handle that already fired (or was inert)
    /// is a no-op.
    pub fn cancel(&mut self, handle: EventHandle) {
        if handle.is_inert() {
            return;
        }
        self.live.remove(&handle.seq());
    }

    /// Enqueue a zero-delay callback. All pending triggers drain in LIFO
    /// order before the next time-ordered event fires.
    pub fn trigger_now(&mut self, target: SinkId, token: u32) {
        self.triggers.push((target, token));
    }

    /// Pop the next event and advance the clock to it. `None` once the
    /// queue is drained or the end time is reached.
    pub fn do_next_event(&mut self) -> Option<(SinkId, u32)> {
        if let Some((target, token)) = self.triggers.pop() {
            return Some((target, token));
        }
        while let Some(entry) = self.heap.pop() {
            if !self.live.remove(&entry.seq) {
                continue; // cancelled
            }
            if let Some(end) = self.end_time
                && entry.time >= end
            {
                return None;
            }
            debug_assert!(entry.time >= self.time, "clock would move backward");
            self.time = entry.time;
            return Some((entry.target, entry.token));
        }
        None
    }

    pub fn pending_events(&self) -> usize {
        self.live.len() + self.triggers.len()
    }
}
