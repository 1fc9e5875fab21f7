use serde::Serialize;

/// Index of a packet sink in the simulator's node arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SinkId(pub usize);

/// An ordered list of sinks describing a packet's path. Immutable after
/// construction and shared by reference across all packets of the path.
/// The sink at position `i` hands the packet to position `i + 1` after
/// applying its own semantics; the final sink is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    hops: Vec<SinkId>,
}

impl Route {
    pub fn new(hops: Vec<SinkId>) -> Self {
        assert!(!hops.is_empty(), "a route needs at least a terminal sink");
        Self { hops }
    }

    pub fn hop(&self, index: usize) -> Option<SinkId> {
        self.hops.get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    pub fn terminal(&self) -> SinkId {
        *self.hops.last().expect("route is never empty")
    }

    pub fn hops(&self) -> &[SinkId] {
        &self.hops
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hop_lookup() {
        let r = Route::new(vec![SinkId(3), SinkId(1), SinkId(8)]);
        assert_eq!(r.hop(0), Some(SinkId(3)));
        assert_eq!(r.hop(2), Some(SinkId(8)));
        assert_eq!(r.hop(3), None);
        assert_eq!(r.terminal(), SinkId(8));
        assert_eq!(r.len(), 3);
    }

    #[test]
    #[should_panic]
    fn empty_route_rejected() {
        Route::new(Vec::new());
    }
}
