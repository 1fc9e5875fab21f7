use serde::Serialize;

/// Globally unique flow identity. Ids at or above [`DYNAMIC_FLOW_BASE`] are
/// handed out by the simulator's counter; anything below is reserved for
/// scenario-assigned static ids so the two can never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FlowId(pub u64);

pub const DYNAMIC_FLOW_BASE: u64 = 1 << 20;

/// A logical connection grouping packets for accounting. The source stamps
/// the flow into each packet at creation; downstream code only reads it.
#[derive(Debug, Clone)]
pub struct PacketFlow {
    pub id: FlowId,
    pub name: String,
}

impl PacketFlow {
    pub fn new(id: FlowId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}
