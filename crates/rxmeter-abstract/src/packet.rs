use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a node inside one simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node{}", self.0)
    }
}

/// A tracked receiver whose bytes are counted independently.
///
/// Stations are numbered from 1; [`EntityId::AGGREGATE`] holds the
/// de-duplicated total across all stations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u32);

impl EntityId {
    pub const AGGREGATE: EntityId = EntityId(0);

    pub fn station(index: u32) -> Self {
        EntityId(index + 1)
    }

    pub fn is_aggregate(&self) -> bool {
        *self == Self::AGGREGATE
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    /// Simulation-wide identifier. Copies of one broadcast share it.
    pub uid: u64,
    /// Payload size in bytes
    pub size: u32,
    pub source: NodeId,
}

impl Packet {
    pub fn new(uid: u64, size: u32, source: NodeId) -> Self {
        Self { uid, size, source }
    }
}

/// A packet handed up by a bound receive socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub node: NodeId,
    pub entity: EntityId,
    pub packet: Packet,
}
