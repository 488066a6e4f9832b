// Per-stage split artifact.
//
// Produced by `stagecut-split`, consumed by `stagecut-runtime` and the CLI.

use serde::{Deserialize, Serialize};

use crate::cut::Direction;
use crate::event::{EventSlot, SyncRole};
use crate::graph::{Graph, NodeId};

/// A sync tensor as seen at one side of a stage boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryTensor {
    /// Name inside the source graph, e.g. `T3`.
    pub tensor: String,
    /// Sub-graph input or output carrying it, e.g. `T3_sync`.
    pub port: String,
    pub direction: Direction,
    /// The port replaces a source-graph input (pipeline start).
    pub graph_input: bool,
}

/// One stage of a split graph. Owns its nodes, constants and IO.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubGraph {
    pub stage: u32,
    pub graph: Graph,
    /// Parallel to `graph.nodes`: the source node a copy came from, `None`
    /// for inserted wait/record nodes.
    pub origins: Vec<Option<NodeId>>,
    /// Event-id inputs, in the order they were added.
    pub event_slots: Vec<EventSlot>,
    pub boundary_inputs: Vec<BoundaryTensor>,
    pub boundary_outputs: Vec<BoundaryTensor>,
}

impl SubGraph {
    pub fn event_slot(&self, input_name: &str) -> Option<&EventSlot> {
        self.event_slots
            .iter()
            .find(|s| s.input_name() == input_name)
    }

    pub fn boundary_input(&self, port: &str) -> Option<&BoundaryTensor> {
        self.boundary_inputs.iter().find(|b| b.port == port)
    }

    pub fn boundary_output(&self, port: &str) -> Option<&BoundaryTensor> {
        self.boundary_outputs.iter().find(|b| b.port == port)
    }

    /// Source ids of the copied (non-sync) nodes, in sub-graph order.
    pub fn source_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.origins.iter().filter_map(|o| *o)
    }

    /// Number of inserted wait/record nodes.
    pub fn sync_node_count(&self) -> usize {
        self.origins.iter().filter(|o| o.is_none()).count()
    }

    pub fn slots(&self, role: SyncRole, direction: Direction) -> impl Iterator<Item = &EventSlot> {
        self.event_slots
            .iter()
            .filter(move |s| s.role == role && s.direction == direction)
    }
}
