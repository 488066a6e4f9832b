//! Node-to-stage assignment from caller-supplied cuts.
//!
//! Algorithm:
//! 1. Index every node by its first output name (must be unique).
//! 2. Walk the cuts in stage order, forward part before backward part, and
//!    claim each listed name for that (stage, direction).
//! 3. Reject names that are unknown or claimed twice.
//! 4. Require every node to be claimed: the assignment must be total.
//!
//! No topological inference is performed; stage membership comes entirely
//! from the cuts.

use std::collections::HashMap;

use stagecut_types::cut::{CutSpec, Direction};
use stagecut_types::graph::{Graph, NodeId};

use crate::error::{Result, SplitError};

// ── Node index ───────────────────────────────────────────────────────────────

/// Name → id lookup built once per split.
#[derive(Debug, Clone)]
pub struct NodeIndex {
    by_name: HashMap<String, NodeId>,
}

impl NodeIndex {
    pub fn build(graph: &Graph) -> Result<Self> {
        let mut by_name = HashMap::with_capacity(graph.nodes.len());
        for (id, node) in graph.nodes_with_ids() {
            let key = node
                .key()
                .ok_or(SplitError::AnonymousNode { index: id.index() })?;
            if by_name.insert(key.to_string(), id).is_some() {
                return Err(SplitError::DuplicateNode(key.to_string()));
            }
        }
        Ok(Self { by_name })
    }

    pub fn get(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

// ── Assignment ───────────────────────────────────────────────────────────────

/// Stage and part of a single node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub stage: u32,
    pub direction: Direction,
}

/// Total, disjoint mapping from node id to placement.
#[derive(Debug, Clone)]
pub struct StageAssignment {
    placements: Vec<Placement>,
    num_stages: u32,
}

impl StageAssignment {
    pub fn placement(&self, id: NodeId) -> Placement {
        self.placements[id.index()]
    }

    pub fn num_stages(&self) -> u32 {
        self.num_stages
    }

    /// Ids of all nodes placed on `stage`, in source order.
    pub fn nodes_of(&self, stage: u32) -> Vec<NodeId> {
        self.placements
            .iter()
            .enumerate()
            .filter(|(_, p)| p.stage == stage)
            .map(|(i, _)| NodeId(i as u32))
            .collect()
    }
}

/// Assign every node of `graph` to exactly one stage.
pub fn assign_stages(graph: &Graph, index: &NodeIndex, cuts: &[CutSpec]) -> Result<StageAssignment> {
    if cuts.is_empty() {
        return Err(SplitError::NoCuts);
    }

    // ── 2-3. Claim listed names ──────────────────────────────────────────
    let mut claimed: Vec<Option<Placement>> = vec![None; graph.nodes.len()];

    for (stage, cut) in cuts.iter().enumerate() {
        let stage = stage as u32;
        for direction in Direction::ALL {
            for name in &cut.part(direction).nodes {
                let id = index.get(name).ok_or_else(|| SplitError::UnknownNode {
                    stage,
                    direction,
                    name: name.clone(),
                })?;
                let slot = &mut claimed[id.index()];
                if let Some(prev) = slot {
                    return Err(SplitError::OverlappingCut {
                        name: name.clone(),
                        first: prev.stage,
                        second: stage,
                    });
                }
                *slot = Some(Placement { stage, direction });
            }
        }
    }

    // ── 4. Totality ──────────────────────────────────────────────────────
    let placements = claimed
        .into_iter()
        .zip(&graph.nodes)
        .map(|(p, node)| {
            p.ok_or_else(|| {
                SplitError::UnassignedNode(node.key().unwrap_or_default().to_string())
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(StageAssignment {
        placements,
        num_stages: cuts.len() as u32,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
