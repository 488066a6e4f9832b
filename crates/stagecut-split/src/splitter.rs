//! Split entry point.
//!
//! Runs the three phases in order and produces either every stage or an
//! error; a failed split never yields partial output.
//! 1. Index nodes by their first output.
//! 2. Assign every node to exactly one (stage, direction).
//! 3. Partition into frozen sub-graphs, inserting wait/record nodes.

use tracing::info;

use stagecut_types::config::SyncConfig;
use stagecut_types::cut::CutSpec;
use stagecut_types::graph::Graph;
use stagecut_types::stage::SubGraph;

use crate::assignment::{assign_stages, NodeIndex};
use crate::error::Result;
use crate::partition::GraphPartitioner;

#[derive(Debug, Clone, Default)]
pub struct PipelineSplitter {
    config: SyncConfig,
}

impl PipelineSplitter {
    pub fn new(config: SyncConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Split `graph` into `cuts.len()` stage sub-graphs.
    pub fn split(&self, graph: &Graph, cuts: &[CutSpec]) -> Result<Vec<SubGraph>> {
        self.config.validate()?;
        let index = NodeIndex::build(graph)?;
        let assignment = assign_stages(graph, &index, cuts)?;
        let subs = GraphPartitioner::new(graph, cuts, &assignment, &self.config).partition()?;

        for sub in &subs {
            info!(
                graph = %graph.name,
                stage = sub.stage,
                nodes = sub.graph.nodes.len() - sub.sync_node_count(),
                sync_nodes = sub.sync_node_count(),
                event_slots = sub.event_slots.len(),
                "stage built"
            );
        }
        Ok(subs)
    }
}

/// Split with the default sync conventions.
pub fn split(graph: &Graph, cuts: &[CutSpec]) -> Result<Vec<SubGraph>> {
    PipelineSplitter::default().split(graph, cuts)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
