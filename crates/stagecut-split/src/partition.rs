//! Per-stage sub-graph construction.
//!
//! Each stage gets a [`SubGraphBuilder`] that collects copied nodes and the
//! constants, inputs, outputs and shape records they reference. The builder
//! is frozen into an immutable [`SubGraph`] once every node has been placed;
//! freezing checks that every edge of the stage resolves locally, so a
//! tensor can only cross a stage boundary through an inserted wait/record.

use std::collections::HashSet;

use tracing::debug;

use stagecut_types::config::SyncConfig;
use stagecut_types::cut::{CutSpec, Direction};
use stagecut_types::event::EventSlot;
use stagecut_types::graph::{Graph, Initializer, Node, NodeId, ValueInfo};
use stagecut_types::stage::{BoundaryTensor, SubGraph};

use crate::assignment::StageAssignment;
use crate::error::{Result, SplitError};
use crate::sync::SyncInserter;

// ── Builder ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct SubGraphBuilder {
    stage: u32,
    pub(crate) graph: Graph,
    origins: Vec<Option<NodeId>>,
    pub(crate) event_slots: Vec<EventSlot>,
    pub(crate) boundary_inputs: Vec<BoundaryTensor>,
    pub(crate) boundary_outputs: Vec<BoundaryTensor>,
}

impl SubGraphBuilder {
    pub fn new(stage: u32, name: impl Into<String>) -> Self {
        Self {
            stage,
            graph: Graph {
                name: name.into(),
                ..Default::default()
            },
            origins: Vec::new(),
            event_slots: Vec::new(),
            boundary_inputs: Vec::new(),
            boundary_outputs: Vec::new(),
        }
    }

    pub fn stage(&self) -> u32 {
        self.stage
    }

    /// Append a node. `origin` is `None` for inserted sync nodes.
    pub fn push_node(&mut self, origin: Option<NodeId>, node: Node) {
        self.graph.nodes.push(node);
        self.origins.push(origin);
    }

    /// Copy an initializer unless one with the same name is already present.
    pub fn add_initializer(&mut self, init: &Initializer) {
        if self.graph.initializer(&init.name).is_none() {
            self.graph.initializers.push(init.clone());
        }
    }

    pub fn add_input(&mut self, info: ValueInfo) {
        push_unique(&mut self.graph.inputs, info);
    }

    pub fn add_output(&mut self, info: ValueInfo) {
        push_unique(&mut self.graph.outputs, info);
    }

    pub fn add_value_info(&mut self, info: ValueInfo) {
        push_unique(&mut self.graph.value_info, info);
    }

    /// Register an event slot and expose it as an `i64` scalar input.
    pub fn add_event_slot(&mut self, slot: EventSlot) {
        self.add_input(ValueInfo::scalar_i64(slot.input_name()));
        if !self.event_slots.contains(&slot) {
            self.event_slots.push(slot);
        }
    }

    pub fn add_boundary_input(&mut self, boundary: BoundaryTensor) {
        if !self.boundary_inputs.iter().any(|b| b.port == boundary.port) {
            self.boundary_inputs.push(boundary);
        }
    }

    pub fn add_boundary_output(&mut self, boundary: BoundaryTensor) {
        if !self.boundary_outputs.iter().any(|b| b.port == boundary.port) {
            self.boundary_outputs.push(boundary);
        }
    }

    /// Freeze into a [`SubGraph`], rejecting any edge that does not resolve
    /// inside the stage.
    pub fn build(self) -> Result<SubGraph> {
        let mut available: HashSet<&str> = self
            .graph
            .inputs
            .iter()
            .map(|v| v.name.as_str())
            .chain(self.graph.initializers.iter().map(|i| i.name.as_str()))
            .collect();

        for node in &self.graph.nodes {
            for input in node.inputs.iter().filter(|i| !i.is_empty()) {
                if !available.contains(input.as_str()) {
                    return Err(SplitError::DanglingInput {
                        stage: self.stage,
                        node: node.key().unwrap_or(node.name.as_str()).to_string(),
                        tensor: input.clone(),
                    });
                }
            }
            available.extend(node.outputs.iter().map(String::as_str));
        }

        Ok(SubGraph {
            stage: self.stage,
            graph: self.graph,
            origins: self.origins,
            event_slots: self.event_slots,
            boundary_inputs: self.boundary_inputs,
            boundary_outputs: self.boundary_outputs,
        })
    }
}

fn push_unique(list: &mut Vec<ValueInfo>, info: ValueInfo) {
    if !list.iter().any(|v| v.name == info.name) {
        list.push(info);
    }
}

// ── Partitioner ──────────────────────────────────────────────────────────────

pub struct GraphPartitioner<'a> {
    graph: &'a Graph,
    cuts: &'a [CutSpec],
    assignment: &'a StageAssignment,
    config: &'a SyncConfig,
}

impl<'a> GraphPartitioner<'a> {
    pub fn new(
        graph: &'a Graph,
        cuts: &'a [CutSpec],
        assignment: &'a StageAssignment,
        config: &'a SyncConfig,
    ) -> Self {
        Self {
            graph,
            cuts,
            assignment,
            config,
        }
    }

    /// Build one frozen sub-graph per cut, in stage order.
    pub fn partition(&self) -> Result<Vec<SubGraph>> {
        self.check_parts()?;

        let base = if self.graph.name.is_empty() { "stage" } else { self.graph.name.as_str() };
        let mut builders: Vec<SubGraphBuilder> = (0..self.cuts.len() as u32)
            .map(|stage| SubGraphBuilder::new(stage, format!("{base}_{stage}")))
            .collect();

        // Forward entry precedes every node of the stage.
        for (stage, builder) in builders.iter_mut().enumerate() {
            self.inserter(stage as u32, Direction::Forward)
                .insert_entry(builder, &self.cuts[stage].forward)?;
        }

        for (id, node) in self.graph.nodes_with_ids() {
            let stage = self.assignment.placement(id).stage;
            let cut = &self.cuts[stage as usize];
            let builder = &mut builders[stage as usize];
            let key = node.key();

            if key.is_some() && key == cut.backward.first_node() {
                self.inserter(stage, Direction::Backward)
                    .insert_entry(builder, &cut.backward)?;
            }

            self.copy_node(builder, cut, id, node);

            let exit = if key.is_some() && key == cut.forward.last_node() {
                Some(Direction::Forward)
            } else if key.is_some() && key == cut.backward.last_node() {
                Some(Direction::Backward)
            } else {
                None
            };
            if let Some(direction) = exit {
                self.inserter(stage, direction)
                    .insert_exit(builder, cut.part(direction))?;
            }
        }

        builders
            .into_iter()
            .map(|b| {
                let sub = b.build()?;
                debug!(
                    stage = sub.stage,
                    nodes = sub.graph.nodes.len(),
                    sync_nodes = sub.sync_node_count(),
                    inputs = sub.graph.inputs.len(),
                    outputs = sub.graph.outputs.len(),
                    "stage sub-graph frozen"
                );
                Ok(sub)
            })
            .collect()
    }

    fn inserter(&self, stage: u32, direction: Direction) -> SyncInserter<'a> {
        SyncInserter::new(self.graph, self.config, stage, direction)
    }

    /// Copy `node` verbatim and pull in what it references from the source.
    fn copy_node(&self, builder: &mut SubGraphBuilder, cut: &CutSpec, id: NodeId, node: &Node) {
        builder.push_node(Some(id), node.clone());

        for input in node.inputs.iter().filter(|i| !i.is_empty()) {
            if let Some(init) = self.graph.initializer(input) {
                builder.add_initializer(init);
            }
            if !cut.is_sync_input(input) {
                if let Some(info) = self.graph.input(input) {
                    builder.add_input(info.clone());
                }
            }
        }

        for output in &node.outputs {
            if let Some(info) = self.graph.output(output) {
                builder.add_output(info.clone());
            } else if cut.is_sync_output(output) {
                // Shape record comes with the exit record.
                continue;
            } else if let Some(info) = self.graph.value_info(output) {
                builder.add_value_info(info.clone());
            }
        }
    }

    /// A part that declares sync tensors or dependencies needs nodes to anchor
    /// its wait and record on.
    fn check_parts(&self) -> Result<()> {
        for (stage, cut) in self.cuts.iter().enumerate() {
            for direction in Direction::ALL {
                let part = cut.part(direction);
                if part.nodes.is_empty() && (part.needs_wait() || part.needs_record()) {
                    return Err(SplitError::MalformedCut {
                        stage: stage as u32,
                        direction,
                        reason: "sync tensors or dependencies declared on a part without nodes"
                            .into(),
                    });
                }
            }
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use stagecut_types::cut::PartCut;
    use stagecut_types::event::{EventNamespace, SyncRole};
    use stagecut_types::tensor::{ElemType, Tensor};

    use crate::assignment::{assign_stages, NodeIndex};

    fn float(name: &str) -> ValueInfo {
        ValueInfo::new(name, ElemType::Float, vec![])
    }

    #[test]
    fn builder_dedups_by_name() {
        let mut b = SubGraphBuilder::new(0, "s0");
        let w = Initializer {
            name: "W".into(),
            tensor: Tensor::from_f32(vec![1], vec![1.0]).unwrap(),
        };
        b.add_initializer(&w);
        b.add_initializer(&w);
        b.add_input(float("X"));
        b.add_input(float("X"));
        let slot = EventSlot::new(SyncRole::Wait, EventNamespace::Pipeline, 0, Direction::Forward);
        b.add_event_slot(slot);
        b.add_event_slot(slot);
        b.push_node(Some(NodeId(0)), Node::new("Mul", ["X", "W"], ["Y"]));
        let sub = b.build().unwrap();
        assert_eq!(sub.graph.initializers.len(), 1);
        assert_eq!(sub.graph.inputs.len(), 2);
        assert_eq!(sub.event_slots.len(), 1);
        assert_eq!(sub.graph.inputs[1].elem_type, ElemType::Int64);
    }

    #[test]
    fn build_rejects_dangling_edges() {
        let mut b = SubGraphBuilder::new(2, "s2");
        b.add_input(float("X"));
        b.push_node(Some(NodeId(0)), Node::new("Add", ["X", "T3"], ["Y"]));
        let err = b.build().unwrap_err();
        assert!(matches!(
            err,
            SplitError::DanglingInput { stage: 2, ref tensor, .. } if tensor == "T3"
        ));
    }

    #[test]
    fn build_skips_absent_optional_inputs() {
        let mut b = SubGraphBuilder::new(0, "s0");
        b.add_input(float("X"));
        b.push_node(Some(NodeId(0)), Node::new("Dropout", ["X", ""], ["Y"]));
        assert!(b.build().is_ok());
    }

    #[test]
    fn copies_referenced_constants_and_io() {
        let graph = Graph {
            name: "g".into(),
            nodes: vec![
                Node::new("Mul", ["X", "W"], ["Y"]),
                Node::new("Relu", ["Y"], ["Z"]),
            ],
            initializers: vec![Initializer {
                name: "W".into(),
                tensor: Tensor::from_f32(vec![1], vec![3.0]).unwrap(),
            }],
            value_info: vec![float("Y")],
            inputs: vec![float("X")],
            outputs: vec![float("Z")],
        };
        let cuts = vec![CutSpec {
            forward: PartCut {
                nodes: vec!["Y".into(), "Z".into()],
                ..Default::default()
            },
            ..Default::default()
        }];
        let index = NodeIndex::build(&graph).unwrap();
        let assignment = assign_stages(&graph, &index, &cuts).unwrap();
        let config = SyncConfig::default();
        let subs = GraphPartitioner::new(&graph, &cuts, &assignment, &config)
            .partition()
            .unwrap();

        assert_eq!(subs.len(), 1);
        let s = &subs[0];
        assert_eq!(s.graph.name, "g_0");
        assert_eq!(s.graph.nodes, graph.nodes);
        assert_eq!(s.graph.initializers, graph.initializers);
        assert_eq!(s.graph.inputs, graph.inputs);
        assert_eq!(s.graph.outputs, graph.outputs);
        assert_eq!(s.graph.value_info, graph.value_info);
        assert!(s.event_slots.is_empty());
        assert_eq!(s.sync_node_count(), 0);
    }

    #[test]
    fn sync_declared_on_empty_part_is_malformed() {
        let graph = Graph {
            nodes: vec![Node::new("Relu", ["X"], ["Y"])],
            inputs: vec![float("X")],
            ..Default::default()
        };
        let cuts = vec![CutSpec {
            forward: PartCut {
                nodes: vec!["Y".into()],
                ..Default::default()
            },
            backward: PartCut {
                record_depends: vec!["Y".into()],
                ..Default::default()
            },
        }];
        let index = NodeIndex::build(&graph).unwrap();
        let assignment = assign_stages(&graph, &index, &cuts).unwrap();
        let config = SyncConfig::default();
        let err = GraphPartitioner::new(&graph, &cuts, &assignment, &config)
            .partition()
            .unwrap_err();
        assert!(matches!(
            err,
            SplitError::MalformedCut { stage: 0, direction: Direction::Backward, .. }
        ));
    }
}
