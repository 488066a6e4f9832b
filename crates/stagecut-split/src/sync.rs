//! Wait/record insertion at part boundaries.
//!
//! Per micro-batch a sync tensor `X` flows as:
//!
//! ```text
//! producer stage                                consumer stage
//! ... -> X -> record_pipeline -> X_send ->      X_sync -> wait_data -> X_recv
//!                                record_data -> X_sync     -> wait_pipeline -> X -> ...
//! ```
//!
//! The data pair orders a producer against consumers of the same buffer; the
//! pipeline pair orders stages within one micro-batch. The pipeline start
//! (stage 0 forward) has no data wait and the pipeline end (stage 0 backward)
//! has no data record.

use std::collections::BTreeMap;

use tracing::debug;

use stagecut_types::config::SyncConfig;
use stagecut_types::cut::{Direction, PartCut};
use stagecut_types::event::{EventNamespace, EventSlot, SyncRole, NAMESPACE_ATTR};
use stagecut_types::graph::{AttributeValue, Graph, Node};
use stagecut_types::stage::BoundaryTensor;

use crate::error::{Result, SplitError};
use crate::partition::SubGraphBuilder;

pub struct SyncInserter<'a> {
    main: &'a Graph,
    config: &'a SyncConfig,
    stage: u32,
    direction: Direction,
}

impl<'a> SyncInserter<'a> {
    pub fn new(main: &'a Graph, config: &'a SyncConfig, stage: u32, direction: Direction) -> Self {
        Self {
            main,
            config,
            stage,
            direction,
        }
    }

    /// First part to run for a micro-batch.
    pub fn is_pipeline_start(&self) -> bool {
        self.stage == 0 && self.direction == Direction::Forward
    }

    /// Last part to run for a micro-batch: the backward chain ends at stage 0.
    pub fn is_pipeline_end(&self) -> bool {
        self.stage == 0 && self.direction == Direction::Backward
    }

    // ── Entry ────────────────────────────────────────────────────────────

    /// Insert the data-wait (unless pipeline start) and pipeline-wait nodes
    /// that gate `part`'s sync inputs and wait dependencies.
    pub fn insert_entry(&self, builder: &mut SubGraphBuilder, part: &PartCut) -> Result<()> {
        if !part.needs_wait() {
            return Ok(());
        }

        let pipeline_slot = self.slot(SyncRole::Wait, EventNamespace::Pipeline);
        let data_slot = (!self.is_pipeline_start())
            .then(|| self.slot(SyncRole::Wait, EventNamespace::Data));

        let mut data_wait = data_slot.map(|slot| self.sync_node(&self.config.wait_op, slot));
        let mut pipeline_wait = self.sync_node(&self.config.wait_op, pipeline_slot);

        for name in &part.sync_inputs {
            let port = self.config.sync_name(name);
            let recv = self.config.recv_name(name);

            match data_wait.as_mut() {
                Some(wait) => {
                    wait.inputs.push(port.clone());
                    wait.outputs.push(recv.clone());
                    pipeline_wait.inputs.push(recv.clone());
                }
                None => pipeline_wait.inputs.push(port.clone()),
            }
            pipeline_wait.outputs.push(name.clone());

            let graph_input = self.main.input(name).is_some();
            let info = self
                .main
                .type_of(name)
                .ok_or_else(|| SplitError::MissingValueInfo {
                    stage: self.stage,
                    tensor: name.clone(),
                })?;

            builder.add_input(info.renamed(port.clone()));
            if data_wait.is_some() {
                builder.add_value_info(info.renamed(recv));
            }
            builder.add_value_info(info.renamed(name.clone()));
            builder.add_boundary_input(BoundaryTensor {
                tensor: name.clone(),
                port,
                direction: self.direction,
                graph_input,
            });
        }

        let first_wait = data_wait.as_mut().unwrap_or(&mut pipeline_wait);
        first_wait.inputs.extend(part.wait_depends.iter().cloned());

        if let (Some(wait), Some(slot)) = (data_wait, data_slot) {
            debug!(stage = self.stage, direction = %self.direction, slot = %slot, "inserted data wait");
            builder.push_node(None, wait);
            builder.add_event_slot(slot);
        }
        debug!(stage = self.stage, direction = %self.direction, slot = %pipeline_slot, "inserted pipeline wait");
        builder.push_node(None, pipeline_wait);
        builder.add_event_slot(pipeline_slot);

        Ok(())
    }

    // ── Exit ─────────────────────────────────────────────────────────────

    /// Insert the pipeline-record and (unless pipeline end) data-record
    /// nodes that publish `part`'s sync outputs and record dependencies.
    pub fn insert_exit(&self, builder: &mut SubGraphBuilder, part: &PartCut) -> Result<()> {
        if !part.needs_record() {
            return Ok(());
        }

        let pipeline_slot = self.slot(SyncRole::Record, EventNamespace::Pipeline);
        let data_slot = (!self.is_pipeline_end())
            .then(|| self.slot(SyncRole::Record, EventNamespace::Data));

        let mut pipeline_record = self.sync_node(&self.config.record_op, pipeline_slot);
        let mut data_record = data_slot.map(|slot| self.sync_node(&self.config.record_op, slot));

        for name in &part.sync_outputs {
            let port = self.config.sync_name(name);
            let send = self.config.send_name(name);

            let info = self
                .main
                .type_of(name)
                .ok_or_else(|| SplitError::MissingValueInfo {
                    stage: self.stage,
                    tensor: name.clone(),
                })?;

            pipeline_record.inputs.push(name.clone());
            match data_record.as_mut() {
                Some(record) => {
                    pipeline_record.outputs.push(send.clone());
                    record.inputs.push(send.clone());
                    record.outputs.push(port.clone());
                    builder.add_value_info(info.renamed(send));
                }
                None => pipeline_record.outputs.push(port.clone()),
            }

            builder.add_output(info.renamed(port.clone()));
            builder.add_value_info(info.renamed(name.clone()));
            builder.add_boundary_output(BoundaryTensor {
                tensor: name.clone(),
                port,
                direction: self.direction,
                graph_input: false,
            });
        }

        pipeline_record
            .inputs
            .extend(part.record_depends.iter().cloned());

        debug!(stage = self.stage, direction = %self.direction, slot = %pipeline_slot, "inserted pipeline record");
        builder.push_node(None, pipeline_record);
        builder.add_event_slot(pipeline_slot);
        if let (Some(record), Some(slot)) = (data_record, data_slot) {
            debug!(stage = self.stage, direction = %self.direction, slot = %slot, "inserted data record");
            builder.push_node(None, record);
            builder.add_event_slot(slot);
        }

        Ok(())
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    fn slot(&self, role: SyncRole, namespace: EventNamespace) -> EventSlot {
        EventSlot::new(role, namespace, self.stage, self.direction)
    }

    /// A sync node whose first input is its event-id slot.
    fn sync_node(&self, op_type: &str, slot: EventSlot) -> Node {
        let name = slot.input_name();
        let mut attributes = BTreeMap::new();
        attributes.insert(
            NAMESPACE_ATTR.to_string(),
            AttributeValue::String(slot.namespace.as_str().to_string()),
        );
        Node {
            name: name.clone(),
            op_type: op_type.to_string(),
            domain: self.config.domain.clone(),
            inputs: vec![name],
            outputs: Vec::new(),
            attributes,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use stagecut_types::graph::{Dim, NodeId, ValueInfo};
    use stagecut_types::tensor::ElemType;

    fn main_graph() -> Graph {
        let f = |n: &str| ValueInfo::new(n, ElemType::Float, vec![]);
        Graph {
            value_info: vec![f("T3"), f("T6"), f("T3_grad")],
            inputs: vec![f("X")],
            outputs: vec![f("W1_grad")],
            ..Default::default()
        }
    }

    fn part(inputs: &[&str], outputs: &[&str], waits: &[&str], records: &[&str]) -> PartCut {
        let v = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect();
        PartCut {
            nodes: vec!["anchor".into()],
            sync_inputs: v(inputs),
            sync_outputs: v(outputs),
            wait_depends: v(waits),
            record_depends: v(records),
        }
    }

    #[test]
    fn pipeline_start_has_single_wait() {
        let g = main_graph();
        let cfg = SyncConfig::default();
        let mut b = SubGraphBuilder::new(0, "s0");
        SyncInserter::new(&g, &cfg, 0, Direction::Forward)
            .insert_entry(&mut b, &part(&["X"], &[], &[], &[]))
            .unwrap();
        let sub = b.build().unwrap();

        assert_eq!(sub.graph.nodes.len(), 1);
        let wait = &sub.graph.nodes[0];
        assert_eq!(wait.op_type, "WaitEvent");
        assert_eq!(wait.inputs, vec!["wait_pipeline_0_fw", "X_sync"]);
        assert_eq!(wait.outputs, vec!["X"]);
        assert_eq!(wait.attribute_str(NAMESPACE_ATTR), Some("pipeline"));

        let names: Vec<_> = sub.graph.inputs.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["X_sync", "wait_pipeline_0_fw"]);
        assert!(sub.boundary_inputs[0].graph_input);
        assert_eq!(sub.origins, vec![None]);
    }

    #[test]
    fn middle_stage_chains_data_then_pipeline_wait() {
        let g = main_graph();
        let cfg = SyncConfig::default();
        let mut b = SubGraphBuilder::new(1, "s1");
        SyncInserter::new(&g, &cfg, 1, Direction::Backward)
            .insert_entry(&mut b, &part(&["T3_grad"], &[], &["T6_sync"], &[]))
            .unwrap();

        let nodes = &b.graph.nodes;
        assert_eq!(nodes.len(), 2);
        assert_eq!(
            nodes[0].inputs,
            vec!["wait_data_1_bw", "T3_grad_sync", "T6_sync"]
        );
        assert_eq!(nodes[0].outputs, vec!["T3_grad_recv"]);
        assert_eq!(nodes[0].attribute_str(NAMESPACE_ATTR), Some("data"));
        assert_eq!(nodes[1].inputs, vec!["wait_pipeline_1_bw", "T3_grad_recv"]);
        assert_eq!(nodes[1].outputs, vec!["T3_grad"]);
        assert!(b.graph.value_info("T3_grad_recv").is_some());
        assert!(b.graph.value_info("T3_grad").is_some());
        assert_eq!(
            b.event_slots.iter().map(|s| s.input_name()).collect::<Vec<_>>(),
            vec!["wait_data_1_bw", "wait_pipeline_1_bw"]
        );
    }

    #[test]
    fn dependency_only_wait_has_no_outputs() {
        let g = main_graph();
        let cfg = SyncConfig::default();
        let mut b = SubGraphBuilder::new(2, "s2");
        SyncInserter::new(&g, &cfg, 2, Direction::Backward)
            .insert_entry(&mut b, &part(&[], &[], &["loss"], &[]))
            .unwrap();
        assert_eq!(b.graph.nodes.len(), 2);
        assert!(b.graph.nodes.iter().all(|n| n.outputs.is_empty()));
        assert_eq!(b.graph.nodes[0].inputs.last().map(String::as_str), Some("loss"));
    }

    #[test]
    fn record_chain_relays_through_send() {
        let g = main_graph();
        let cfg = SyncConfig::default();
        let mut b = SubGraphBuilder::new(1, "s1");
        b.push_node(Some(NodeId(0)), Node::new("Identity", ["X"], ["T6"]));
        SyncInserter::new(&g, &cfg, 1, Direction::Forward)
            .insert_exit(&mut b, &part(&[], &["T6"], &[], &[]))
            .unwrap();

        let nodes = &b.graph.nodes;
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[1].inputs, vec!["record_pipeline_1_fw", "T6"]);
        assert_eq!(nodes[1].outputs, vec!["T6_send"]);
        assert_eq!(nodes[2].inputs, vec!["record_data_1_fw", "T6_send"]);
        assert_eq!(nodes[2].outputs, vec!["T6_sync"]);
        assert!(b.graph.output("T6_sync").is_some());
        assert!(b.graph.value_info("T6_send").is_some());
        assert_eq!(b.boundary_outputs[0].port, "T6_sync");
    }

    #[test]
    fn pipeline_end_records_once_over_graph_outputs() {
        let g = main_graph();
        let cfg = SyncConfig::default();
        let mut b = SubGraphBuilder::new(0, "s0");
        SyncInserter::new(&g, &cfg, 0, Direction::Backward)
            .insert_exit(&mut b, &part(&[], &[], &[], &["W1_grad"]))
            .unwrap();
        assert_eq!(b.graph.nodes.len(), 1);
        assert_eq!(b.graph.nodes[0].inputs, vec!["record_pipeline_0_bw", "W1_grad"]);
        assert!(b.graph.nodes[0].outputs.is_empty());
        assert!(b.graph.outputs.is_empty());
        assert_eq!(b.event_slots.len(), 1);
    }

    #[test]
    fn entry_types_graph_outputs() {
        let mut g = main_graph();
        g.outputs.push(ValueInfo::new("T3_grad", ElemType::Float, vec![Dim::Fixed(4)]));
        g.value_info.retain(|v| v.name != "T3_grad");
        let cfg = SyncConfig::default();
        let mut b = SubGraphBuilder::new(0, "s0");
        SyncInserter::new(&g, &cfg, 0, Direction::Backward)
            .insert_entry(&mut b, &part(&["T3_grad"], &[], &[], &[]))
            .unwrap();

        let port = b.graph.input("T3_grad_sync").unwrap();
        assert_eq!(port.shape, vec![Dim::Fixed(4)]);
        assert!(!b.boundary_inputs[0].graph_input);
    }

    #[test]
    fn missing_type_info_is_fatal() {
        let g = main_graph();
        let cfg = SyncConfig::default();
        let mut b = SubGraphBuilder::new(1, "s1");
        let err = SyncInserter::new(&g, &cfg, 1, Direction::Forward)
            .insert_entry(&mut b, &part(&["T9"], &[], &[], &[]))
            .unwrap_err();
        assert!(matches!(err, SplitError::MissingValueInfo { stage: 1, ref tensor } if tensor == "T9"));
    }
}
