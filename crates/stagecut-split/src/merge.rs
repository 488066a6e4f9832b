//! Reassemble split stages into a single graph.
//!
//! Inserted sync nodes are dropped, boundary ports that replaced source
//! inputs get their original names back, and copied nodes are restored to
//! their source order. A correct split reassembles to its source graph.

use std::collections::BTreeMap;

use stagecut_types::graph::{Graph, NodeId, ValueInfo};
use stagecut_types::stage::SubGraph;
use stagecut_types::GraphError;

use crate::error::Result;

pub fn reassemble(subs: &[SubGraph]) -> Result<Graph> {
    let mut nodes = BTreeMap::new();
    let mut graph = Graph {
        name: subs.first().map(base_name).unwrap_or_default(),
        ..Default::default()
    };

    for sub in subs {
        for (origin, node) in sub.origins.iter().zip(&sub.graph.nodes) {
            let Some(id) = origin else { continue };
            if nodes.insert(*id, node.clone()).is_some() {
                return Err(GraphError::Graph(format!(
                    "node {id} appears in more than one stage"
                ))
                .into());
            }
        }
        for init in &sub.graph.initializers {
            if graph.initializer(&init.name).is_none() {
                graph.initializers.push(init.clone());
            }
        }
    }

    let expected: Vec<NodeId> = (0..nodes.len() as u32).map(NodeId).collect();
    if nodes.keys().copied().ne(expected.iter().copied()) {
        return Err(GraphError::Graph("stages do not cover a contiguous node range".into()).into());
    }
    graph.nodes = nodes.into_values().collect();

    for sub in subs {
        for input in &sub.graph.inputs {
            if sub.event_slot(&input.name).is_some() {
                continue;
            }
            match sub.boundary_input(&input.name) {
                Some(b) if b.graph_input => push_unique(&mut graph.inputs, input.renamed(b.tensor.clone())),
                Some(_) => {}
                None => push_unique(&mut graph.inputs, input.clone()),
            }
        }
        for output in &sub.graph.outputs {
            if sub.boundary_output(&output.name).is_none() {
                push_unique(&mut graph.outputs, output.clone());
            }
        }
    }

    // Shape records of real intermediates, in production order.
    let mut value_info = Vec::new();
    for name in graph.nodes.iter().flat_map(|n| n.outputs.iter()) {
        if graph.output(name).is_some() {
            continue;
        }
        if let Some(info) = subs.iter().find_map(|s| s.graph.value_info(name)) {
            push_unique(&mut value_info, info.clone());
        }
    }
    graph.value_info = value_info;

    Ok(graph)
}

fn base_name(sub: &SubGraph) -> String {
    let suffix = format!("_{}", sub.stage);
    sub.graph
        .name
        .strip_suffix(suffix.as_str())
        .unwrap_or(&sub.graph.name)
        .to_string()
}

fn push_unique(list: &mut Vec<ValueInfo>, info: ValueInfo) {
    if !list.iter().any(|v| v.name == info.name) {
        list.push(info);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
