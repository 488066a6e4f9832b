//! Three-stage forward+backward fixture shared by test suites.
//!
//! A two-layer elementwise model with a squared-error loss and its hand
//! written gradient graph, cut at `T3` and `T6`:
//!
//! ```text
//! stage 0: T3 = X * W1                      | W1_grad = T3_grad * X
//! stage 1: T4 = T3 * W2, T6 = T4 + B2       | T3_grad = T6_grad * W2, W2_grad = T6_grad * T3
//! stage 2: diff = T6 - labels, loss = diff² | T6_grad = diff + diff
//! ```

use stagecut_types::cut::{CutSpec, PartCut};
use stagecut_types::graph::{Dim, Graph, Initializer, Node, ValueInfo};
use stagecut_types::tensor::{ElemType, Tensor, TensorData};

pub const WIDTH: i64 = 4;

fn vec4(name: &str) -> ValueInfo {
    ValueInfo::new(name, ElemType::Float, vec![Dim::Fixed(WIDTH)])
}

fn constant(name: &str, values: [f32; 4]) -> Initializer {
    Initializer {
        name: name.into(),
        tensor: f32_tensor(values),
    }
}

pub fn f32_tensor(values: [f32; 4]) -> Tensor {
    Tensor {
        dims: vec![WIDTH],
        data: TensorData::Float(values.to_vec()),
    }
}

pub fn toy_graph() -> Graph {
    Graph {
        name: "toy".into(),
        nodes: vec![
            Node::new("Mul", ["X", "W1"], ["T3"]),
            Node::new("Mul", ["T3", "W2"], ["T4"]),
            Node::new("Add", ["T4", "B2"], ["T6"]),
            Node::new("Sub", ["T6", "labels"], ["diff"]),
            Node::new("Mul", ["diff", "diff"], ["loss"]),
            Node::new("Add", ["diff", "diff"], ["T6_grad"]),
            Node::new("Mul", ["T6_grad", "W2"], ["T3_grad"]),
            Node::new("Mul", ["T6_grad", "T3"], ["W2_grad"]),
            Node::new("Mul", ["T3_grad", "X"], ["W1_grad"]),
        ],
        initializers: vec![
            constant("W1", [0.5, -0.25, 1.0, 2.0]),
            constant("W2", [1.5, 0.5, -1.0, 0.25]),
            constant("B2", [0.1, 0.2, 0.3, 0.4]),
        ],
        value_info: ["T3", "T4", "T6", "diff", "T6_grad", "T3_grad"]
            .into_iter()
            .map(vec4)
            .collect(),
        inputs: vec![vec4("X"), vec4("labels")],
        outputs: vec![vec4("loss"), vec4("W1_grad"), vec4("W2_grad")],
    }
}

fn names(xs: &[&str]) -> Vec<String> {
    xs.iter().map(|s| s.to_string()).collect()
}

fn part(nodes: &[&str], ins: &[&str], outs: &[&str], waits: &[&str], records: &[&str]) -> PartCut {
    PartCut {
        nodes: names(nodes),
        sync_inputs: names(ins),
        sync_outputs: names(outs),
        wait_depends: names(waits),
        record_depends: names(records),
    }
}

pub fn toy_cuts() -> Vec<CutSpec> {
    vec![
        CutSpec {
            forward: part(&["T3"], &["X"], &["T3"], &[], &[]),
            backward: part(&["W1_grad"], &["T3_grad"], &[], &["T3_sync"], &["W1_grad"]),
        },
        CutSpec {
            forward: part(&["T4", "T6"], &["T3"], &["T6"], &[], &[]),
            backward: part(
                &["T3_grad", "W2_grad"],
                &["T6_grad"],
                &["T3_grad"],
                &["T6_sync"],
                &["W2_grad"],
            ),
        },
        CutSpec {
            forward: part(&["diff", "loss"], &["T6"], &[], &[], &[]),
            backward: part(&["T6_grad"], &[], &["T6_grad"], &[], &["loss"]),
        },
    ]
}

/// Graph inputs for micro-batch `batch`: `X` and `labels`, shifted by the
/// batch index so every micro-batch computes different values.
pub fn toy_inputs(batch: usize) -> Vec<(String, Tensor)> {
    let b = batch as f32;
    vec![
        ("X".into(), f32_tensor([1.0 + b, 2.0, 3.0 - b, 4.0])),
        ("labels".into(), f32_tensor([0.5, -1.0, 2.0 + b, 0.0])),
    ]
}
