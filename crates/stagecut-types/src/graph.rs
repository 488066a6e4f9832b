//! Serializable computation-graph IR.
//!
//! The layout mirrors an ONNX `GraphProto`: an ordered node list whose edges
//! are tensor names, plus named initializers, value-info records and graph
//! inputs/outputs. Nodes are assumed to be stored in topological order.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tensor::{ElemType, Tensor};

// ── Node identity ────────────────────────────────────────────────────────────

/// Stable position of a node in its source graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ── Shape metadata ───────────────────────────────────────────────────────────

/// One dimension of a value-info shape: fixed or symbolic (e.g. `"batch"`).
///
/// Enums in the IR stay externally tagged so the binary artifact format,
/// which is not self-describing, can decode them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dim {
    Fixed(i64),
    Symbolic(String),
}

/// Name, element type and shape of a tensor flowing through the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueInfo {
    pub name: String,
    pub elem_type: ElemType,
    #[serde(default)]
    pub shape: Vec<Dim>,
}

impl ValueInfo {
    pub fn new(name: impl Into<String>, elem_type: ElemType, shape: Vec<Dim>) -> Self {
        Self {
            name: name.into(),
            elem_type,
            shape,
        }
    }

    /// The `i64` scalar record used for event-id inputs.
    pub fn scalar_i64(name: impl Into<String>) -> Self {
        Self::new(name, ElemType::Int64, Vec::new())
    }

    /// Same record under another name.
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }
}

/// Named constant tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Initializer {
    pub name: String,
    pub tensor: Tensor,
}

// ── Nodes ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeValue {
    Int(i64),
    Float(f32),
    String(String),
    Ints(Vec<i64>),
}

/// One operator invocation. Inputs and outputs are tensor names; an empty
/// input name marks an absent optional input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub name: String,
    pub op_type: String,
    #[serde(default)]
    pub domain: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl Node {
    pub fn new<I, O>(op_type: &str, inputs: I, outputs: O) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        O: IntoIterator,
        O::Item: Into<String>,
    {
        Self {
            name: String::new(),
            op_type: op_type.to_string(),
            domain: String::new(),
            inputs: inputs.into_iter().map(Into::into).collect(),
            outputs: outputs.into_iter().map(Into::into).collect(),
            attributes: BTreeMap::new(),
        }
    }

    /// The name a node is identified by: its first output.
    pub fn key(&self) -> Option<&str> {
        self.outputs.first().map(String::as_str)
    }

    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        match self.attributes.get(key) {
            Some(AttributeValue::String(s)) => Some(s),
            _ => None,
        }
    }
}

// ── Graph ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    #[serde(default)]
    pub name: String,
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub initializers: Vec<Initializer>,
    #[serde(default)]
    pub value_info: Vec<ValueInfo>,
    #[serde(default)]
    pub inputs: Vec<ValueInfo>,
    #[serde(default)]
    pub outputs: Vec<ValueInfo>,
}

impl Graph {
    pub fn initializer(&self, name: &str) -> Option<&Initializer> {
        self.initializers.iter().find(|i| i.name == name)
    }

    pub fn input(&self, name: &str) -> Option<&ValueInfo> {
        self.inputs.iter().find(|v| v.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&ValueInfo> {
        self.outputs.iter().find(|v| v.name == name)
    }

    pub fn value_info(&self, name: &str) -> Option<&ValueInfo> {
        self.value_info.iter().find(|v| v.name == name)
    }

    /// Shape/type record for `name` from value-info, outputs or inputs,
    /// in that order.
    pub fn type_of(&self, name: &str) -> Option<&ValueInfo> {
        self.value_info(name)
            .or_else(|| self.output(name))
            .or_else(|| self.input(name))
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// Nodes paired with their stable ids, in source order.
    pub fn nodes_with_ids(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeId(i as u32), n))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
