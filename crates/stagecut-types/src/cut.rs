// Caller-supplied stage boundaries.
//
// A cut lists, per stage and per direction, which nodes belong to it and
// which tensors or dependencies cross its boundary.

use std::fmt;

use serde::{Deserialize, Serialize};

// ── Direction ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Forward, Direction::Backward];

    /// Short tag used in slot names: `fw` / `bw`.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Forward => "fw",
            Self::Backward => "bw",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

// ── Part cut ─────────────────────────────────────────────────────────────────

/// One direction of one stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartCut {
    /// Nodes of this part, identified by their first output, in order.
    /// The first and last entries anchor wait and record insertion.
    pub nodes: Vec<String>,
    /// Tensors this part receives from another stage (or the graph inputs
    /// at the pipeline start) through a wait.
    pub sync_inputs: Vec<String>,
    /// Tensors this part hands to another stage through a record.
    pub sync_outputs: Vec<String>,
    /// Extra names the entry wait depends on.
    pub wait_depends: Vec<String>,
    /// Extra names the exit record depends on.
    pub record_depends: Vec<String>,
}

impl PartCut {
    pub fn first_node(&self) -> Option<&str> {
        self.nodes.first().map(String::as_str)
    }

    pub fn last_node(&self) -> Option<&str> {
        self.nodes.last().map(String::as_str)
    }

    /// True if entering this part needs a wait.
    pub fn needs_wait(&self) -> bool {
        !self.sync_inputs.is_empty() || !self.wait_depends.is_empty()
    }

    /// True if leaving this part needs a record.
    pub fn needs_record(&self) -> bool {
        !self.sync_outputs.is_empty() || !self.record_depends.is_empty()
    }
}

// ── Stage cut ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CutSpec {
    #[serde(alias = "fw")]
    pub forward: PartCut,
    #[serde(alias = "bw")]
    pub backward: PartCut,
}

impl CutSpec {
    pub fn part(&self, direction: Direction) -> &PartCut {
        match direction {
            Direction::Forward => &self.forward,
            Direction::Backward => &self.backward,
        }
    }

    pub fn is_sync_input(&self, name: &str) -> bool {
        self.forward.sync_inputs.iter().any(|n| n == name)
            || self.backward.sync_inputs.iter().any(|n| n == name)
    }

    pub fn is_sync_output(&self, name: &str) -> bool {
        self.forward.sync_outputs.iter().any(|n| n == name)
            || self.backward.sync_outputs.iter().any(|n| n == name)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
