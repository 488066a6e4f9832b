// Event ids and the sub-graph slots that carry them.
//
// Data and pipeline events live in separate namespaces. Keeping them as
// distinct types means a data id can never be fed into a pipeline slot.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::cut::Direction;

/// Fed into a wait slot when there is nothing to wait for.
pub const NO_EVENT: i64 = -1;

/// Attribute key on inserted sync nodes naming their [`EventNamespace`].
pub const NAMESPACE_ATTR: &str = "namespace";

// ── Namespaces ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventNamespace {
    /// Ordering across micro-batches that share a buffer.
    Data,
    /// Stage-to-stage order within one micro-batch.
    Pipeline,
}

impl EventNamespace {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Pipeline => "pipeline",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "data" => Some(Self::Data),
            "pipeline" => Some(Self::Pipeline),
            _ => None,
        }
    }
}

impl fmt::Display for EventNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Typed ids ────────────────────────────────────────────────────────────────

pub trait EventId: Copy {
    const NAMESPACE: EventNamespace;

    fn raw(self) -> i64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataEventId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineEventId(pub i64);

impl EventId for DataEventId {
    const NAMESPACE: EventNamespace = EventNamespace::Data;

    fn raw(self) -> i64 {
        self.0
    }
}

impl EventId for PipelineEventId {
    const NAMESPACE: EventNamespace = EventNamespace::Pipeline;

    fn raw(self) -> i64 {
        self.0
    }
}

// ── Slots ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncRole {
    Wait,
    Record,
}

impl SyncRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wait => "wait",
            Self::Record => "record",
        }
    }
}

/// A sub-graph input that receives one event id per invocation.
///
/// The input is named `<role>_<namespace>_<stage>_<dir>`, for example
/// `wait_data_1_fw` or `record_pipeline_0_bw`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventSlot {
    pub role: SyncRole,
    pub namespace: EventNamespace,
    pub stage: u32,
    pub direction: Direction,
}

impl EventSlot {
    pub fn new(role: SyncRole, namespace: EventNamespace, stage: u32, direction: Direction) -> Self {
        Self {
            role,
            namespace,
            stage,
            direction,
        }
    }

    pub fn input_name(&self) -> String {
        format!(
            "{}_{}_{}_{}",
            self.role.as_str(),
            self.namespace.as_str(),
            self.stage,
            self.direction.tag()
        )
    }
}

impl fmt::Display for EventSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.input_name())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
