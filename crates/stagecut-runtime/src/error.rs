use stagecut_types::event::EventNamespace;
use stagecut_types::GraphError;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("timed out waiting for {namespace} event {id}")]
    EventTimeout { namespace: EventNamespace, id: i64 },

    #[error("run aborted: {0}")]
    Aborted(String),

    #[error("invalid event plan: {0}")]
    InvalidPlan(String),

    #[error("stage {stage}: no event id for record slot {slot}")]
    MissingEvent { stage: u32, slot: String },

    #[error("stage {stage}: no feed for input {name}")]
    MissingInput { stage: u32, name: String },

    #[error("boundary buffer {0} read before it was written")]
    EmptyBuffer(String),

    #[error("tensor {0} is neither fed, produced nor constant")]
    Unresolved(String),

    #[error("fetch {0} was not produced")]
    MissingOutput(String),

    #[error("unsupported operator {domain}::{op_type}")]
    UnsupportedOp { domain: String, op_type: String },

    #[error("kernel error in {node}: {reason}")]
    Kernel { node: String, reason: String },

    #[error("task join error: {0}")]
    Join(String),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, RuntimeError>;
