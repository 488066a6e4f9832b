use stagecut_types::cut::Direction;
use stagecut_types::GraphError;

/// Invalid graph, cut or naming input detected while splitting. Any of these
/// aborts the whole split; no partial output is produced.
#[derive(Debug, thiserror::Error)]
pub enum SplitError {
    #[error("no cuts supplied")]
    NoCuts,

    #[error("node {index} has no outputs and cannot be identified")]
    AnonymousNode { index: usize },

    #[error("two nodes are identified by the same output name: {0}")]
    DuplicateNode(String),

    #[error("stage {stage} {direction} lists unknown node {name}")]
    UnknownNode {
        stage: u32,
        direction: Direction,
        name: String,
    },

    #[error("node {name} is listed by both stage {first} and stage {second}")]
    OverlappingCut { name: String, first: u32, second: u32 },

    #[error("node {0} is not assigned to any stage")]
    UnassignedNode(String),

    #[error("malformed cut for stage {stage} {direction}: {reason}")]
    MalformedCut {
        stage: u32,
        direction: Direction,
        reason: String,
    },

    #[error("stage {stage}: no shape/type information for sync tensor {tensor}")]
    MissingValueInfo { stage: u32, tensor: String },

    #[error("stage {stage}: input {tensor} of node {node} is not produced inside the stage")]
    DanglingInput {
        stage: u32,
        node: String,
        tensor: String,
    },

    #[error("artifact I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, SplitError>;
