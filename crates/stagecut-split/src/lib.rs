//! `stagecut-split`: pipeline-parallel graph splitting.
//!
//! Takes one forward+backward training graph plus a per-stage cut list and
//! produces one self-contained sub-graph per stage. Tensors that cross a
//! stage boundary are routed through inserted `WaitEvent` / `RecordEvent`
//! nodes whose first input is an event-id slot, so a runtime can order the
//! stages of many in-flight micro-batches with nothing but integer events.
//!
//! # Layout
//!
//! ```text
//!   Graph + [CutSpec]
//!         │
//!         ▼  assignment     node → (stage, direction), total and disjoint
//!         ▼  partition      copy nodes, constants, IO into per-stage builders
//!         ▼  sync           wait at each part entry, record at each exit
//!         │
//!   [SubGraph] ──▶ artifact (bincode / json)   merge (reassemble for checks)
//! ```

pub mod artifact;
pub mod assignment;
pub mod error;
pub mod merge;
pub mod partition;
pub mod splitter;
pub mod sync;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// ── Public re-exports ────────────────────────────────────────────────────────

pub use artifact::{read_artifact, write_artifacts, ArtifactFormat};
pub use assignment::{assign_stages, NodeIndex, Placement, StageAssignment};
pub use error::{Result, SplitError};
pub use merge::reassemble;
pub use partition::{GraphPartitioner, SubGraphBuilder};
pub use splitter::{split, PipelineSplitter};
pub use sync::SyncInserter;
