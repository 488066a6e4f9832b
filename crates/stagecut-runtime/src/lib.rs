//! `stagecut-runtime`: reference execution of split stage graphs.
//!
//! This crate is the collaborator the splitter assumes: something that runs
//! each stage as an independent invocation and honours the wait/record
//! protocol. It is a plain CPU interpreter, enough to check that a split
//! graph computes what the unsplit graph computes under real concurrency.
//!
//! ```text
//!   EventPlan ──▶ PipelineDriver ── spawn_blocking per (micro-batch, stage)
//!                      │
//!                      ▼
//!   StageExecutor (bind feeds/fetches) ──▶ Session::run
//!                                             │ WaitEvent   ──▶ EventRegistry::wait
//!                                             │ RecordEvent ──▶ EventRegistry::record
//!                                             ▼
//!                                   BoundaryBuffers (X_sync per micro-batch)
//! ```

pub mod buffer;
pub mod driver;
pub mod error;
pub mod events;
pub mod executor;
pub mod kernels;
pub mod plan;
pub mod session;

// ── Public re-exports ────────────────────────────────────────────────────────

pub use buffer::{Binding, BoundaryBuffers, Fetch, SharedBuffer};
pub use driver::PipelineDriver;
pub use error::{Result, RuntimeError};
pub use events::EventRegistry;
pub use executor::{StageExecutor, StageOutputs};
pub use plan::{EventPlan, MicroBatchEvents, PartEvents, StageEvents};
pub use session::{ReferenceSession, Session};
