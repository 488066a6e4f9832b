//! Per-stage executor for one split sub-graph.
//!
//! The executor binds a stage's feeds and fetches for one micro-batch and
//! hands them to its [`Session`]. It never orders itself against other
//! stages: that happens inside the session, at the inserted wait nodes.
//!
//! Feed sources, by input kind:
//!   event slot          → id from the plan (`NO_EVENT` for an absent wait)
//!   port at the start   → the micro-batch's own graph input
//!   port between stages → the boundary buffer the producer writes
//!   anything else       → the micro-batch's own graph input

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::debug;

use stagecut_types::event::{SyncRole, NO_EVENT};
use stagecut_types::stage::SubGraph;
use stagecut_types::tensor::Tensor;

use crate::buffer::{Binding, BoundaryBuffers, Fetch};
use crate::error::{Result, RuntimeError};
use crate::plan::StageEvents;
use crate::session::Session;

/// Fetched outputs of one (micro-batch, stage) invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutputs {
    pub micro_batch: usize,
    pub stage: u32,
    pub tensors: BTreeMap<String, Tensor>,
}

impl StageOutputs {
    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.tensors.get(name)
    }
}

pub struct StageExecutor {
    sub: SubGraph,
    session: Arc<dyn Session>,
}

impl StageExecutor {
    pub fn new(sub: SubGraph, session: Arc<dyn Session>) -> Self {
        Self { sub, session }
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn stage(&self) -> u32 {
        self.sub.stage
    }

    pub fn sub_graph(&self) -> &SubGraph {
        &self.sub
    }

    // ── Binding ──────────────────────────────────────────────────────────

    /// Feeds and fetches for one invocation.
    pub fn bind(
        &self,
        events: &StageEvents,
        inputs: &HashMap<String, Tensor>,
        buffers: &BoundaryBuffers,
    ) -> Result<(HashMap<String, Binding>, Vec<Fetch>)> {
        let stage = self.sub.stage;
        let mut feeds = HashMap::with_capacity(self.sub.graph.inputs.len());

        for input in &self.sub.graph.inputs {
            let name = input.name.as_str();
            let binding = if let Some(slot) = self.sub.event_slot(name) {
                let id = match (events.id_for(slot), slot.role) {
                    (Some(id), _) => id,
                    (None, SyncRole::Wait) => NO_EVENT,
                    (None, SyncRole::Record) => {
                        return Err(RuntimeError::MissingEvent {
                            stage,
                            slot: slot.input_name(),
                        })
                    }
                };
                Binding::Value(Tensor::scalar_i64(id))
            } else if let Some(boundary) = self.sub.boundary_input(name) {
                if boundary.graph_input {
                    Binding::Value(graph_input(inputs, stage, &boundary.tensor)?)
                } else {
                    Binding::Buffer(buffers.get(name)?)
                }
            } else {
                Binding::Value(graph_input(inputs, stage, name)?)
            };
            feeds.insert(name.to_string(), binding);
        }

        let fetches = self
            .sub
            .graph
            .outputs
            .iter()
            .map(|out| match self.sub.boundary_output(&out.name) {
                Some(_) => buffers
                    .get(&out.name)
                    .map(|b| Fetch::into_buffer(out.name.clone(), b)),
                None => Ok(Fetch::value(out.name.clone())),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok((feeds, fetches))
    }

    // ── Execution ────────────────────────────────────────────────────────

    /// Run this stage for micro-batch `micro_batch`. Blocks on waits.
    pub fn run(
        &self,
        micro_batch: usize,
        events: &StageEvents,
        inputs: &HashMap<String, Tensor>,
        buffers: &BoundaryBuffers,
    ) -> Result<StageOutputs> {
        let (feeds, fetches) = self.bind(events, inputs, buffers)?;
        debug!(micro_batch, stage = self.sub.stage, feeds = feeds.len(), fetches = fetches.len(), "stage invocation");

        let values = self.session.run(&feeds, &fetches)?;
        let tensors = fetches.into_iter().map(|f| f.name).zip(values).collect();

        Ok(StageOutputs {
            micro_batch,
            stage: self.sub.stage,
            tensors,
        })
    }
}

fn graph_input(inputs: &HashMap<String, Tensor>, stage: u32, name: &str) -> Result<Tensor> {
    inputs
        .get(name)
        .cloned()
        .ok_or_else(|| RuntimeError::MissingInput {
            stage,
            name: name.to_string(),
        })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
