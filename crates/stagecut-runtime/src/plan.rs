//! Caller-supplied event numbering.
//!
//! For every micro-batch, stage and part the plan names the ids fed into the
//! four possible slots. The splitter never numbers events; a plan is checked
//! here before anything runs:
//! 1. Ids are non-negative. An absent wait is written as `None`.
//! 2. No id is recorded twice within its namespace.
//! 3. Every awaited id is recorded somewhere in the plan.
//! 4. Every record slot a stage exposes gets an id, and no id is assigned to
//!    a slot the stage does not expose.
//!
//! Acyclicity of the resulting wait graph is the caller's responsibility;
//! a cyclic plan shows up as a wait timeout.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use stagecut_types::cut::Direction;
use stagecut_types::event::{DataEventId, EventId, EventNamespace, EventSlot, PipelineEventId, SyncRole};
use stagecut_types::stage::SubGraph;

use crate::error::{Result, RuntimeError};

// ── Plan types ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartEvents {
    pub wait_data: Option<DataEventId>,
    pub wait_pipeline: Option<PipelineEventId>,
    pub record_pipeline: Option<PipelineEventId>,
    pub record_data: Option<DataEventId>,
}

impl PartEvents {
    /// Raw id for a slot of this part, if one is assigned.
    pub fn id_for(&self, role: SyncRole, namespace: EventNamespace) -> Option<i64> {
        match (role, namespace) {
            (SyncRole::Wait, EventNamespace::Data) => self.wait_data.map(EventId::raw),
            (SyncRole::Wait, EventNamespace::Pipeline) => self.wait_pipeline.map(EventId::raw),
            (SyncRole::Record, EventNamespace::Pipeline) => self.record_pipeline.map(EventId::raw),
            (SyncRole::Record, EventNamespace::Data) => self.record_data.map(EventId::raw),
        }
    }

    fn assigned(&self) -> impl Iterator<Item = (SyncRole, EventNamespace, i64)> + '_ {
        [
            (SyncRole::Wait, EventNamespace::Data),
            (SyncRole::Wait, EventNamespace::Pipeline),
            (SyncRole::Record, EventNamespace::Pipeline),
            (SyncRole::Record, EventNamespace::Data),
        ]
        .into_iter()
        .filter_map(|(role, ns)| self.id_for(role, ns).map(|id| (role, ns, id)))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageEvents {
    #[serde(alias = "fw")]
    pub forward: PartEvents,
    #[serde(alias = "bw")]
    pub backward: PartEvents,
}

impl StageEvents {
    pub fn part(&self, direction: Direction) -> &PartEvents {
        match direction {
            Direction::Forward => &self.forward,
            Direction::Backward => &self.backward,
        }
    }

    pub fn id_for(&self, slot: &EventSlot) -> Option<i64> {
        self.part(slot.direction).id_for(slot.role, slot.namespace)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MicroBatchEvents {
    pub stages: Vec<StageEvents>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPlan {
    pub micro_batches: Vec<MicroBatchEvents>,
}

// ── Validation ───────────────────────────────────────────────────────────────

impl EventPlan {
    pub fn num_micro_batches(&self) -> usize {
        self.micro_batches.len()
    }

    /// Checks 1-3: numbering is consistent on its own.
    pub fn validate(&self) -> Result<()> {
        let mut recorded = HashSet::new();
        let mut awaited = Vec::new();

        for (batch, mb) in self.micro_batches.iter().enumerate() {
            for (stage, events) in mb.stages.iter().enumerate() {
                for direction in Direction::ALL {
                    for (role, namespace, id) in events.part(direction).assigned() {
                        let at = || format!("micro-batch {batch} stage {stage} {direction}");
                        if id < 0 {
                            return Err(RuntimeError::InvalidPlan(format!(
                                "{}: negative {namespace} id {id}",
                                at()
                            )));
                        }
                        match role {
                            SyncRole::Record if !recorded.insert((namespace, id)) => {
                                return Err(RuntimeError::InvalidPlan(format!(
                                    "{}: {namespace} event {id} is recorded more than once",
                                    at()
                                )));
                            }
                            SyncRole::Record => {}
                            SyncRole::Wait => awaited.push((namespace, id, at())),
                        }
                    }
                }
            }
        }

        for (namespace, id, at) in awaited {
            if !recorded.contains(&(namespace, id)) {
                return Err(RuntimeError::InvalidPlan(format!(
                    "{at}: waits on {namespace} event {id} which is never recorded"
                )));
            }
        }
        Ok(())
    }

    /// Check 4: the plan fits the slots the split stages actually expose.
    pub fn check_coverage(&self, subs: &[SubGraph]) -> Result<()> {
        for (batch, mb) in self.micro_batches.iter().enumerate() {
            if mb.stages.len() != subs.len() {
                return Err(RuntimeError::InvalidPlan(format!(
                    "micro-batch {batch} has events for {} stages, the split has {}",
                    mb.stages.len(),
                    subs.len()
                )));
            }
            for (sub, events) in subs.iter().zip(&mb.stages) {
                for slot in sub.event_slots.iter().filter(|s| s.role == SyncRole::Record) {
                    if events.id_for(slot).is_none() {
                        return Err(RuntimeError::MissingEvent {
                            stage: sub.stage,
                            slot: slot.input_name(),
                        });
                    }
                }
                for direction in Direction::ALL {
                    for (role, namespace, id) in events.part(direction).assigned() {
                        let slot = EventSlot::new(role, namespace, sub.stage, direction);
                        if !sub.event_slots.contains(&slot) {
                            return Err(RuntimeError::InvalidPlan(format!(
                                "micro-batch {batch}: id {id} assigned to {slot}, which stage {} does not expose",
                                sub.stage
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
