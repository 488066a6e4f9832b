//! Micro-batch pipeline driver.
//!
//! Every (micro-batch, stage) pair becomes one blocking task. All tasks are
//! started at once; the order they are spawned in carries no meaning, only
//! the events fed into their slots do. The first failure aborts the event
//! registry so that tasks blocked on events it would have recorded fail
//! instead of hanging.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{error, info};
use uuid::Uuid;

use stagecut_types::config::RuntimeConfig;
use stagecut_types::stage::SubGraph;
use stagecut_types::tensor::Tensor;

use crate::buffer::BoundaryBuffers;
use crate::error::{Result, RuntimeError};
use crate::events::EventRegistry;
use crate::executor::{StageExecutor, StageOutputs};
use crate::plan::EventPlan;
use crate::session::{ReferenceSession, Session};

pub struct PipelineDriver {
    run_id: Uuid,
    subs: Arc<Vec<SubGraph>>,
    executors: Vec<Arc<StageExecutor>>,
    registry: Arc<EventRegistry>,
}

impl PipelineDriver {
    /// Drive `subs` with one [`ReferenceSession`] per stage.
    pub fn new(subs: Vec<SubGraph>, config: &RuntimeConfig) -> Self {
        let registry = Arc::new(EventRegistry::new());
        let sessions = subs
            .iter()
            .map(|sub| {
                Arc::new(ReferenceSession::new(
                    sub.graph.clone(),
                    registry.clone(),
                    config.sync.clone(),
                    config.wait_timeout,
                )) as Arc<dyn Session>
            })
            .collect();
        Self::with_sessions(subs, sessions, registry)
    }

    /// Drive `subs` with caller-supplied sessions that share `registry`.
    pub fn with_sessions(
        subs: Vec<SubGraph>,
        sessions: Vec<Arc<dyn Session>>,
        registry: Arc<EventRegistry>,
    ) -> Self {
        let executors = subs
            .iter()
            .cloned()
            .zip(sessions)
            .map(|(sub, session)| Arc::new(StageExecutor::new(sub, session)))
            .collect();
        Self {
            run_id: Uuid::new_v4(),
            subs: Arc::new(subs),
            executors,
            registry,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn num_stages(&self) -> usize {
        self.executors.len()
    }

    pub fn registry(&self) -> &Arc<EventRegistry> {
        &self.registry
    }

    /// Run every micro-batch through every stage.
    ///
    /// `batches[b]` holds the graph inputs of micro-batch `b`. Results are
    /// returned sorted by (micro-batch, stage).
    pub async fn run(
        &self,
        batches: Vec<HashMap<String, Tensor>>,
        plan: &EventPlan,
    ) -> Result<Vec<StageOutputs>> {
        plan.validate()?;
        plan.check_coverage(&self.subs)?;
        if batches.len() != plan.num_micro_batches() {
            return Err(RuntimeError::InvalidPlan(format!(
                "{} micro-batches supplied, plan covers {}",
                batches.len(),
                plan.num_micro_batches()
            )));
        }
        if self.executors.len() != self.subs.len() {
            return Err(RuntimeError::InvalidPlan(format!(
                "{} sessions for {} stages",
                self.executors.len(),
                self.subs.len()
            )));
        }

        self.registry.reset();
        info!(
            run_id = %self.run_id,
            micro_batches = batches.len(),
            stages = self.executors.len(),
            "pipeline run started"
        );

        let mut tasks = JoinSet::new();
        for (micro_batch, (inputs, events)) in batches.into_iter().zip(&plan.micro_batches).enumerate() {
            let inputs = Arc::new(inputs);
            let buffers = Arc::new(BoundaryBuffers::for_stages(&self.subs));
            for (exec, stage_events) in self.executors.iter().zip(&events.stages) {
                let exec = exec.clone();
                let inputs = inputs.clone();
                let buffers = buffers.clone();
                let stage_events = *stage_events;
                tasks.spawn_blocking(move || exec.run(micro_batch, &stage_events, &inputs, &buffers));
            }
        }

        let mut outputs = Vec::with_capacity(tasks.len());
        let mut first_error: Option<RuntimeError> = None;
        while let Some(joined) = tasks.join_next().await {
            let result = joined.map_err(|e| RuntimeError::Join(e.to_string())).and_then(|r| r);
            match result {
                Ok(out) => outputs.push(out),
                Err(e) => {
                    if first_error.is_none() {
                        error!(run_id = %self.run_id, error = %e, "stage invocation failed");
                        self.registry.abort(e.to_string());
                        first_error = Some(e);
                    }
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        outputs.sort_by_key(|o| (o.micro_batch, o.stage));
        info!(run_id = %self.run_id, invocations = outputs.len(), "pipeline run finished");
        Ok(outputs)
    }
}
