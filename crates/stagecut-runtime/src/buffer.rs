//! Shared tensor slots that carry boundary tensors between stage sessions.
//!
//! The producing stage writes its `*_sync` output into a buffer before the
//! record that publishes it fires; the consuming stage reads the buffer only
//! after the matching wait returns.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use stagecut_types::stage::SubGraph;
use stagecut_types::tensor::Tensor;

use crate::error::{Result, RuntimeError};

#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    slot: Arc<Mutex<Option<Tensor>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&self, tensor: Tensor) {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(tensor);
    }

    pub fn read(&self) -> Option<Tensor> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn is_filled(&self) -> bool {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }
}

/// A feed: a value known up front, or a buffer filled by another stage.
#[derive(Debug, Clone)]
pub enum Binding {
    Value(Tensor),
    Buffer(SharedBuffer),
}

/// A requested output, optionally mirrored into a buffer as it is produced.
#[derive(Debug, Clone)]
pub struct Fetch {
    pub name: String,
    pub buffer: Option<SharedBuffer>,
}

impl Fetch {
    pub fn value(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            buffer: None,
        }
    }

    pub fn into_buffer(name: impl Into<String>, buffer: SharedBuffer) -> Self {
        Self {
            name: name.into(),
            buffer: Some(buffer),
        }
    }
}

/// One buffer per boundary port, for one micro-batch.
#[derive(Debug, Clone, Default)]
pub struct BoundaryBuffers {
    by_port: HashMap<String, SharedBuffer>,
}

impl BoundaryBuffers {
    pub fn for_stages(subs: &[SubGraph]) -> Self {
        let by_port = subs
            .iter()
            .flat_map(|s| s.boundary_outputs.iter())
            .map(|b| (b.port.clone(), SharedBuffer::new()))
            .collect();
        Self { by_port }
    }

    pub fn get(&self, port: &str) -> Result<SharedBuffer> {
        self.by_port
            .get(port)
            .cloned()
            .ok_or_else(|| RuntimeError::Unresolved(port.to_string()))
    }

    pub fn len(&self) -> usize {
        self.by_port.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_port.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
