// Global configuration structs shared by the splitter and the runtime.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::GraphError;

// ── Splitter ──────────────────────────────────────────────────────────────────

/// Naming and op conventions for inserted synchronization nodes.
///
/// A sync tensor `X` travels as `X_sync` across a boundary. When a stage has
/// both a data and a pipeline wait, the intermediate name is `X_recv`; on the
/// producing side the intermediate between the two records is `X_send`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Operator domain for `WaitEvent` / `RecordEvent`.
    pub domain: String,
    pub wait_op: String,
    pub record_op: String,
    /// Suffix of the boundary-crossing tensor name.
    pub sync_suffix: String,
    /// Suffix between data-wait and pipeline-wait.
    pub recv_suffix: String,
    /// Suffix between pipeline-record and data-record.
    pub send_suffix: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            domain: "com.microsoft".into(),
            wait_op: "WaitEvent".into(),
            record_op: "RecordEvent".into(),
            sync_suffix: "_sync".into(),
            recv_suffix: "_recv".into(),
            send_suffix: "_send".into(),
        }
    }
}

impl SyncConfig {
    pub fn sync_name(&self, tensor: &str) -> String {
        format!("{tensor}{}", self.sync_suffix)
    }

    pub fn recv_name(&self, tensor: &str) -> String {
        format!("{tensor}{}", self.recv_suffix)
    }

    pub fn send_name(&self, tensor: &str) -> String {
        format!("{tensor}{}", self.send_suffix)
    }

    pub fn is_sync_op(&self, domain: &str, op_type: &str) -> bool {
        domain == self.domain && (op_type == self.wait_op || op_type == self.record_op)
    }

    /// Suffixes must be non-empty and pairwise distinct, or a port would
    /// shadow the tensor it carries.
    pub fn validate(&self) -> Result<(), GraphError> {
        let suffixes = [&self.sync_suffix, &self.recv_suffix, &self.send_suffix];
        if suffixes.iter().any(|s| s.is_empty()) {
            return Err(GraphError::Config("sync suffixes must be non-empty".into()));
        }
        if suffixes[0] == suffixes[1] || suffixes[0] == suffixes[2] || suffixes[1] == suffixes[2] {
            return Err(GraphError::Config("sync suffixes must be distinct".into()));
        }
        if self.wait_op == self.record_op {
            return Err(GraphError::Config(format!(
                "wait and record ops are both {}",
                self.wait_op
            )));
        }
        Ok(())
    }
}

// ── Runtime ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct RuntimeConfig {
    /// Upper bound on a single event wait. `None` blocks indefinitely, which
    /// turns a bad event numbering into a deadlock rather than an error.
    pub wait_timeout: Option<Duration>,

    /// Synchronization conventions the sessions must recognize.
    pub sync: SyncConfig,
}
