use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::BuildError;

/// Type-erased payload a handler publishes for downstream tasks.
pub type NodeData = Arc<dyn Any + Send + Sync>;

/// Outcome of one task, stored in the execution context for the whole run.
#[derive(Clone)]
pub struct BuildResult {
    pub success: bool,
    pub data: Option<NodeData>,
    pub error: Option<BuildError>,
}

impl BuildResult {
    pub fn ok<T: Any + Send + Sync>(data: T) -> Self {
        Self {
            success: true,
            data: Some(Arc::new(data)),
            error: None,
        }
    }

    pub fn empty() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }

    pub fn failed(error: BuildError) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }

    /// Downcast the payload. `None` if there is none or it has another type.
    pub fn data<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.data.clone().and_then(|d| d.downcast::<T>().ok())
    }
}

impl fmt::Debug for BuildResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildResult")
            .field("success", &self.success)
            .field("has_data", &self.data.is_some())
            .field("error", &self.error)
            .finish()
    }
}

/// Per-step summary.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StepReport {
    pub step_id: String,
    pub parallel: bool,
    pub completed: Vec<String>,
    pub failed: Vec<String>,
    /// Tasks that never ran: blocked, out of readiness budget, or after a
    /// failure in a serial step.
    pub skipped: Vec<String>,
}

impl StepReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

/// Result of executing a whole sequence
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionResult {
    pub sequence_id: String,

    /// Total number of tasks in the sequence
    pub total_tasks: usize,

    /// Number of tasks that reached `completed`
    pub completed: usize,

    /// Number of tasks that ended in `failed`
    pub failed: usize,

    /// Total execution duration in milliseconds
    pub duration_ms: u64,

    /// Task ids in the order they completed
    pub executed_order: Vec<String>,

    pub steps: Vec<StepReport>,

    /// Step that stopped the sequence, if any
    pub aborted_at: Option<String>,
}

impl ExecutionResult {
    pub fn succeeded(&self) -> bool {
        self.aborted_at.is_none() && self.failed == 0 && self.completed == self.total_tasks
    }
}
