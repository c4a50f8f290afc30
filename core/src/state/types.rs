//! Task state types

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::transitions::{StateTransition, TransitionError};

/// Where a task is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Never started, or reset by an explicit retry.
    Unstarted,
    /// Prerequisites were not complete when last scanned.
    Waiting,
    /// Handler is running.
    Pending,
    Completed,
    Failed,
}

/// The four disjoint id sets of one run.
///
/// A task id is in at most one set at a time; ids in none are `Unstarted`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionState {
    completed: HashSet<String>,
    pending: HashSet<String>,
    failed: HashSet<String>,
    waiting: HashSet<String>,
}

impl ExecutionState {
    pub fn state_of(&self, task_id: &str) -> TaskState {
        if self.completed.contains(task_id) {
            TaskState::Completed
        } else if self.pending.contains(task_id) {
            TaskState::Pending
        } else if self.failed.contains(task_id) {
            TaskState::Failed
        } else if self.waiting.contains(task_id) {
            TaskState::Waiting
        } else {
            TaskState::Unstarted
        }
    }

    /// Move a task to `to`, validating the edge first.
    pub fn transition(&mut self, task_id: &str, to: TaskState) -> Result<TaskState, TransitionError> {
        let from = self.state_of(task_id);
        StateTransition::validate(from, to)?;

        self.completed.remove(task_id);
        self.pending.remove(task_id);
        self.failed.remove(task_id);
        self.waiting.remove(task_id);

        let id = task_id.to_string();
        match to {
            TaskState::Unstarted => {}
            TaskState::Waiting => {
                self.waiting.insert(id);
            }
            TaskState::Pending => {
                self.pending.insert(id);
            }
            TaskState::Completed => {
                self.completed.insert(id);
            }
            TaskState::Failed => {
                self.failed.insert(id);
            }
        }
        Ok(from)
    }

    pub fn is_completed(&self, task_id: &str) -> bool {
        self.completed.contains(task_id)
    }

    pub fn is_failed(&self, task_id: &str) -> bool {
        self.failed.contains(task_id)
    }

    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn waiting_count(&self) -> usize {
        self.waiting.len()
    }
}

/// Lifecycle notifications published by the execution context.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StateEvent {
    TaskWaiting {
        task_id: String,
        timestamp: DateTime<Utc>,
    },
    TaskStarted {
        task_id: String,
        handler: String,
        timestamp: DateTime<Utc>,
    },
    TaskCompleted {
        task_id: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    TaskFailed {
        task_id: String,
        error: String,
        retryable: bool,
        timestamp: DateTime<Utc>,
    },
    /// A failed task was reset to `Unstarted`.
    TaskReset {
        task_id: String,
        timestamp: DateTime<Utc>,
    },
}

impl StateEvent {
    pub fn task_id(&self) -> &str {
        match self {
            Self::TaskWaiting { task_id, .. }
            | Self::TaskStarted { task_id, .. }
            | Self::TaskCompleted { task_id, .. }
            | Self::TaskFailed { task_id, .. }
            | Self::TaskReset { task_id, .. } => task_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::TaskWaiting { timestamp, .. }
            | Self::TaskStarted { timestamp, .. }
            | Self::TaskCompleted { timestamp, .. }
            | Self::TaskFailed { timestamp, .. }
            | Self::TaskReset { timestamp, .. } => *timestamp,
        }
    }
}
