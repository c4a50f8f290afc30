use thiserror::Error;

use super::code::ErrorCode;
use super::error::{BuildError, NonRetryableKind, RetryableKind};

/// Errors raised while building or validating a dependency graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("Duplicate task ID: {0}")]
    DuplicateTaskId(String),

    #[error("Dependency not found: task '{task_id}' depends on '{missing_dep}'")]
    DependencyNotFound {
        task_id: String,
        missing_dep: String,
    },

    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    #[error("Layering left {} node(s) unresolved: {}", .0.len(), .0.join(", "))]
    UnresolvedLayering(Vec<String>),
}

impl ExecutorError {
    /// Map executor error to protocol error code
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::DuplicateTaskId(_) => ErrorCode::ValidationError,
            Self::DependencyNotFound { .. } => ErrorCode::DependencyError,
            Self::CircularDependency(_) => ErrorCode::CircularDependency,
            Self::UnresolvedLayering(_) => ErrorCode::DependencyError,
        }
    }
}

impl From<ExecutorError> for BuildError {
    fn from(err: ExecutorError) -> Self {
        let message = err.to_string();
        match err {
            ExecutorError::CircularDependency(_) => {
                BuildError::non_retryable(NonRetryableKind::DependencyCycle, message)
            }
            ExecutorError::UnresolvedLayering(_) => {
                BuildError::retryable(RetryableKind::UnresolvedLayering, message)
            }
            ExecutorError::DuplicateTaskId(_) | ExecutorError::DependencyNotFound { .. } => {
                BuildError::invalid_parameter(message)
            }
        }
    }
}
