//! Task state transition rules

use super::types::TaskState;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Invalid transition from {from:?} to {to:?}")]
    InvalidTransition { from: TaskState, to: TaskState },
    #[error("Cannot transition from terminal state {state:?}")]
    FromTerminalState { state: TaskState },
}

pub struct StateTransition;

impl StateTransition {
    /// Check that `from -> to` is a legal edge.
    ///
    /// `Failed -> Unstarted` is the only way out of `Failed`, and only an
    /// explicit retry takes it.
    pub fn validate(from: TaskState, to: TaskState) -> Result<(), TransitionError> {
        if from == TaskState::Completed {
            return Err(TransitionError::FromTerminalState { state: from });
        }

        let is_valid = matches!(
            (from, to),
            (TaskState::Unstarted, TaskState::Waiting)
                | (TaskState::Waiting, TaskState::Waiting)
                | (TaskState::Unstarted, TaskState::Pending)
                | (TaskState::Waiting, TaskState::Pending)
                | (TaskState::Pending, TaskState::Completed)
                | (TaskState::Pending, TaskState::Failed)
                | (TaskState::Failed, TaskState::Unstarted)
        );

        if is_valid {
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition { from, to })
        }
    }

    pub fn is_terminal(state: TaskState) -> bool {
        matches!(state, TaskState::Completed | TaskState::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        assert!(StateTransition::validate(TaskState::Unstarted, TaskState::Pending).is_ok());
        assert!(StateTransition::validate(TaskState::Waiting, TaskState::Pending).is_ok());
        assert!(StateTransition::validate(TaskState::Pending, TaskState::Failed).is_ok());
        assert!(StateTransition::validate(TaskState::Failed, TaskState::Unstarted).is_ok());
    }

    #[test]
    fn test_invalid_transitions() {
        // a second concurrent start must be refused
        assert!(StateTransition::validate(TaskState::Pending, TaskState::Pending).is_err());
        assert!(StateTransition::validate(TaskState::Failed, TaskState::Pending).is_err());
        assert_eq!(
            StateTransition::validate(TaskState::Completed, TaskState::Unstarted),
            Err(TransitionError::FromTerminalState {
                state: TaskState::Completed
            })
        );
    }

    #[test]
    fn test_terminal_states() {
        assert!(StateTransition::is_terminal(TaskState::Completed));
        assert!(StateTransition::is_terminal(TaskState::Failed));
        assert!(!StateTransition::is_terminal(TaskState::Waiting));
    }
}
