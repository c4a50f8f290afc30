//! Per-run task state.
//!
//! Tasks move `Unstarted -> Pending -> Completed | Failed`, possibly passing
//! through `Waiting` while their prerequisites finish. Every change is
//! validated by [`StateTransition`] and announced as a [`StateEvent`].

pub mod transitions;
pub mod types;

pub use transitions::{StateTransition, TransitionError};
pub use types::{ExecutionState, StateEvent, TaskState};
