//! Sequence execution over a task dependency graph (DAG).
//!
//! # Architecture
//!
//! ```text
//! PipelineDefinition (staged | flat)
//!   ↓
//! into_sequence() → BuildSequence (flat form: one parallel step per layer)
//!   ↓
//! TaskGraph::check() → cycle detection, topological order, Kahn layers
//!   ↓
//! SequenceExecutor::execute_sequence() → ExecutionResult
//! ```

mod engine;
mod graph;
mod plan;
mod progress;
mod scheduler;
pub mod traits;
pub mod types;

pub use engine::{NodeOutcome, SequenceExecutor, SequenceExecutorBuilder};
pub use graph::{GraphNode, TaskGraph};
pub use plan::{flat_to_staged, ExecutionPlan, PlannedStep};
pub use progress::ProgressMonitor;
pub use scheduler::execute_batch_parallel;
pub use types::*;
