//! Dependency-driven build sequence engine.
//!
//! A pipeline is an ordered list of steps, each a serial or parallel group
//! of nodes bound to handlers. The [`executor::SequenceExecutor`] walks the
//! steps over an [`context::ExecutionContext`], which owns task state and
//! results. Artifact-producing handlers use the [`artifact::FixLoop`] to
//! write, verify and repair generated files.

pub mod api;
pub mod artifact;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod generation;
pub mod metrics;
pub mod registry;
pub mod state;
