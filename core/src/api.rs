//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `buildseq_core::api` instead of reaching into internal modules.

pub use crate::artifact::{
    ArtifactGraph, ArtifactState, DeclaredOutput, DependencyGraphSpec, FileDependencies, FileTask,
    FixLoop, FixOperation, FixOutcome, PathPolicy, Verifier, VerifyOutcome, VirtualDirectory,
};
pub use crate::config::{
    load_default, AppConfig, FixLoopConfig, GenerationConfig, LoggingConfig, PathsConfig,
    ProjectConfig, VerifierConfig,
};
pub use crate::context::{keys, ExecutionContext, GlobalContext};
pub use crate::error::{BuildError, ErrorCode, ExecutorError, NonRetryableKind, RetryableKind};
pub use crate::executor::traits::{
    BuildHandler, HandlerInput, OutputRendererPlugin, RenderEvent, RetryStrategyPlugin,
};
pub use crate::executor::{
    execute_batch_parallel, flat_to_staged, BuildNode, BuildResult, BuildSequence, BuildStep,
    ExecutionPlan, ExecutionResult, ExecutorConfig, FlatSequence, NodeData, NodeOutcome,
    PipelineDefinition, RetryConfig, SequenceExecutor, StepReport, TaskGraph,
};
pub use crate::generation::{
    extract_json, extract_tagged, GenerationRequest, GenerationResponse, GenerationService,
    Message, MeteredGeneration, Role, TokenUsage,
};
pub use crate::metrics::{MetricsMonitor, PipelineReport, RecordKind, TaskMetrics, TaskStatus};
pub use crate::registry::HandlerRegistry;
pub use crate::state::{ExecutionState, StateEvent, TaskState};
