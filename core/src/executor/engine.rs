use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::context::ExecutionContext;
use crate::error::BuildError;
use crate::state::TaskState;

use super::graph::TaskGraph;
use super::progress::ProgressMonitor;
use super::scheduler::execute_batch_parallel;
use super::traits::{OutputRendererPlugin, RenderEvent, RetryStrategyPlugin};
use super::types::{BuildNode, BuildStep, ExecutionResult, ExecutorConfig, StepReport};

/// Outcome of one attempt to execute a single node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutcome {
    /// The handler ran and succeeded.
    Completed,
    /// Nothing to do, the node had completed earlier.
    AlreadyCompleted,
    /// Prerequisites are incomplete; the node was marked waiting.
    NotReady,
    /// A prerequisite failed or is unknown.
    Blocked,
    Failed(BuildError),
}

/// Drives a staged sequence over an [`ExecutionContext`].
///
/// Steps run in declaration order. A serial step runs its nodes one at a
/// time, giving each a bounded number of readiness attempts. A parallel step
/// repeatedly runs every ready node concurrently until the step drains or no
/// progress is made for a bounded number of rounds. The first step that ends
/// with any node not completed aborts the remaining steps.
pub struct SequenceExecutor {
    config: ExecutorConfig,
    renderer: Option<Arc<dyn OutputRendererPlugin>>,
    retry_strategy: Option<Arc<dyn RetryStrategyPlugin>>,
}

pub struct SequenceExecutorBuilder {
    config: ExecutorConfig,
    renderer: Option<Arc<dyn OutputRendererPlugin>>,
    retry_strategy: Option<Arc<dyn RetryStrategyPlugin>>,
}

impl SequenceExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            config,
            renderer: None,
            retry_strategy: None,
        }
    }

    pub fn builder(config: ExecutorConfig) -> SequenceExecutorBuilder {
        SequenceExecutorBuilder::new(config)
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute one node, waiting at most one poll interval if it is not
    /// ready yet.
    pub async fn execute_node(&self, ctx: &ExecutionContext, task_id: &str) -> NodeOutcome {
        let progress = Mutex::new(ProgressMonitor::new(0, false));
        self.run_node(ctx, task_id, "", &progress).await
    }

    /// Execute a single step and report what happened to each of its nodes.
    pub async fn execute_step(&self, ctx: &ExecutionContext, step: &BuildStep) -> StepReport {
        let progress = Mutex::new(ProgressMonitor::new(0, false));
        self.run_step(ctx, step, &progress).await
    }

    /// Validate the whole sequence graph, then run its steps in order.
    ///
    /// Only validation errors are returned as `Err`; they are raised before
    /// any handler runs. Task failures are reported in the result.
    #[tracing::instrument(skip_all, fields(run_id = %ctx.run_id(), sequence = %ctx.sequence().id))]
    pub async fn execute_sequence(
        &self,
        ctx: &ExecutionContext,
    ) -> Result<ExecutionResult, BuildError> {
        let sequence = ctx.sequence();
        let nodes: Vec<BuildNode> = sequence.nodes().cloned().collect();
        let graph = TaskGraph::from_tasks(&nodes)?;
        graph.check()?;

        let start = Instant::now();
        let run_id = ctx.run_id().to_string();
        let total_tasks = nodes.len();
        let total_steps = sequence.steps.len();

        ctx.monitor().start_pipeline(&run_id, &sequence.id, total_tasks);
        self.emit(RenderEvent::RunStart {
            run_id: run_id.clone(),
            sequence_id: sequence.id.clone(),
            total_tasks,
            total_steps,
        });
        self.emit(RenderEvent::Plan {
            run_id: run_id.clone(),
            steps: sequence
                .steps
                .iter()
                .map(|s| {
                    (
                        s.id.clone(),
                        s.parallel,
                        s.nodes.iter().map(|n| n.id.clone()).collect(),
                    )
                })
                .collect(),
        });

        let progress = Mutex::new(ProgressMonitor::new(total_tasks, self.config.progress_bar));
        let mut steps = Vec::with_capacity(total_steps);
        let mut aborted_at = None;

        for (index, step) in sequence.steps.iter().enumerate() {
            if let Ok(monitor) = progress.lock() {
                monitor.update_stage(index, total_steps);
            }
            self.emit(RenderEvent::StepStart {
                run_id: run_id.clone(),
                step_id: step.id.clone(),
                parallel: step.parallel,
                task_ids: step.nodes.iter().map(|n| n.id.clone()).collect(),
            });

            let report = self.run_step(ctx, step, &progress).await;
            let complete = report.is_complete();

            self.emit(RenderEvent::StepEnd {
                run_id: run_id.clone(),
                report: report.clone(),
            });
            steps.push(report);

            if !complete {
                tracing::warn!(step = %step.id, "step did not complete, aborting remaining steps");
                aborted_at = Some(step.id.clone());
                break;
            }
        }

        ctx.monitor().end_pipeline(&run_id);

        let result = ExecutionResult {
            sequence_id: sequence.id.clone(),
            total_tasks,
            completed: ctx.completed_count(),
            failed: ctx.failed_count(),
            duration_ms: start.elapsed().as_millis() as u64,
            executed_order: ctx.completion_order(),
            steps,
            aborted_at,
        };

        if let Ok(monitor) = progress.lock() {
            monitor.finish(result.succeeded());
        }
        self.emit(RenderEvent::RunEnd {
            run_id,
            result: result.clone(),
        });

        Ok(result)
    }

    async fn run_step(
        &self,
        ctx: &ExecutionContext,
        step: &BuildStep,
        progress: &Mutex<ProgressMonitor>,
    ) -> StepReport {
        let mut report = StepReport {
            step_id: step.id.clone(),
            parallel: step.parallel,
            ..StepReport::default()
        };

        if step.parallel {
            self.run_parallel_step(ctx, step, progress, &mut report)
                .await;
        } else {
            self.run_serial_step(ctx, step, progress, &mut report).await;
        }

        tracing::debug!(
            step = %step.id,
            completed = report.completed.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "step finished"
        );
        report
    }

    async fn run_serial_step(
        &self,
        ctx: &ExecutionContext,
        step: &BuildStep,
        progress: &Mutex<ProgressMonitor>,
        report: &mut StepReport,
    ) {
        let budget = self.config.serial_ready_attempts.max(1);

        for (index, node) in step.nodes.iter().enumerate() {
            let mut attempts = 0;
            let failed = loop {
                match self.run_node(ctx, &node.id, &step.id, progress).await {
                    NodeOutcome::Completed | NodeOutcome::AlreadyCompleted => {
                        report.completed.push(node.id.clone());
                        break false;
                    }
                    NodeOutcome::Failed(_) => {
                        report.failed.push(node.id.clone());
                        break true;
                    }
                    NodeOutcome::Blocked => {
                        tracing::warn!(task_id = %node.id, "prerequisite failed, skipping");
                        report.skipped.push(node.id.clone());
                        break false;
                    }
                    NodeOutcome::NotReady => {
                        attempts += 1;
                        if attempts >= budget {
                            tracing::warn!(
                                task_id = %node.id,
                                attempts,
                                "prerequisites never completed, skipping"
                            );
                            report.skipped.push(node.id.clone());
                            break false;
                        }
                    }
                }
            };

            // A serial step never runs past its first failure.
            if failed {
                let rest = &step.nodes[index + 1..];
                if !rest.is_empty() {
                    tracing::warn!(task_id = %node.id, skipped = rest.len(), "serial step stopped");
                }
                report.skipped.extend(rest.iter().map(|n| n.id.clone()));
                break;
            }
        }
    }

    async fn run_parallel_step(
        &self,
        ctx: &ExecutionContext,
        step: &BuildStep,
        progress: &Mutex<ProgressMonitor>,
        report: &mut StepReport,
    ) {
        let mut remaining: Vec<String> = Vec::new();
        for node in &step.nodes {
            match ctx.state_of(&node.id) {
                TaskState::Completed => report.completed.push(node.id.clone()),
                TaskState::Failed => report.failed.push(node.id.clone()),
                _ => remaining.push(node.id.clone()),
            }
        }

        let budget = self.config.parallel_idle_rounds.max(1);
        let mut idle_rounds = 0;

        while !remaining.is_empty() {
            let mut changes = ctx.watch_progress();

            let (blocked, waiting): (Vec<String>, Vec<String>) =
                remaining.into_iter().partition(|id| ctx.is_blocked(id));
            for id in &blocked {
                tracing::warn!(task_id = %id, "prerequisite failed, skipping");
            }
            report.skipped.extend(blocked);
            remaining = waiting;

            let (ready, not_ready): (Vec<String>, Vec<String>) =
                remaining.into_iter().partition(|id| ctx.can_execute(id));
            remaining = not_ready;

            if ready.is_empty() {
                if remaining.is_empty() {
                    break;
                }
                idle_rounds += 1;
                if idle_rounds > budget {
                    tracing::warn!(
                        step = %step.id,
                        tasks = ?remaining,
                        "no progress after {} rounds, giving up on step",
                        budget
                    );
                    report.skipped.append(&mut remaining);
                    break;
                }
                for id in &remaining {
                    ctx.mark_waiting(id);
                }
                ExecutionContext::wait_for_progress(&mut changes, self.config.poll_interval())
                    .await;
                continue;
            }
            idle_rounds = 0;

            let results = execute_batch_parallel(&ready, self.config.max_concurrency, |id| {
                let step_id = step.id.as_str();
                async move { self.run_task(ctx, &id, step_id, progress).await }
            })
            .await;

            let mut any_failed = false;
            for (id, outcome) in results {
                match outcome {
                    Ok(()) => report.completed.push(id),
                    Err(_) => {
                        any_failed = true;
                        report.failed.push(id);
                    }
                }
            }

            if any_failed && self.config.fail_fast {
                report.skipped.append(&mut remaining);
                break;
            }
        }
    }

    async fn run_node(
        &self,
        ctx: &ExecutionContext,
        task_id: &str,
        step_id: &str,
        progress: &Mutex<ProgressMonitor>,
    ) -> NodeOutcome {
        let mut changes = ctx.watch_progress();

        match ctx.state_of(task_id) {
            TaskState::Completed => {
                tracing::debug!(task_id, "already completed");
                return NodeOutcome::AlreadyCompleted;
            }
            TaskState::Failed => {
                let error = ctx
                    .result(task_id)
                    .and_then(|r| r.error)
                    .unwrap_or_else(|| BuildError::missing_result(task_id));
                return NodeOutcome::Failed(error);
            }
            _ => {}
        }

        if !ctx.can_execute(task_id) {
            if ctx.is_blocked(task_id) {
                return NodeOutcome::Blocked;
            }
            ctx.mark_waiting(task_id);
            tracing::debug!(task_id, "prerequisites incomplete, waiting");
            ExecutionContext::wait_for_progress(&mut changes, self.config.poll_interval()).await;
            return NodeOutcome::NotReady;
        }

        match self.run_task(ctx, task_id, step_id, progress).await {
            Ok(()) => NodeOutcome::Completed,
            Err(err) => NodeOutcome::Failed(err),
        }
    }

    /// Run a ready task, retrying retryable failures when a strategy is set.
    async fn run_task(
        &self,
        ctx: &ExecutionContext,
        task_id: &str,
        step_id: &str,
        progress: &Mutex<ProgressMonitor>,
    ) -> Result<(), BuildError> {
        if let Ok(mut monitor) = progress.lock() {
            monitor.add_task(task_id);
        }
        self.emit(RenderEvent::TaskStart {
            run_id: ctx.run_id().to_string(),
            task_id: task_id.to_string(),
            step_id: step_id.to_string(),
        });

        let started = Instant::now();
        let mut failures = 0u32;
        let outcome = loop {
            match ctx.run(task_id, ctx.dependency_results(task_id)).await {
                Ok(_) => break Ok(()),
                Err(err) => {
                    failures += 1;
                    let Some(strategy) = self
                        .retry_strategy
                        .as_ref()
                        .filter(|s| s.should_retry(failures, &err))
                    else {
                        break Err(err);
                    };

                    tracing::info!(
                        task_id,
                        attempt = failures,
                        strategy = strategy.name(),
                        error = %err,
                        "retrying task"
                    );
                    if let Some(delay) = strategy.next_delay(failures, &err) {
                        tokio::time::sleep(delay).await;
                    }
                    if let Err(reset) = ctx.retry(task_id) {
                        break Err(reset);
                    }
                }
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        if let Ok(mut monitor) = progress.lock() {
            monitor.complete_task(task_id, outcome.is_ok(), duration_ms);
        }
        self.emit(RenderEvent::TaskComplete {
            run_id: ctx.run_id().to_string(),
            task_id: task_id.to_string(),
            success: outcome.is_ok(),
            duration_ms,
            error: outcome.as_ref().err().map(|e| e.to_string()),
        });

        outcome
    }

    fn emit(&self, event: RenderEvent) {
        if let Some(renderer) = &self.renderer {
            renderer.render(&event);
            return;
        }

        match &event {
            RenderEvent::RunStart {
                run_id,
                sequence_id,
                total_tasks,
                total_steps,
            } => tracing::info!(%run_id, %sequence_id, total_tasks, total_steps, "run started"),
            RenderEvent::StepStart {
                step_id,
                parallel,
                task_ids,
                ..
            } => tracing::info!(%step_id, parallel, tasks = ?task_ids, "step started"),
            RenderEvent::TaskComplete {
                task_id,
                success: false,
                error,
                ..
            } => tracing::warn!(%task_id, error = ?error, "task failed"),
            RenderEvent::RunEnd { result, .. } => tracing::info!(
                completed = result.completed,
                failed = result.failed,
                total = result.total_tasks,
                duration_ms = result.duration_ms,
                "run finished"
            ),
            _ => {}
        }
    }
}

impl SequenceExecutorBuilder {
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            config,
            renderer: None,
            retry_strategy: None,
        }
    }

    pub fn renderer(mut self, renderer: Arc<dyn OutputRendererPlugin>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn retry_strategy(mut self, strategy: Arc<dyn RetryStrategyPlugin>) -> Self {
        self.retry_strategy = Some(strategy);
        self
    }

    pub fn build(self) -> SequenceExecutor {
        SequenceExecutor {
            config: self.config,
            renderer: self.renderer,
            retry_strategy: self.retry_strategy,
        }
    }
}
