//! Shared state of one pipeline run.

mod globals;

pub use globals::{keys, GlobalContext};

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{broadcast, watch};

use crate::error::{BuildError, NonRetryableKind};
use crate::executor::traits::HandlerInput;
use crate::executor::types::{BuildNode, BuildResult, BuildSequence};
use crate::metrics::MetricsMonitor;
use crate::registry::HandlerRegistry;
use crate::state::{ExecutionState, StateEvent, TaskState};

/// Owns task states, results and globals for one run of a sequence.
///
/// Readiness checks and the transition to `Pending` happen under one lock, so
/// a task id is never run twice concurrently. Every state change bumps a
/// progress counter that waiting schedulers can await instead of sleeping.
pub struct ExecutionContext {
    run_id: String,
    sequence: BuildSequence,
    nodes: HashMap<String, BuildNode>,
    registry: Arc<HandlerRegistry>,
    monitor: Arc<MetricsMonitor>,
    globals: GlobalContext,
    state: Mutex<ExecutionState>,
    results: Mutex<HashMap<String, BuildResult>>,
    completion_order: Mutex<Vec<String>>,
    progress: watch::Sender<u64>,
    events: broadcast::Sender<StateEvent>,
}

impl ExecutionContext {
    pub fn new(sequence: BuildSequence, registry: Arc<HandlerRegistry>) -> Self {
        let mut nodes = HashMap::new();
        for node in sequence.nodes() {
            nodes
                .entry(node.id.clone())
                .or_insert_with(|| node.clone());
        }
        let (progress, _) = watch::channel(0u64);
        let (events, _) = broadcast::channel(1000);

        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            sequence,
            nodes,
            registry,
            monitor: Arc::new(MetricsMonitor::new()),
            globals: GlobalContext::new(),
            state: Mutex::new(ExecutionState::default()),
            results: Mutex::new(HashMap::new()),
            completion_order: Mutex::new(Vec::new()),
            progress,
            events,
        }
    }

    pub fn with_monitor(mut self, monitor: Arc<MetricsMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn sequence(&self) -> &BuildSequence {
        &self.sequence
    }

    pub fn node(&self, task_id: &str) -> Option<&BuildNode> {
        self.nodes.get(task_id)
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn monitor(&self) -> &Arc<MetricsMonitor> {
        &self.monitor
    }

    pub fn globals(&self) -> &GlobalContext {
        &self.globals
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.events.subscribe()
    }

    /// Receiver whose current value counts as seen. Take it before scanning
    /// readiness so that no change between the scan and the wait is missed.
    pub fn watch_progress(&self) -> watch::Receiver<u64> {
        self.progress.subscribe()
    }

    /// Wait for any state change, at most `timeout`. Returns whether one
    /// happened.
    pub async fn wait_for_progress(rx: &mut watch::Receiver<u64>, timeout: Duration) -> bool {
        matches!(tokio::time::timeout(timeout, rx.changed()).await, Ok(Ok(())))
    }

    fn lock_state(&self) -> MutexGuard<'_, ExecutionState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_results(&self) -> MutexGuard<'_, HashMap<String, BuildResult>> {
        match self.results.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_order(&self) -> MutexGuard<'_, Vec<String>> {
        match self.completion_order.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn emit(&self, event: StateEvent) {
        let _ = self.events.send(event);
        self.progress.send_modify(|n| *n = n.wrapping_add(1));
    }

    pub fn state_of(&self, task_id: &str) -> TaskState {
        self.lock_state().state_of(task_id)
    }

    pub fn snapshot(&self) -> ExecutionState {
        self.lock_state().clone()
    }

    pub fn is_completed(&self, task_id: &str) -> bool {
        self.lock_state().is_completed(task_id)
    }

    fn ready_in(state: &ExecutionState, node: &BuildNode) -> bool {
        matches!(
            state.state_of(&node.id),
            TaskState::Unstarted | TaskState::Waiting
        ) && node.requires.iter().all(|dep| state.is_completed(dep))
    }

    /// True iff the task is known, not completed, pending or failed, and
    /// every prerequisite is completed.
    pub fn can_execute(&self, task_id: &str) -> bool {
        let Some(node) = self.nodes.get(task_id) else {
            return false;
        };
        Self::ready_in(&self.lock_state(), node)
    }

    /// True when some prerequisite failed or is not part of the sequence,
    /// so the task cannot become ready without an explicit retry.
    pub fn is_blocked(&self, task_id: &str) -> bool {
        let Some(node) = self.nodes.get(task_id) else {
            return true;
        };
        let state = self.lock_state();
        node.requires
            .iter()
            .any(|dep| !self.nodes.contains_key(dep) || state.is_failed(dep))
    }

    /// Record that a task was scanned and found not ready.
    pub fn mark_waiting(&self, task_id: &str) {
        let previous = {
            let mut state = self.lock_state();
            match state.state_of(task_id) {
                TaskState::Unstarted => state.transition(task_id, TaskState::Waiting).ok(),
                _ => None,
            }
        };
        if previous.is_some() {
            self.emit(StateEvent::TaskWaiting {
                task_id: task_id.to_string(),
                timestamp: Utc::now(),
            });
        }
    }

    /// Results of a task's prerequisites that have completed.
    pub fn dependency_results(&self, task_id: &str) -> HashMap<String, BuildResult> {
        let Some(node) = self.nodes.get(task_id) else {
            return HashMap::new();
        };
        let results = self.lock_results();
        node.requires
            .iter()
            .filter_map(|dep| results.get(dep).map(|r| (dep.clone(), r.clone())))
            .collect()
    }

    fn begin(&self, node: &BuildNode) -> Result<(), BuildError> {
        {
            let mut state = self.lock_state();
            if !Self::ready_in(&state, node) {
                return Err(BuildError::non_retryable(
                    NonRetryableKind::TaskNotReady,
                    format!(
                        "task '{}' is {:?} or has incomplete prerequisites",
                        node.id,
                        state.state_of(&node.id)
                    ),
                ));
            }
            state
                .transition(&node.id, TaskState::Pending)
                .map_err(|e| BuildError::invalid_parameter(e.to_string()))?;
        }

        self.monitor.start_task(&self.run_id, &node.id);
        self.emit(StateEvent::TaskStarted {
            task_id: node.id.clone(),
            handler: node.handler_id().to_string(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Run a task's handler.
    ///
    /// The task moves to `Pending` first; on success its result is recorded
    /// and it moves to `Completed`. On failure it moves to `Failed` and the
    /// handler's error is returned unchanged.
    #[tracing::instrument(skip(self, dependencies), fields(run_id = %self.run_id))]
    pub async fn run(
        &self,
        task_id: &str,
        dependencies: HashMap<String, BuildResult>,
    ) -> Result<BuildResult, BuildError> {
        let node = self
            .nodes
            .get(task_id)
            .ok_or_else(|| BuildError::invalid_parameter(format!("unknown task '{task_id}'")))?;
        self.begin(node)?;

        let started = Instant::now();
        let outcome = match self.registry.get(node.handler_id()) {
            Some(handler) => {
                handler
                    .handle(self, HandlerInput::new(node, dependencies))
                    .await
            }
            None => Err(BuildError::non_retryable(
                NonRetryableKind::HandlerNotFound,
                format!("no handler registered for '{}'", node.handler_id()),
            )),
        };
        let outcome = match outcome {
            Ok(result) if !result.success => Err(result.error.unwrap_or_else(|| {
                BuildError::invalid_parameter(format!(
                    "handler '{}' reported failure",
                    node.handler_id()
                ))
            })),
            other => other,
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(result) => {
                self.finish(task_id, Ok(&result), duration_ms);
                tracing::debug!(task_id, duration_ms, "task completed");
                Ok(result)
            }
            Err(err) => {
                self.finish(task_id, Err(&err), duration_ms);
                tracing::warn!(task_id, error = %err, retryable = err.is_retryable(), "task failed");
                Err(err)
            }
        }
    }

    fn finish(&self, task_id: &str, outcome: Result<&BuildResult, &BuildError>, duration_ms: u64) {
        let (to, stored) = match outcome {
            Ok(result) => (TaskState::Completed, result.clone()),
            Err(err) => (TaskState::Failed, BuildResult::failed(err.clone())),
        };

        self.lock_results().insert(task_id.to_string(), stored);
        if let Err(e) = self.lock_state().transition(task_id, to) {
            tracing::error!(task_id, error = %e, "unexpected state transition");
        }

        match outcome {
            Ok(_) => {
                self.lock_order().push(task_id.to_string());
                self.monitor.end_task(&self.run_id, task_id, true, None);
                self.emit(StateEvent::TaskCompleted {
                    task_id: task_id.to_string(),
                    duration_ms,
                    timestamp: Utc::now(),
                });
            }
            Err(err) => {
                let message = err.to_string();
                self.monitor
                    .end_task(&self.run_id, task_id, false, Some(&message));
                self.emit(StateEvent::TaskFailed {
                    task_id: task_id.to_string(),
                    error: message,
                    retryable: err.is_retryable(),
                    timestamp: Utc::now(),
                });
            }
        }
    }

    /// Reset a failed task to `Unstarted` so that it can run again.
    pub fn retry(&self, task_id: &str) -> Result<(), BuildError> {
        self.lock_state()
            .transition(task_id, TaskState::Unstarted)
            .map_err(|e| {
                BuildError::non_retryable(
                    NonRetryableKind::TaskNotReady,
                    format!("cannot retry '{task_id}': {e}"),
                )
            })?;
        self.lock_results().remove(task_id);
        self.monitor.increment_retry(&self.run_id, task_id);
        self.emit(StateEvent::TaskReset {
            task_id: task_id.to_string(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Stored result of a completed or failed task.
    pub fn result(&self, task_id: &str) -> Option<BuildResult> {
        self.lock_results().get(task_id).cloned()
    }

    /// Typed payload of a completed task.
    pub fn get_data<T: Any + Send + Sync>(&self, task_id: &str) -> Option<Arc<T>> {
        if !self.is_completed(task_id) {
            return None;
        }
        self.result(task_id).and_then(|r| r.data::<T>())
    }

    /// Like [`ExecutionContext::get_data`], but absence is an error.
    pub fn require_data<T: Any + Send + Sync>(&self, task_id: &str) -> Result<Arc<T>, BuildError> {
        self.get_data(task_id)
            .ok_or_else(|| BuildError::missing_result(task_id))
    }

    /// Typed payload of the first completed task bound to `handler_id`, in
    /// declaration order.
    pub fn get_data_by_handler<T: Any + Send + Sync>(&self, handler_id: &str) -> Option<Arc<T>> {
        self.sequence
            .nodes()
            .filter(|n| n.handler_id() == handler_id)
            .find_map(|n| self.get_data::<T>(&n.id))
    }

    /// Completed task ids in completion order.
    pub fn completion_order(&self) -> Vec<String> {
        self.lock_order().clone()
    }

    pub fn completed_count(&self) -> usize {
        self.lock_state().completed_count()
    }

    pub fn failed_count(&self) -> usize {
        self.lock_state().failed_count()
    }
}
