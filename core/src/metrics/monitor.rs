use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::report::{render_text_report, PipelineReport, RecordKind, TaskMetrics, TaskStatus};

struct PipelineRecord {
    name: String,
    declared_tasks: usize,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    tasks: HashMap<String, TaskMetrics>,
    order: Vec<String>,
}

impl PipelineRecord {
    fn new(name: &str, declared_tasks: usize, at: DateTime<Utc>) -> Self {
        Self {
            name: name.to_string(),
            declared_tasks,
            started_at: at,
            ended_at: None,
            tasks: HashMap::new(),
            order: Vec::new(),
        }
    }

    fn task_mut(&mut self, task_id: &str, at: DateTime<Utc>) -> &mut TaskMetrics {
        if !self.tasks.contains_key(task_id) {
            self.order.push(task_id.to_string());
        }
        self.tasks
            .entry(task_id.to_string())
            .or_insert_with(|| TaskMetrics::started(task_id, at))
    }
}

/// Records per-task and per-pipeline timing, status, retries and
/// generation usage.
///
/// Every recording method is idempotent on creation: touching a task or
/// pipeline that was never started creates its record first. Pipelines stay
/// in memory until [`MetricsMonitor::evict`] is called.
#[derive(Default)]
pub struct MetricsMonitor {
    pipelines: Mutex<HashMap<String, PipelineRecord>>,
}

impl MetricsMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PipelineRecord>> {
        match self.pipelines.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn with_pipeline<R>(&self, pipeline_id: &str, f: impl FnOnce(&mut PipelineRecord) -> R) -> R {
        let mut pipelines = self.lock();
        let record = pipelines
            .entry(pipeline_id.to_string())
            .or_insert_with(|| PipelineRecord::new(pipeline_id, 0, Utc::now()));
        f(record)
    }

    /// Begin a pipeline record. `declared_tasks` is the size of the whole
    /// sequence, so tasks that never start still count against the success
    /// rate.
    pub fn start_pipeline(&self, pipeline_id: &str, name: &str, declared_tasks: usize) {
        let now = Utc::now();
        let mut pipelines = self.lock();
        pipelines.insert(
            pipeline_id.to_string(),
            PipelineRecord::new(name, declared_tasks, now),
        );
    }

    pub fn end_pipeline(&self, pipeline_id: &str) {
        self.with_pipeline(pipeline_id, |p| p.ended_at = Some(Utc::now()));
    }

    /// Start (or restart, after a retry) timing a task.
    pub fn start_task(&self, pipeline_id: &str, task_id: &str) {
        self.start_record(pipeline_id, task_id, RecordKind::Task);
    }

    /// Start timing a fix-loop artifact. Artifact rows are kept out of the
    /// task totals; an existing row (e.g. from an earlier generation call) is
    /// re-tagged.
    pub fn start_artifact(&self, pipeline_id: &str, key: &str) {
        self.start_record(pipeline_id, key, RecordKind::Artifact);
    }

    fn start_record(&self, pipeline_id: &str, id: &str, kind: RecordKind) {
        let now = Utc::now();
        self.with_pipeline(pipeline_id, |p| {
            let task = p.task_mut(id, now);
            task.kind = kind;
            task.status = TaskStatus::Running;
            task.started_at = now;
            task.ended_at = None;
            task.duration_ms = None;
        });
    }

    pub fn end_task(&self, pipeline_id: &str, task_id: &str, success: bool, error: Option<&str>) {
        let now = Utc::now();
        self.with_pipeline(pipeline_id, |p| {
            let task = p.task_mut(task_id, now);
            task.status = if success {
                TaskStatus::Completed
            } else {
                TaskStatus::Failed
            };
            task.ended_at = Some(now);
            task.duration_ms = Some(elapsed_ms(task.started_at, now));
            if let Some(err) = error {
                task.last_error = Some(err.to_string());
            }
        });
    }

    /// Count one more retry, creating the task record if needed.
    pub fn increment_retry(&self, pipeline_id: &str, task_id: &str) -> u32 {
        let now = Utc::now();
        self.with_pipeline(pipeline_id, |p| {
            let task = p.task_mut(task_id, now);
            task.retry_count += 1;
            task.retry_count
        })
    }

    /// Record one generation call attributed to a task.
    pub fn record_generation(
        &self,
        pipeline_id: &str,
        task_id: &str,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        input_tokens: u64,
        output_tokens: u64,
    ) {
        self.with_pipeline(pipeline_id, |p| {
            let task = p.task_mut(task_id, started_at);
            task.generation_calls += 1;
            task.generation_ms += elapsed_ms(started_at, ended_at);
            task.input_tokens += input_tokens;
            task.output_tokens += output_tokens;
        });
    }

    pub fn task(&self, pipeline_id: &str, task_id: &str) -> Option<TaskMetrics> {
        self.lock()
            .get(pipeline_id)
            .and_then(|p| p.tasks.get(task_id).cloned())
    }

    /// Structured report, `None` for an unknown (or evicted) pipeline.
    pub fn report(&self, pipeline_id: &str) -> Option<PipelineReport> {
        let pipelines = self.lock();
        let p = pipelines.get(pipeline_id)?;

        let (tasks, artifacts): (Vec<TaskMetrics>, Vec<TaskMetrics>) = p
            .order
            .iter()
            .filter_map(|id| p.tasks.get(id).cloned())
            .partition(|t| t.kind == RecordKind::Task);
        let count = |rows: &[TaskMetrics], status: TaskStatus| {
            rows.iter().filter(|t| t.status == status).count()
        };
        let completed = count(&tasks, TaskStatus::Completed);
        let total = p.declared_tasks.max(tasks.len());
        let success_rate = if total == 0 {
            0.0
        } else {
            completed as f64 * 100.0 / total as f64
        };
        let usage = tasks.iter().chain(artifacts.iter());

        Some(PipelineReport {
            pipeline_id: pipeline_id.to_string(),
            name: p.name.clone(),
            started_at: p.started_at,
            ended_at: p.ended_at,
            duration_ms: p.ended_at.map(|end| elapsed_ms(p.started_at, end)),
            total_tasks: total,
            completed_tasks: completed,
            failed_tasks: count(&tasks, TaskStatus::Failed),
            success_rate,
            total_retries: tasks.iter().map(|t| t.retry_count).sum(),
            total_input_tokens: usage.clone().map(|t| t.input_tokens).sum(),
            total_output_tokens: usage.map(|t| t.output_tokens).sum(),
            verified_artifacts: count(&artifacts, TaskStatus::Completed),
            abandoned_artifacts: count(&artifacts, TaskStatus::Failed),
            tasks,
            artifacts,
        })
    }

    pub fn text_report(&self, pipeline_id: &str) -> Option<String> {
        self.report(pipeline_id).map(|r| render_text_report(&r))
    }

    /// Drop a pipeline's records. Returns whether anything was removed.
    pub fn evict(&self, pipeline_id: &str) -> bool {
        self.lock().remove(pipeline_id).is_some()
    }

    pub fn pipeline_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }
}

fn elapsed_ms(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    (end - start).num_milliseconds().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_on_unknown_task_creates_it() {
        let monitor = MetricsMonitor::new();
        assert_eq!(monitor.increment_retry("p", "t"), 1);
        assert_eq!(monitor.increment_retry("p", "t"), 2);
        assert_eq!(monitor.task("p", "t").unwrap().retry_count, 2);
    }

    #[test]
    fn report_counts_outcomes() {
        let monitor = MetricsMonitor::new();
        monitor.start_pipeline("run-1", "demo", 2);
        monitor.start_task("run-1", "a");
        monitor.end_task("run-1", "a", true, None);
        monitor.start_task("run-1", "b");
        monitor.end_task("run-1", "b", false, Some("boom"));
        monitor.end_pipeline("run-1");

        let report = monitor.report("run-1").unwrap();
        assert_eq!(report.total_tasks, 2);
        assert_eq!(report.completed_tasks, 1);
        assert_eq!(report.failed_tasks, 1);
        assert!((report.success_rate - 50.0).abs() < f64::EPSILON);
        assert_eq!(report.tasks[0].task_id, "a");
        assert_eq!(report.tasks[1].last_error.as_deref(), Some("boom"));

        let text = monitor.text_report("run-1").unwrap();
        assert!(text.contains("FAILED"));
        assert!(text.contains("boom"));
    }

    #[test]
    fn generation_usage_accumulates() {
        let monitor = MetricsMonitor::new();
        let t0 = Utc::now();
        monitor.record_generation("p", "gen", t0, t0, 10, 4);
        monitor.record_generation("p", "gen", t0, t0, 5, 1);
        let task = monitor.task("p", "gen").unwrap();
        assert_eq!(task.generation_calls, 2);
        assert_eq!(task.input_tokens, 15);
        assert_eq!(task.output_tokens, 5);
    }

    #[test]
    fn evicted_pipelines_are_gone() {
        let monitor = MetricsMonitor::new();
        monitor.start_pipeline("p", "demo", 0);
        assert!(monitor.evict("p"));
        assert!(monitor.report("p").is_none());
        assert!(!monitor.evict("p"));
    }

    #[test]
    fn unstarted_tasks_count_against_the_success_rate() {
        let monitor = MetricsMonitor::new();
        monitor.start_pipeline("run-1", "demo", 3);
        monitor.start_task("run-1", "a");
        monitor.end_task("run-1", "a", true, None);
        monitor.start_task("run-1", "b");
        monitor.end_task("run-1", "b", false, Some("boom"));

        let report = monitor.report("run-1").unwrap();
        assert_eq!(report.total_tasks, 3);
        assert_eq!(report.tasks.len(), 2);
        assert!((report.success_rate - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn artifacts_are_reported_apart_from_tasks() {
        let monitor = MetricsMonitor::new();
        monitor.start_pipeline("run-1", "demo", 1);
        monitor.start_task("run-1", "code");
        let t0 = Utc::now();
        monitor.record_generation("run-1", "artifact:src/a.ts", t0, t0, 7, 3);
        monitor.start_artifact("run-1", "artifact:src/a.ts");
        monitor.end_task("run-1", "artifact:src/a.ts", true, None);
        monitor.start_artifact("run-1", "artifact:src/b.ts");
        monitor.increment_retry("run-1", "artifact:src/b.ts");
        monitor.end_task("run-1", "artifact:src/b.ts", false, Some("TS2304"));
        monitor.end_task("run-1", "code", true, None);

        let report = monitor.report("run-1").unwrap();
        assert_eq!(report.total_tasks, 1);
        assert_eq!(report.failed_tasks, 0);
        assert!((report.success_rate - 100.0).abs() < f64::EPSILON);
        assert_eq!(report.total_retries, 0);
        assert_eq!(report.total_input_tokens, 7);
        assert_eq!(report.artifacts.len(), 2);
        assert_eq!(report.verified_artifacts, 1);
        assert_eq!(report.abandoned_artifacts, 1);

        let text = monitor.text_report("run-1").unwrap();
        assert!(text.contains("artifacts: 2 total, 1 verified, 1 abandoned, 1 fixes"));
        assert!(text.contains("ABANDONED"));
        assert!(!text.contains("FAILED"));
    }
}
