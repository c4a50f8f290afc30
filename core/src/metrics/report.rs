use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Completed,
    Failed,
}

/// What a metrics row tracks.
///
/// Artifact rows belong to a fix loop running inside a task; they are
/// reported apart and never counted as pipeline tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    #[default]
    Task,
    Artifact,
}

/// Timing, retries and generation usage of one task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskMetrics {
    pub task_id: String,
    pub kind: RecordKind,
    pub status: TaskStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub generation_calls: u32,
    pub generation_ms: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TaskMetrics {
    pub(crate) fn started(task_id: &str, at: DateTime<Utc>) -> Self {
        Self {
            task_id: task_id.to_string(),
            kind: RecordKind::Task,
            status: TaskStatus::Running,
            started_at: at,
            ended_at: None,
            duration_ms: None,
            retry_count: 0,
            last_error: None,
            generation_calls: 0,
            generation_ms: 0,
            input_tokens: 0,
            output_tokens: 0,
        }
    }
}

/// Structured report for one pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub pipeline_id: String,
    pub name: String,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Declared tasks of the pipeline, including those that never started.
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    /// `completed_tasks / total_tasks * 100`.
    pub success_rate: f64,
    /// Task-level retries.
    pub total_retries: u32,
    /// Generation usage of tasks and artifacts together.
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    /// Tasks in the order they started.
    pub tasks: Vec<TaskMetrics>,
    pub verified_artifacts: usize,
    pub abandoned_artifacts: usize,
    /// Fix-loop artifacts in the order they started.
    pub artifacts: Vec<TaskMetrics>,
}

/// Plain-text rendering of a [`PipelineReport`].
pub fn render_text_report(report: &PipelineReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Pipeline {} ({})", report.name, report.pipeline_id);
    let _ = writeln!(
        out,
        "  tasks: {} total, {} completed, {} failed ({:.1}% success)",
        report.total_tasks, report.completed_tasks, report.failed_tasks, report.success_rate
    );
    if let Some(ms) = report.duration_ms {
        let _ = writeln!(out, "  duration: {ms}ms");
    }
    let _ = writeln!(
        out,
        "  retries: {}  tokens: {} in / {} out",
        report.total_retries, report.total_input_tokens, report.total_output_tokens
    );

    for task in &report.tasks {
        render_row(&mut out, task, "ok", "FAILED");
    }

    if !report.artifacts.is_empty() {
        let fixes: u32 = report.artifacts.iter().map(|a| a.retry_count).sum();
        let _ = writeln!(
            out,
            "  artifacts: {} total, {} verified, {} abandoned, {fixes} fixes",
            report.artifacts.len(),
            report.verified_artifacts,
            report.abandoned_artifacts
        );
        for artifact in &report.artifacts {
            render_row(&mut out, artifact, "verified", "ABANDONED");
        }
    }
    out
}

fn render_row(out: &mut String, row: &TaskMetrics, ok: &str, failed: &str) {
    let status = match row.status {
        TaskStatus::Running => "running",
        TaskStatus::Completed => ok,
        TaskStatus::Failed => failed,
    };
    let duration = row
        .duration_ms
        .map(|ms| format!("{ms}ms"))
        .unwrap_or_else(|| "-".to_string());
    let _ = write!(
        out,
        "  - {:<32} {:<9} {:>8}  retries={}",
        row.task_id, status, duration, row.retry_count
    );
    if row.generation_calls > 0 {
        let _ = write!(
            out,
            "  calls={} tokens={}/{}",
            row.generation_calls, row.input_tokens, row.output_tokens
        );
    }
    if let Some(err) = &row.last_error {
        let _ = write!(out, "  error: {err}");
    }
    out.push('\n');
}
