//! Per-task and per-pipeline execution metrics.

mod monitor;
mod report;

pub use monitor::MetricsMonitor;
pub use report::{render_text_report, PipelineReport, RecordKind, TaskMetrics, TaskStatus};
