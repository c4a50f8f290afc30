use crate::executor::types::{ExecutionResult, StepReport};

/// Output renderer plugin (controls the output format)
pub trait OutputRendererPlugin: Send + Sync {
    fn name(&self) -> &str;
    fn format(&self) -> &str;
    fn render(&self, event: &RenderEvent);
}

/// Unified render event
#[derive(Debug, Clone)]
pub enum RenderEvent {
    RunStart {
        run_id: String,
        sequence_id: String,
        total_tasks: usize,
        total_steps: usize,
    },
    Plan {
        run_id: String,
        steps: Vec<(String, bool, Vec<String>)>,
    },
    StepStart {
        run_id: String,
        step_id: String,
        parallel: bool,
        task_ids: Vec<String>,
    },
    TaskStart {
        run_id: String,
        task_id: String,
        step_id: String,
    },
    TaskComplete {
        run_id: String,
        task_id: String,
        success: bool,
        duration_ms: u64,
        error: Option<String>,
    },
    StepEnd {
        run_id: String,
        report: StepReport,
    },
    RunEnd {
        run_id: String,
        result: ExecutionResult,
    },
}

impl RenderEvent {
    pub fn run_id(&self) -> &str {
        match self {
            Self::RunStart { run_id, .. }
            | Self::Plan { run_id, .. }
            | Self::StepStart { run_id, .. }
            | Self::TaskStart { run_id, .. }
            | Self::TaskComplete { run_id, .. }
            | Self::StepEnd { run_id, .. }
            | Self::RunEnd { run_id, .. } => run_id,
        }
    }
}
