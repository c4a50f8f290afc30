use buildseq_core::api::{OutputRendererPlugin, RenderEvent};

pub struct TextRendererPlugin {
    ascii_only: bool,
}

impl TextRendererPlugin {
    pub fn new(ascii_only: bool) -> Self {
        Self { ascii_only }
    }

    fn mode(parallel: bool) -> &'static str {
        if parallel {
            "parallel"
        } else {
            "serial"
        }
    }

    fn format_event(&self, event: &RenderEvent) -> String {
        match event {
            RenderEvent::RunStart {
                run_id,
                sequence_id,
                total_tasks,
                total_steps,
            } => format!(
                "RUN START {} (sequence {}, tasks: {}, steps: {})",
                run_id, sequence_id, total_tasks, total_steps
            ),
            RenderEvent::Plan { run_id, steps } => {
                let mut out = format!("PLAN {}:", run_id);
                for (idx, (step_id, parallel, tasks)) in steps.iter().enumerate() {
                    out.push_str(&format!(
                        "\n  step {} {} [{}]: {}",
                        idx + 1,
                        step_id,
                        Self::mode(*parallel),
                        tasks.join(", ")
                    ));
                }
                out
            }
            RenderEvent::StepStart {
                run_id,
                step_id,
                parallel,
                task_ids,
            } => format!(
                "STEP START {} (step {}, {}, tasks: {})",
                run_id,
                step_id,
                Self::mode(*parallel),
                task_ids.len()
            ),
            RenderEvent::TaskStart {
                run_id,
                task_id,
                step_id,
            } => format!("TASK START {} (step {}, task {})", run_id, step_id, task_id),
            RenderEvent::TaskComplete {
                run_id,
                task_id,
                success,
                duration_ms,
                error,
            } => {
                let status = match (*success, self.ascii_only) {
                    (true, true) => "OK",
                    (true, false) => "SUCCESS",
                    (false, true) => "FAIL",
                    (false, false) => "FAILED",
                };
                let mut line = format!(
                    "TASK END {} (task {}, status {}, duration {}ms)",
                    run_id, task_id, status, duration_ms
                );
                if let Some(err) = error {
                    line.push_str(&format!(": {}", err));
                }
                line
            }
            RenderEvent::StepEnd { run_id, report } => {
                let mut line = format!(
                    "STEP END {} (step {}, completed {}, failed {}, skipped {})",
                    run_id,
                    report.step_id,
                    report.completed.len(),
                    report.failed.len(),
                    report.skipped.len()
                );
                if !report.skipped.is_empty() {
                    line.push_str(&format!(": skipped {}", report.skipped.join(", ")));
                }
                line
            }
            RenderEvent::RunEnd { run_id, result } => {
                let mut line = format!(
                    "RUN END {} (completed {}/{}, failed {}, duration {}ms)",
                    run_id, result.completed, result.total_tasks, result.failed, result.duration_ms
                );
                if let Some(step) = &result.aborted_at {
                    line.push_str(&format!(", aborted at step {}", step));
                }
                line
            }
        }
    }
}

impl OutputRendererPlugin for TextRendererPlugin {
    fn name(&self) -> &str {
        "text-renderer"
    }

    fn format(&self) -> &str {
        "text"
    }

    fn render(&self, event: &RenderEvent) {
        println!("{}", self.format_event(event));
    }
}
