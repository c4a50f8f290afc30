use buildseq_core::api::{OutputRendererPlugin, RenderEvent};
use chrono::Local;
use serde_json::{json, Value};

pub struct JsonlRendererPlugin {
    pretty_print: bool,
}

impl JsonlRendererPlugin {
    pub fn new(pretty_print: bool) -> Self {
        Self { pretty_print }
    }

    fn event_to_json(&self, event: &RenderEvent) -> Value {
        let ts = Local::now().to_rfc3339();
        match event {
            RenderEvent::RunStart {
                run_id,
                sequence_id,
                total_tasks,
                total_steps,
            } => json!({
                "v": 1,
                "event_type": "run.start",
                "ts": ts,
                "run_id": run_id,
                "metadata": {
                    "sequence_id": sequence_id,
                    "total_tasks": total_tasks,
                    "total_steps": total_steps,
                }
            }),
            RenderEvent::Plan { run_id, steps } => {
                let total_tasks: usize = steps.iter().map(|(_, _, tasks)| tasks.len()).sum();
                let steps: Vec<Value> = steps
                    .iter()
                    .map(|(id, parallel, tasks)| {
                        json!({ "step_id": id, "parallel": parallel, "tasks": tasks })
                    })
                    .collect();
                json!({
                    "v": 1,
                    "event_type": "executor.plan",
                    "ts": ts,
                    "run_id": run_id,
                    "metadata": {
                        "steps": steps,
                        "total_tasks": total_tasks,
                    }
                })
            }
            RenderEvent::StepStart {
                run_id,
                step_id,
                parallel,
                task_ids,
            } => json!({
                "v": 1,
                "event_type": "step.start",
                "ts": ts,
                "run_id": run_id,
                "metadata": {
                    "step_id": step_id,
                    "parallel": parallel,
                    "tasks": task_ids,
                }
            }),
            RenderEvent::TaskStart {
                run_id,
                task_id,
                step_id,
            } => json!({
                "v": 1,
                "event_type": "task.start",
                "ts": ts,
                "run_id": run_id,
                "task_id": task_id,
                "metadata": {
                    "step_id": step_id,
                }
            }),
            RenderEvent::TaskComplete {
                run_id,
                task_id,
                success,
                duration_ms,
                error,
            } => json!({
                "v": 1,
                "event_type": "task.end",
                "ts": ts,
                "run_id": run_id,
                "task_id": task_id,
                "metadata": {
                    "duration_ms": duration_ms,
                    "success": success,
                    "error": error,
                }
            }),
            RenderEvent::StepEnd { run_id, report } => json!({
                "v": 1,
                "event_type": "step.end",
                "ts": ts,
                "run_id": run_id,
                "metadata": report,
            }),
            RenderEvent::RunEnd { run_id, result } => json!({
                "v": 1,
                "event_type": "run.end",
                "ts": ts,
                "run_id": run_id,
                "metadata": {
                    "sequence_id": result.sequence_id,
                    "total_tasks": result.total_tasks,
                    "completed": result.completed,
                    "failed": result.failed,
                    "duration_ms": result.duration_ms,
                    "executed_order": result.executed_order,
                    "aborted_at": result.aborted_at,
                }
            }),
        }
    }
}

impl OutputRendererPlugin for JsonlRendererPlugin {
    fn name(&self) -> &str {
        "jsonl-renderer"
    }

    fn format(&self) -> &str {
        "jsonl"
    }

    fn render(&self, event: &RenderEvent) {
        let value = self.event_to_json(event);
        if self.pretty_print {
            println!("{}", serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".into()));
        } else {
            println!("{}", serde_json::to_string(&value).unwrap_or_else(|_| "{}".into()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildseq_core::api::{ExecutionResult, StepReport};

    #[test]
    fn test_jsonl_renderer_event_type() {
        let renderer = JsonlRendererPlugin::new(false);
        let event = RenderEvent::RunStart {
            run_id: "run".to_string(),
            sequence_id: "app".to_string(),
            total_tasks: 2,
            total_steps: 1,
        };

        let value = renderer.event_to_json(&event);
        assert_eq!(value["event_type"], "run.start");
        assert_eq!(value["metadata"]["sequence_id"], "app");
    }

    #[test]
    fn test_jsonl_renderer_plan_counts_tasks() {
        let renderer = JsonlRendererPlugin::new(false);
        let event = RenderEvent::Plan {
            run_id: "run".to_string(),
            steps: vec![
                ("setup".to_string(), false, vec!["setup".to_string()]),
                (
                    "build".to_string(),
                    true,
                    vec!["a".to_string(), "b".to_string()],
                ),
            ],
        };

        let value = renderer.event_to_json(&event);
        assert_eq!(value["metadata"]["total_tasks"], 3);
        assert_eq!(value["metadata"]["steps"][1]["parallel"], true);
    }

    #[test]
    fn test_jsonl_renderer_step_end_serializes_report() {
        let renderer = JsonlRendererPlugin::new(false);
        let event = RenderEvent::StepEnd {
            run_id: "run".to_string(),
            report: StepReport {
                step_id: "build".to_string(),
                parallel: true,
                completed: vec!["a".to_string()],
                failed: Vec::new(),
                skipped: vec!["b".to_string()],
            },
        };

        let value = renderer.event_to_json(&event);
        assert_eq!(value["event_type"], "step.end");
        assert_eq!(value["metadata"]["skipped"][0], "b");
    }

    #[test]
    fn test_jsonl_renderer_run_end() {
        let renderer = JsonlRendererPlugin::new(false);
        let event = RenderEvent::RunEnd {
            run_id: "run".to_string(),
            result: ExecutionResult {
                total_tasks: 3,
                completed: 3,
                executed_order: vec!["a".into(), "b".into(), "c".into()],
                ..ExecutionResult::default()
            },
        };

        let value = renderer.event_to_json(&event);
        assert_eq!(value["metadata"]["total_tasks"], 3);
        assert_eq!(value["metadata"]["executed_order"][2], "c");
        assert!(value["metadata"]["aborted_at"].is_null());
    }
}
