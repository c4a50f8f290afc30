use std::fmt::Write as _;

use buildseq_core::api::{BuildError, ExecutionPlan};

use super::cli::PlanArgs;
use crate::error::CliError;

pub fn handle_plan(args: &PlanArgs) -> Result<i32, CliError> {
    let sequence = super::load_sequence(&args.pipeline)?;
    let plan = ExecutionPlan::build(&sequence).map_err(BuildError::from)?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&plan).map_err(anyhow::Error::from)?
        );
    } else {
        print!("{}", render_plan(&plan));
    }
    Ok(0)
}

pub fn render_plan(plan: &ExecutionPlan) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "sequence {}", plan.sequence_id);
    for (index, step) in plan.steps.iter().enumerate() {
        let mode = if step.parallel { "parallel" } else { "serial" };
        let _ = writeln!(
            out,
            "  step {} {} ({mode}): {}",
            index + 1,
            step.id,
            step.tasks.join(", ")
        );
    }
    let _ = writeln!(out, "dependency layers");
    for (index, layer) in plan.layers.iter().enumerate() {
        let _ = writeln!(out, "  {}: {}", index + 1, layer.join(", "));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn flat_pipeline_is_printed_as_layered_steps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.json");
        std::fs::write(
            &path,
            r#"{"id": "app", "tasks": [
                {"id": "setup", "handler": "project-setup"},
                {"id": "a", "dependsOn": ["setup"]},
                {"id": "b", "dependsOn": ["setup"]}
            ]}"#,
        )
        .unwrap();

        let sequence = super::super::load_sequence(&path).unwrap();
        let plan = ExecutionPlan::build(&sequence).unwrap();

        assert_eq!(
            render_plan(&plan),
            "sequence app\n\
             \x20 step 1 layer-1 (parallel): setup\n\
             \x20 step 2 layer-2 (parallel): a, b\n\
             dependency layers\n\
             \x20 1: setup\n\
             \x20 2: a, b\n"
        );
    }

    #[test]
    fn cyclic_pipeline_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.json");
        std::fs::write(
            &path,
            r#"{"id": "app", "steps": [{"id": "s", "nodes": [
                {"id": "a", "requires": ["b"]},
                {"id": "b", "requires": ["a"]}
            ]}]}"#,
        )
        .unwrap();

        let err = handle_plan(&PlanArgs {
            pipeline: path,
            json: false,
        })
        .unwrap_err();
        assert_eq!(err.exit_code(), 12);
    }
}
