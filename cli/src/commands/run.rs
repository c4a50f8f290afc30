use buildseq_core::api::{AppConfig, ExecutionContext, ExecutionResult, SequenceExecutor};
use buildseq_plugins::factory;

use super::cli::{OutputFormat, RunArgs};
use crate::error::CliError;

/// Apply `run` flags on top of the loaded config.
pub fn apply_overrides(cfg: &mut AppConfig, args: &RunArgs) {
    if let Some(root) = &args.output_root {
        cfg.project.output_root = root.clone();
    }
    if let Some(model) = &args.model {
        cfg.generation.model = model.clone();
    }
    if let Some(n) = args.max_concurrency {
        cfg.executor.max_concurrency = n.max(1);
    }
    if args.fail_fast {
        cfg.executor.fail_fast = true;
    }
    if args.progress && args.format == OutputFormat::Text {
        cfg.executor.progress_bar = true;
    }
}

/// Execute the pipeline and print the monitor report.
///
/// Exit status is 0 when every task completed, 1 otherwise.
#[tracing::instrument(name = "cli.run", skip_all, fields(pipeline = %args.pipeline.display()))]
pub async fn handle_run(mut cfg: AppConfig, args: RunArgs) -> Result<i32, CliError> {
    apply_overrides(&mut cfg, &args);
    let sequence = super::load_sequence(&args.pipeline)?;

    let services = factory::build_services(&cfg)?;
    let registry = factory::build_registry(services);
    let run_id = args
        .run_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let ctx = ExecutionContext::new(sequence, registry).with_run_id(run_id.clone());

    let mut builder = SequenceExecutor::builder(cfg.executor.clone());
    if let Some(strategy) = factory::build_retry_strategy(cfg.retry.as_ref())? {
        builder = builder.retry_strategy(strategy);
    }
    if let Some(renderer) = factory::build_renderer(args.format.as_str(), args.ascii) {
        builder = builder.renderer(renderer);
    }
    let executor = builder.build();

    tracing::info!(run_id = %run_id, output_root = %cfg.project.output_root, "run started");
    let result = executor.execute_sequence(&ctx).await?;
    print_report(&ctx, &result, args.format)?;

    Ok(if result.succeeded() { 0 } else { 1 })
}

fn print_report(
    ctx: &ExecutionContext,
    result: &ExecutionResult,
    format: OutputFormat,
) -> Result<(), CliError> {
    let monitor = ctx.monitor();
    match format {
        OutputFormat::Text => {
            if let Some(text) = monitor.text_report(ctx.run_id()) {
                println!("{text}");
            }
            if let Some(step) = &result.aborted_at {
                println!("aborted at step '{step}'");
            }
        }
        OutputFormat::Jsonl => {
            if let Some(report) = monitor.report(ctx.run_id()) {
                let line = serde_json::json!({"type": "run.report", "report": report});
                println!("{}", serde_json::to_string(&line).map_err(anyhow::Error::from)?);
            }
        }
        OutputFormat::Off => {}
    }
    Ok(())
}
