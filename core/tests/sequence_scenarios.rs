mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use buildseq_core::api::{
    flat_to_staged, BuildError, BuildHandler, BuildNode, BuildSequence, BuildStep,
    ExecutionContext, NodeOutcome, PipelineDefinition, RetryStrategyPlugin, SequenceExecutor,
    TaskState, TaskStatus,
};
use common::{fast_config, registry, FlakyHandler, RecordingHandler};
use pretty_assertions::assert_eq;

fn position(order: &[String], id: &str) -> usize {
    order
        .iter()
        .position(|x| x == id)
        .unwrap_or_else(|| panic!("{id} missing from {order:?}"))
}

fn recorded(id: &str) -> BuildNode {
    BuildNode::new(id).handler("record")
}

#[tokio::test]
async fn setup_then_parallel_pair_then_join() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let handler = RecordingHandler::new("record", &log).delay(Duration::from_millis(5));
    let sequence = BuildSequence::new(
        "scenario-a",
        vec![
            BuildStep::serial("setup", vec![recorded("setup")]),
            BuildStep::parallel(
                "build",
                vec![
                    recorded("a").requires(["setup"]),
                    recorded("b").requires(["setup"]),
                ],
            ),
            BuildStep::serial("join", vec![recorded("c").requires(["a", "b"])]),
        ],
    );

    let ctx = ExecutionContext::new(sequence, registry(vec![Arc::new(handler)]));
    let result = SequenceExecutor::new(fast_config())
        .execute_sequence(&ctx)
        .await
        .unwrap();

    assert!(result.succeeded());
    assert_eq!(result.completed, 4);
    let order = result.executed_order;
    assert_eq!(order.first().map(String::as_str), Some("setup"));
    assert_eq!(order.last().map(String::as_str), Some("c"));
    assert!(position(&order, "a") < position(&order, "c"));
    assert!(position(&order, "b") < position(&order, "c"));
    assert_eq!(log.lock().unwrap().len(), 4);
}

#[tokio::test]
async fn failed_step_aborts_later_steps_without_rollback() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let ok: Arc<dyn BuildHandler> = Arc::new(RecordingHandler::new("record", &log));
    let broken: Arc<dyn BuildHandler> = Arc::new(
        RecordingHandler::new("broken", &log).failing(BuildError::file_write("disk full")),
    );
    let sequence = BuildSequence::new(
        "scenario-abort",
        vec![
            BuildStep::serial("setup", vec![recorded("setup")]),
            BuildStep::parallel(
                "build",
                vec![
                    BuildNode::new("a").handler("broken").requires(["setup"]),
                    recorded("b").requires(["setup"]),
                ],
            ),
            BuildStep::serial("join", vec![recorded("c").requires(["a", "b"])]),
        ],
    );

    let ctx = ExecutionContext::new(sequence, registry(vec![ok, broken]));
    let result = SequenceExecutor::new(fast_config())
        .execute_sequence(&ctx)
        .await
        .unwrap();

    assert!(!result.succeeded());
    assert_eq!(result.aborted_at.as_deref(), Some("build"));
    assert_eq!(result.steps.len(), 2);
    assert_eq!(result.steps[1].failed, vec!["a".to_string()]);
    assert_eq!(ctx.state_of("setup"), TaskState::Completed);
    assert_eq!(ctx.state_of("b"), TaskState::Completed);
    assert_eq!(ctx.state_of("c"), TaskState::Unstarted);
    assert!(!log.lock().unwrap().contains(&"c".to_string()));

    let report = ctx.monitor().report(ctx.run_id()).unwrap();
    let a = report.tasks.iter().find(|t| t.task_id == "a").unwrap();
    assert_eq!(a.status, TaskStatus::Failed);
}

#[tokio::test]
async fn blocked_dependents_are_skipped_inside_a_parallel_step() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let ok: Arc<dyn BuildHandler> = Arc::new(RecordingHandler::new("record", &log));
    let broken: Arc<dyn BuildHandler> = Arc::new(
        RecordingHandler::new("broken", &log).failing(BuildError::invalid_parameter("bad input")),
    );
    let sequence = BuildSequence::new(
        "blocked",
        vec![BuildStep::parallel(
            "only",
            vec![
                BuildNode::new("x").handler("broken"),
                recorded("y").requires(["x"]),
                recorded("z"),
            ],
        )],
    );

    let ctx = ExecutionContext::new(sequence, registry(vec![ok, broken]));
    let result = SequenceExecutor::new(fast_config())
        .execute_sequence(&ctx)
        .await
        .unwrap();

    let step = &result.steps[0];
    assert_eq!(step.failed, vec!["x".to_string()]);
    assert_eq!(step.skipped, vec!["y".to_string()]);
    assert_eq!(step.completed, vec!["z".to_string()]);
    assert_eq!(result.aborted_at.as_deref(), Some("only"));
}

#[tokio::test]
async fn cycle_is_rejected_before_any_handler_runs() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let handler = RecordingHandler::new("record", &log);
    let sequence = BuildSequence::new(
        "cyclic",
        vec![BuildStep::parallel(
            "loop",
            vec![recorded("x").requires(["y"]), recorded("y").requires(["x"])],
        )],
    );

    let ctx = ExecutionContext::new(sequence, registry(vec![Arc::new(handler)]));
    let err = SequenceExecutor::new(fast_config())
        .execute_sequence(&ctx)
        .await
        .unwrap_err();

    assert!(!err.is_retryable());
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn flat_form_runs_like_its_staged_equivalent() {
    let flat: PipelineDefinition = serde_json::from_str(
        r#"{
            "id": "flat",
            "tasks": [
                {"id": "c", "handler": "record", "dependsOn": ["a", "b"]},
                {"id": "a", "handler": "record", "dependsOn": ["setup"]},
                {"id": "setup", "handler": "record"},
                {"id": "b", "handler": "record", "dependsOn": ["setup"]}
            ]
        }"#,
    )
    .unwrap();
    let PipelineDefinition::Flat(flat) = flat else {
        panic!("expected flat form");
    };
    let staged = flat_to_staged(&flat).unwrap();
    assert_eq!(staged.steps.len(), 3);

    let log = Arc::new(Mutex::new(Vec::new()));
    let ctx = ExecutionContext::new(
        staged,
        registry(vec![Arc::new(RecordingHandler::new("record", &log))]),
    );
    let result = SequenceExecutor::new(fast_config())
        .execute_sequence(&ctx)
        .await
        .unwrap();

    assert!(result.succeeded());
    assert_eq!(result.executed_order.first().map(String::as_str), Some("setup"));
    assert_eq!(result.executed_order.last().map(String::as_str), Some("c"));
}

#[tokio::test]
async fn serial_node_waits_then_gives_up_on_unfinished_prerequisite() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sequence = BuildSequence::new(
        "waiting",
        vec![
            BuildStep::serial("first", vec![recorded("late").requires(["early"])]),
            BuildStep::serial("second", vec![recorded("early")]),
        ],
    );
    let ctx = ExecutionContext::new(
        sequence,
        registry(vec![Arc::new(RecordingHandler::new("record", &log))]),
    );
    let executor = SequenceExecutor::new(fast_config());

    assert_eq!(executor.execute_node(&ctx, "late").await, NodeOutcome::NotReady);
    assert_eq!(ctx.state_of("late"), TaskState::Waiting);

    let result = executor.execute_sequence(&ctx).await.unwrap();
    assert_eq!(result.aborted_at.as_deref(), Some("first"));
    assert_eq!(result.steps[0].skipped, vec!["late".to_string()]);
    assert!(log.lock().unwrap().is_empty());
}

struct RetryTwice;

impl RetryStrategyPlugin for RetryTwice {
    fn name(&self) -> &str {
        "retry-twice"
    }

    fn next_delay(&self, _attempt: u32, _error: &BuildError) -> Option<Duration> {
        Some(Duration::from_millis(1))
    }

    fn max_attempts(&self) -> u32 {
        3
    }
}

#[tokio::test]
async fn retry_strategy_reruns_retryable_failures() {
    let flaky = Arc::new(FlakyHandler::new("flaky", 2));
    let sequence = BuildSequence::new(
        "retries",
        vec![BuildStep::serial("only", vec![BuildNode::new("flaky")])],
    );
    let handler: Arc<dyn BuildHandler> = flaky.clone();
    let ctx = ExecutionContext::new(sequence, registry(vec![handler]));
    let executor = SequenceExecutor::builder(fast_config())
        .retry_strategy(Arc::new(RetryTwice))
        .build();

    let result = executor.execute_sequence(&ctx).await.unwrap();

    assert!(result.succeeded());
    assert_eq!(flaky.calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    let metrics = ctx.monitor().task(ctx.run_id(), "flaky").unwrap();
    assert_eq!(metrics.retry_count, 2);
    assert_eq!(metrics.status, TaskStatus::Completed);
}

#[tokio::test]
async fn retry_strategy_gives_up_after_max_attempts() {
    let flaky = Arc::new(FlakyHandler::new("flaky", 10));
    let sequence = BuildSequence::new(
        "retries",
        vec![BuildStep::serial("only", vec![BuildNode::new("flaky")])],
    );
    let handler: Arc<dyn BuildHandler> = flaky.clone();
    let ctx = ExecutionContext::new(sequence, registry(vec![handler]));
    let executor = SequenceExecutor::builder(fast_config())
        .retry_strategy(Arc::new(RetryTwice))
        .build();

    let result = executor.execute_sequence(&ctx).await.unwrap();

    assert_eq!(result.failed, 1);
    assert_eq!(flaky.calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    assert_eq!(ctx.state_of("flaky"), TaskState::Failed);
}

#[tokio::test]
async fn serial_step_stops_at_first_failure() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let ok: Arc<dyn BuildHandler> = Arc::new(RecordingHandler::new("record", &log));
    let broken: Arc<dyn BuildHandler> = Arc::new(
        RecordingHandler::new("broken", &log).failing(BuildError::file_write("disk full")),
    );
    let sequence = BuildSequence::new(
        "serial-failure",
        vec![BuildStep::serial(
            "only",
            vec![BuildNode::new("x").handler("broken"), recorded("y")],
        )],
    );

    let ctx = ExecutionContext::new(sequence, registry(vec![ok, broken]));
    let result = SequenceExecutor::new(fast_config())
        .execute_sequence(&ctx)
        .await
        .unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["x".to_string()]);
    assert_eq!(result.aborted_at.as_deref(), Some("only"));
    assert_eq!(result.steps[0].failed, vec!["x".to_string()]);
    assert_eq!(result.steps[0].skipped, vec!["y".to_string()]);
    assert_eq!(ctx.state_of("y"), TaskState::Unstarted);
}

#[tokio::test]
async fn success_rate_counts_tasks_that_never_started() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let ok: Arc<dyn BuildHandler> = Arc::new(RecordingHandler::new("record", &log));
    let broken: Arc<dyn BuildHandler> = Arc::new(
        RecordingHandler::new("broken", &log).failing(BuildError::file_write("disk full")),
    );
    let sequence = BuildSequence::new(
        "three-stages",
        vec![
            BuildStep::serial("first", vec![recorded("a")]),
            BuildStep::serial("second", vec![BuildNode::new("b").handler("broken")]),
            BuildStep::serial("third", vec![recorded("c")]),
        ],
    );

    let ctx = ExecutionContext::new(sequence, registry(vec![ok, broken]));
    let result = SequenceExecutor::new(fast_config())
        .execute_sequence(&ctx)
        .await
        .unwrap();
    assert_eq!(result.aborted_at.as_deref(), Some("second"));

    let report = ctx.monitor().report(ctx.run_id()).unwrap();
    assert_eq!(report.total_tasks, 3);
    assert_eq!(report.completed_tasks, 1);
    assert_eq!(report.failed_tasks, 1);
    assert_eq!(report.tasks.len(), 2);
    assert!((report.success_rate - 100.0 / 3.0).abs() < 1e-9);
    let text = ctx.monitor().text_report(ctx.run_id()).unwrap();
    assert!(text.contains("3 total, 1 completed, 1 failed (33.3% success)"));
}
