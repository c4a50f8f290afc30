use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use buildseq_core::api::{
    execute_batch_parallel, ArtifactGraph, BuildError, BuildHandler, BuildResult,
    ExecutionContext, FileTask, FixLoop, GenerationRequest, HandlerInput, Message,
    MeteredGeneration, PathPolicy,
};

use super::{
    documents, project_brief, render_documents, ArtifactReport, HandlerServices,
    FILE_DEPENDENCIES, GENERATE_ARTIFACTS,
};

const FILE_TAG: &str = "file";

const ARTIFACT_SYSTEM: &str = "You write one source file of a software project. \
Only import the declared dependencies you are given. \
Reply with the complete file content inside <file>...</file>.";

/// Generates every file of the artifact graph, one concurrency layer at a
/// time, and runs each layer through the fix loop.
///
/// Files of a layer are generated concurrently, then verified and repaired.
/// Already-written dependency files are shown to the generation service. An
/// abandoned artifact is reported but does not stop later layers unless
/// `fix_loop.fail_fast` is set.
pub struct GenerateArtifactsHandler {
    services: Arc<HandlerServices>,
}

impl GenerateArtifactsHandler {
    pub fn new(services: Arc<HandlerServices>) -> Self {
        Self { services }
    }

    async fn generate_file(
        &self,
        generation: &MeteredGeneration,
        policy: &PathPolicy,
        graph: &ArtifactGraph,
        path: &str,
        shared_context: &str,
        brief: &str,
    ) -> Result<FileTask, BuildError> {
        let deps = graph.dependencies_of(path);

        let mut user = String::from(shared_context);
        let _ = writeln!(user, "File: {path}");
        if deps.is_empty() {
            let _ = writeln!(user, "Declared dependencies: none");
        } else {
            let _ = writeln!(user, "Declared dependencies:");
            for dep in deps {
                match read_existing(policy, dep).await {
                    Some(content) => {
                        let _ = writeln!(user, "<dependency path=\"{dep}\">\n{content}\n</dependency>");
                    }
                    None => {
                        let _ = writeln!(user, "- {dep}");
                    }
                }
            }
        }

        let request = GenerationRequest::new(
            generation.model(),
            vec![
                Message::system(format!("{ARTIFACT_SYSTEM}\n\n{brief}")),
                Message::user(user),
            ],
        );
        let key = FixLoop::task_key(path);
        let monitor = generation.monitor();
        monitor.start_artifact(generation.pipeline_id(), &key);
        let content = match generation.generate_tagged(&key, &request, FILE_TAG).await {
            Ok(content) => content,
            Err(e) => {
                monitor.end_task(generation.pipeline_id(), &key, false, Some(&e.to_string()));
                return Err(e);
            }
        };

        Ok(FileTask::new(path, strip_outer_newlines(&content)).with_dependencies(deps.to_vec()))
    }
}

async fn read_existing(policy: &PathPolicy, path: &str) -> Option<String> {
    let abs = policy.absolute(path).ok()?;
    tokio::fs::read_to_string(abs).await.ok()
}

fn strip_outer_newlines(content: &str) -> String {
    content.trim_matches(|c| c == '\n' || c == '\r').to_string()
}

#[async_trait]
impl BuildHandler for GenerateArtifactsHandler {
    fn id(&self) -> &str {
        GENERATE_ARTIFACTS
    }

    async fn handle(
        &self,
        ctx: &ExecutionContext,
        input: HandlerInput<'_>,
    ) -> Result<BuildResult, BuildError> {
        let node = input.node;
        let graph = input
            .find_dependency::<ArtifactGraph>()
            .or_else(|| ctx.get_data_by_handler::<ArtifactGraph>(FILE_DEPENDENCIES))
            .ok_or_else(|| BuildError::missing_result(FILE_DEPENDENCIES))?;

        let policy = Arc::new(self.services.policy(ctx)?);
        let generation = self.services.metered(ctx, node);
        let fix_loop = FixLoop::new(
            generation.clone(),
            Arc::clone(&self.services.verifier),
            Arc::clone(&policy),
            self.services.config.fix_loop.clone(),
        );
        fix_loop.reserve(graph.layers().iter().flatten().map(String::as_str));
        let max_concurrency = self.services.config.executor.max_concurrency;
        let shared_context = render_documents(&documents(ctx));
        let brief = project_brief(ctx);

        let mut report = ArtifactReport::default();
        for (index, layer) in graph.layers().iter().enumerate() {
            tracing::info!(task_id = %node.id, layer = index, files = layer.len(), "generating layer");

            let generated = execute_batch_parallel(layer, max_concurrency, |path| {
                let generation = &generation;
                let policy = &*policy;
                let graph = &*graph;
                let shared_context = shared_context.as_str();
                let brief = brief.as_str();
                async move {
                    self.generate_file(generation, policy, graph, &path, shared_context, brief)
                        .await
                }
            })
            .await;

            let mut by_path: HashMap<String, Result<FileTask, BuildError>> =
                generated.into_iter().collect();
            let mut tasks = Vec::with_capacity(layer.len());
            for path in layer {
                match by_path.remove(path) {
                    Some(Ok(task)) => tasks.push(task),
                    Some(Err(e)) => return Err(e),
                    None => {
                        return Err(BuildError::invalid_parameter(format!(
                            "{path} was not generated"
                        )))
                    }
                }
            }

            let outcomes = fix_loop.run_layer(tasks, max_concurrency).await?;
            for outcome in outcomes {
                if outcome.is_verified() {
                    report.verified += 1;
                } else {
                    report.abandoned += 1;
                    tracing::warn!(
                        path = %outcome.path,
                        retry_count = outcome.retry_count,
                        error = ?outcome.last_error,
                        "artifact abandoned"
                    );
                }
                report.outcomes.push(outcome);
            }
        }

        tracing::info!(
            task_id = %node.id,
            verified = report.verified,
            abandoned = report.abandoned,
            "artifacts generated"
        );
        Ok(BuildResult::ok(report))
    }
}
