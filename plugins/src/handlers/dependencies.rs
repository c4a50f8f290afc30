use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use buildseq_core::api::{
    ArtifactGraph, BuildError, BuildHandler, BuildResult, DependencyGraphSpec, ExecutionContext,
    GenerationRequest, HandlerInput, Message, VirtualDirectory,
};

use super::{
    documents, project_brief, render_documents, HandlerServices, FILE_DEPENDENCIES,
    FILE_STRUCTURE,
};

const DEPENDENCIES_TAG: &str = "dependencies";

const DEPENDENCIES_SYSTEM: &str = "You map imports between the files of a software project. \
For every declared file list the declared files it imports. Use paths relative to the importing \
file, or starting with / for the project root. \
Reply with <dependencies>{\"files\": {\"path\": {\"dependsOn\": [\"path\", ...]}}}</dependencies>.";

/// Produces the validated artifact graph.
///
/// The manifest comes from a prerequisite, or else from the first completed
/// `file-structure` task. Declared files the reply leaves out get no
/// dependencies. Undeclared references and cycles fail the task before any
/// artifact is written.
pub struct FileDependenciesHandler {
    services: Arc<HandlerServices>,
}

impl FileDependenciesHandler {
    pub fn new(services: Arc<HandlerServices>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl BuildHandler for FileDependenciesHandler {
    fn id(&self) -> &str {
        FILE_DEPENDENCIES
    }

    async fn handle(
        &self,
        ctx: &ExecutionContext,
        input: HandlerInput<'_>,
    ) -> Result<BuildResult, BuildError> {
        let node = input.node;
        let manifest = input
            .find_dependency::<VirtualDirectory>()
            .or_else(|| ctx.get_data_by_handler::<VirtualDirectory>(FILE_STRUCTURE))
            .ok_or_else(|| BuildError::missing_result(FILE_STRUCTURE))?;
        let policy = self.services.policy(ctx)?;

        let mut user = render_documents(&documents(ctx));
        let _ = writeln!(user, "Declared files:");
        for path in manifest.paths() {
            let _ = writeln!(user, "- {path}");
        }
        if let Some(prompt) = node.option_str("prompt") {
            user.push_str(prompt);
        }

        let generation = self.services.metered(ctx, node);
        let request = GenerationRequest::new(
            generation.model(),
            vec![
                Message::system(format!("{DEPENDENCIES_SYSTEM}\n\n{}", project_brief(ctx))),
                Message::user(user),
            ],
        );
        let mut spec: DependencyGraphSpec = generation
            .generate_json(&node.id, &request, DEPENDENCIES_TAG)
            .await?;
        for path in manifest.paths() {
            spec.files.entry(path.clone()).or_default();
        }

        let graph = ArtifactGraph::build(&spec, &manifest, &policy)?;
        tracing::info!(
            task_id = %node.id,
            files = graph.len(),
            layers = graph.layers().len(),
            "dependency graph validated"
        );
        Ok(BuildResult::ok(graph))
    }
}
