use std::sync::Arc;

use async_trait::async_trait;
use buildseq_core::api::{
    BuildError, BuildHandler, BuildResult, DeclaredOutput, ExecutionContext, GenerationRequest,
    HandlerInput, Message, VirtualDirectory,
};

use super::{
    documents, option_list, project_brief, render_documents, HandlerServices, FILE_STRUCTURE,
};

const STRUCTURE_TAG: &str = "structure";

const STRUCTURE_SYSTEM: &str = "You plan the source tree of a software project. \
List every file that must be generated, as paths relative to the project root. \
Reply with <structure>{\"Paths\": [\"relative/path\", ...]}</structure> and nothing else.";

/// Produces the declared-file manifest for the artifact stages.
///
/// Every declared path must pass the path policy. Options `framework_files`
/// (paths that always exist) are merged in, and `prompt` adds instructions.
pub struct FileStructureHandler {
    services: Arc<HandlerServices>,
}

impl FileStructureHandler {
    pub fn new(services: Arc<HandlerServices>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl BuildHandler for FileStructureHandler {
    fn id(&self) -> &str {
        FILE_STRUCTURE
    }

    async fn handle(
        &self,
        ctx: &ExecutionContext,
        input: HandlerInput<'_>,
    ) -> Result<BuildResult, BuildError> {
        let node = input.node;
        let policy = self.services.policy(ctx)?;

        let mut user = render_documents(&documents(ctx));
        if let Some(prompt) = node.option_str("prompt") {
            user.push_str(prompt);
        } else {
            user.push_str("Declare the files of this project.");
        }

        let generation = self.services.metered(ctx, node);
        let request = GenerationRequest::new(
            generation.model(),
            vec![
                Message::system(format!("{STRUCTURE_SYSTEM}\n\n{}", project_brief(ctx))),
                Message::user(user),
            ],
        );
        let declared: DeclaredOutput = generation
            .generate_json(&node.id, &request, STRUCTURE_TAG)
            .await?;

        if declared.paths.is_empty() {
            return Err(BuildError::response_parsing("structure declares no paths"));
        }
        for path in &declared.paths {
            policy.check(path)?;
        }

        let mut manifest = VirtualDirectory::from_declared(&declared);
        manifest.merge_framework(option_list(node, "framework_files"));

        tracing::info!(task_id = %node.id, files = manifest.len(), "file structure declared");
        Ok(BuildResult::ok(manifest))
    }
}
