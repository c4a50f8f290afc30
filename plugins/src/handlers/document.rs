use std::sync::Arc;

use async_trait::async_trait;
use buildseq_core::api::{
    BuildError, BuildHandler, BuildResult, ExecutionContext, GenerationRequest, HandlerInput,
    Message,
};

use super::{
    project_brief, render_documents, GeneratedDocument, HandlerServices, DOCUMENT,
};

const DOCUMENT_SYSTEM: &str = "You write one design document for a software project. \
Use the earlier documents you are given as ground truth and stay consistent with them.";

/// Generates one tagged document from a prompt.
///
/// Options: `prompt` (required), `tag` (default `document`), `output`
/// (optional file, relative to the output root), `model`. The documents of
/// the task's prerequisites are included as context.
pub struct DocumentHandler {
    services: Arc<HandlerServices>,
}

impl DocumentHandler {
    pub fn new(services: Arc<HandlerServices>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl BuildHandler for DocumentHandler {
    fn id(&self) -> &str {
        DOCUMENT
    }

    async fn handle(
        &self,
        ctx: &ExecutionContext,
        input: HandlerInput<'_>,
    ) -> Result<BuildResult, BuildError> {
        let node = input.node;
        let prompt = node.option_str("prompt").ok_or_else(|| {
            BuildError::missing_config(format!("task '{}' needs a 'prompt' option", node.id))
        })?;
        let tag = node.option_str("tag").unwrap_or("document");

        let upstream: Vec<Arc<GeneratedDocument>> = node
            .requires
            .iter()
            .filter_map(|id| input.dependency::<GeneratedDocument>(id))
            .collect();

        let system = format!(
            "{DOCUMENT_SYSTEM}\n\n{}\nWrap the whole document in <{tag}>...</{tag}>.",
            project_brief(ctx)
        );
        let user = if upstream.is_empty() {
            prompt.to_string()
        } else {
            format!("{}\n{prompt}", render_documents(&upstream))
        };

        let generation = self.services.metered(ctx, node);
        let request = GenerationRequest::new(
            generation.model(),
            vec![Message::system(system), Message::user(user)],
        );
        let content = generation.generate_tagged(&node.id, &request, tag).await?;
        let content = content.trim().to_string();

        let path = match node.option_str("output") {
            Some(output) => {
                let policy = self.services.policy(ctx)?;
                let rel = policy.check(output)?;
                let abs = policy.absolute(&rel)?;
                if let Some(parent) = abs.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| BuildError::file_write(format!("{}: {e}", parent.display())))?;
                }
                tokio::fs::write(&abs, &content)
                    .await
                    .map_err(|e| BuildError::file_write(format!("{}: {e}", abs.display())))?;
                Some(rel)
            }
            None => None,
        };

        tracing::info!(task_id = %node.id, tag, chars = content.len(), path = ?path, "document generated");
        Ok(BuildResult::ok(GeneratedDocument {
            task_id: node.id.clone(),
            tag: tag.to_string(),
            content,
            path,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::{AcceptAll, KeyedGeneration};
    use buildseq_core::api::{
        keys, AppConfig, BuildNode, BuildSequence, BuildStep, ErrorCode, HandlerRegistry,
    };
    use serde_json::json;

    fn context(generation: Arc<KeyedGeneration>, nodes: Vec<BuildNode>) -> ExecutionContext {
        let services = Arc::new(HandlerServices::new(
            generation,
            Arc::new(AcceptAll),
            AppConfig::default(),
        ));
        let registry = Arc::new(HandlerRegistry::new(vec![Arc::new(DocumentHandler::new(
            services,
        ))]));
        ExecutionContext::new(
            BuildSequence::new("docs", vec![BuildStep::serial("s", nodes)]),
            registry,
        )
    }

    #[tokio::test]
    async fn writes_tagged_payload_and_feeds_downstream() {
        let dir = tempfile::tempdir().unwrap();
        let generation = Arc::new(KeyedGeneration::new(vec![
            ("list the requirements", "<requirements>R1 users</requirements>".to_string()),
            ("design the schema", "<schema>CREATE TABLE users();</schema>".to_string()),
        ]));
        let ctx = context(
            generation.clone(),
            vec![
                BuildNode::new("requirements").handler(DOCUMENT).options(json!({
                    "prompt": "list the requirements",
                    "tag": "requirements",
                    "output": "docs/requirements.md",
                })),
                BuildNode::new("schema")
                    .handler(DOCUMENT)
                    .requires(["requirements"])
                    .options(json!({"prompt": "design the schema", "tag": "schema"})),
            ],
        );
        ctx.globals()
            .set(keys::OUTPUT_ROOT, dir.path().to_string_lossy())
            .unwrap();

        ctx.run("requirements", ctx.dependency_results("requirements"))
            .await
            .unwrap();
        let result = ctx
            .run("schema", ctx.dependency_results("schema"))
            .await
            .unwrap();

        let doc = result.data::<GeneratedDocument>().unwrap();
        assert_eq!(doc.content, "CREATE TABLE users();");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("docs/requirements.md")).unwrap(),
            "R1 users"
        );
        let requests = generation.requests.lock().unwrap();
        assert!(requests[1].messages[1].content.contains("R1 users"));
    }

    #[tokio::test]
    async fn missing_prompt_fails_the_task() {
        let ctx = context(
            Arc::new(KeyedGeneration::default()),
            vec![BuildNode::new("doc").handler(DOCUMENT)],
        );
        let err = ctx.run("doc", Default::default()).await.unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::ConfigMissing);
    }
}
