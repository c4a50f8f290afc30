use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use buildseq_core::api::{
    keys, BuildError, BuildHandler, BuildResult, ExecutionContext, HandlerInput,
};

use super::{HandlerServices, ProjectSetup, PROJECT_SETUP};

/// Seeds the global context and creates the output root.
///
/// Options `name`, `database_kind`, `output_root` and `description` override
/// the `[project]` config section.
pub struct ProjectSetupHandler {
    services: Arc<HandlerServices>,
}

impl ProjectSetupHandler {
    pub fn new(services: Arc<HandlerServices>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl BuildHandler for ProjectSetupHandler {
    fn id(&self) -> &str {
        PROJECT_SETUP
    }

    async fn handle(
        &self,
        ctx: &ExecutionContext,
        input: HandlerInput<'_>,
    ) -> Result<BuildResult, BuildError> {
        let node = input.node;
        let project = &self.services.config.project;

        let name = node.option_str("name").unwrap_or(&project.name).to_string();
        if name.trim().is_empty() {
            return Err(BuildError::missing_config("project name is empty"));
        }
        let database_kind = node
            .option_str("database_kind")
            .unwrap_or(&project.database_kind)
            .to_string();
        let output_root = node
            .option_str("output_root")
            .unwrap_or(&project.output_root)
            .to_string();
        let description = node.option_str("description").map(str::to_string);

        let globals = ctx.globals();
        globals.set(keys::PROJECT_NAME, &name)?;
        globals.set(keys::DATABASE_KIND, &database_kind)?;
        globals.set(keys::OUTPUT_ROOT, &output_root)?;
        if let Some(description) = &description {
            globals.set(keys::PROJECT_DESCRIPTION, description)?;
        }

        tokio::fs::create_dir_all(&output_root)
            .await
            .map_err(|e| BuildError::file_write(format!("{output_root}: {e}")))?;

        tracing::info!(
            task_id = %node.id,
            project = %name,
            database = %database_kind,
            output_root = %output_root,
            "project set up"
        );
        Ok(BuildResult::ok(ProjectSetup {
            name,
            database_kind,
            output_root: PathBuf::from(output_root),
            description,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::testing::{AcceptAll, KeyedGeneration};
    use buildseq_core::api::{AppConfig, BuildNode, BuildSequence, BuildStep, HandlerRegistry};
    use serde_json::json;

    #[tokio::test]
    async fn options_override_config_and_root_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("out/app");
        let services = Arc::new(HandlerServices::new(
            Arc::new(KeyedGeneration::default()),
            Arc::new(AcceptAll),
            AppConfig::default(),
        ));
        let node = BuildNode::new("setup").handler(PROJECT_SETUP).options(json!({
            "name": "shop",
            "output_root": root.to_string_lossy(),
        }));
        let sequence = BuildSequence::new("p", vec![BuildStep::serial("s", vec![node])]);
        let registry = Arc::new(HandlerRegistry::new(vec![Arc::new(
            ProjectSetupHandler::new(services),
        )]));
        let ctx = ExecutionContext::new(sequence, registry);

        let result = ctx.run("setup", Default::default()).await.unwrap();
        let setup = result.data::<ProjectSetup>().unwrap();

        assert_eq!(setup.name, "shop");
        assert_eq!(setup.database_kind, "postgres");
        assert!(root.is_dir());
        assert_eq!(ctx.globals().get_str(keys::PROJECT_NAME).as_deref(), Some("shop"));
        assert_eq!(
            ctx.globals().get_str(keys::OUTPUT_ROOT),
            Some(root.to_string_lossy().into_owned())
        );
    }
}
