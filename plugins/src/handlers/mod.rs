//! Built-in handlers the registry is pre-populated with.
//!
//! ```text
//! project-setup → document* → file-structure → file-dependencies → generate-artifacts
//! ```
//!
//! Handlers publish typed payloads ([`ProjectSetup`], [`GeneratedDocument`],
//! `VirtualDirectory`, `ArtifactGraph`, [`ArtifactReport`]) that later
//! handlers read back from their prerequisites or, failing that, from the
//! first completed task bound to the producing handler.

mod artifacts;
mod dependencies;
mod document;
mod setup;
mod structure;

use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use buildseq_core::api::{
    keys, AppConfig, BuildError, BuildNode, ExecutionContext, FixOutcome, GenerationService,
    MeteredGeneration, PathPolicy, Verifier,
};
use serde::Serialize;

pub use artifacts::GenerateArtifactsHandler;
pub use dependencies::FileDependenciesHandler;
pub use document::DocumentHandler;
pub use setup::ProjectSetupHandler;
pub use structure::FileStructureHandler;

pub const PROJECT_SETUP: &str = "project-setup";
pub const DOCUMENT: &str = "document";
pub const FILE_STRUCTURE: &str = "file-structure";
pub const FILE_DEPENDENCIES: &str = "file-dependencies";
pub const GENERATE_ARTIFACTS: &str = "generate-artifacts";

/// Collaborators and settings shared by every built-in handler.
pub struct HandlerServices {
    pub generation: Arc<dyn GenerationService>,
    pub verifier: Arc<dyn Verifier>,
    pub config: AppConfig,
}

impl HandlerServices {
    pub fn new(
        generation: Arc<dyn GenerationService>,
        verifier: Arc<dyn Verifier>,
        config: AppConfig,
    ) -> Self {
        Self {
            generation,
            verifier,
            config,
        }
    }

    /// Generation bound to this run's monitor. A node's `model` option
    /// overrides the configured model.
    pub(crate) fn metered(&self, ctx: &ExecutionContext, node: &BuildNode) -> MeteredGeneration {
        let model = node
            .option_str("model")
            .unwrap_or(&self.config.generation.model);
        MeteredGeneration::new(
            Arc::clone(&self.generation),
            Arc::clone(ctx.monitor()),
            ctx.run_id(),
            model,
        )
    }

    pub(crate) fn output_root(&self, ctx: &ExecutionContext) -> PathBuf {
        ctx.globals()
            .get_str(keys::OUTPUT_ROOT)
            .unwrap_or_else(|| self.config.project.output_root.clone())
            .into()
    }

    pub(crate) fn policy(&self, ctx: &ExecutionContext) -> Result<PathPolicy, BuildError> {
        PathPolicy::new(self.output_root(ctx), &self.config.paths)
    }
}

/// Published by `project-setup`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectSetup {
    pub name: String,
    pub database_kind: String,
    pub output_root: PathBuf,
    pub description: Option<String>,
}

/// Published by `document`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedDocument {
    pub task_id: String,
    pub tag: String,
    pub content: String,
    /// Written copy, relative to the output root.
    pub path: Option<String>,
}

/// Published by `generate-artifacts`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArtifactReport {
    pub outcomes: Vec<FixOutcome>,
    pub verified: usize,
    pub abandoned: usize,
}

/// Project facts from the global context, for system messages.
pub(crate) fn project_brief(ctx: &ExecutionContext) -> String {
    let globals = ctx.globals();
    let mut out = String::new();
    if let Some(name) = globals.get_str(keys::PROJECT_NAME) {
        let _ = writeln!(out, "Project: {name}");
    }
    if let Some(db) = globals.get_str(keys::DATABASE_KIND) {
        let _ = writeln!(out, "Database: {db}");
    }
    if let Some(description) = globals.get_str(keys::PROJECT_DESCRIPTION) {
        let _ = writeln!(out, "Description: {description}");
    }
    out
}

/// Every completed document of the run, in declaration order.
pub(crate) fn documents(ctx: &ExecutionContext) -> Vec<Arc<GeneratedDocument>> {
    ctx.sequence()
        .nodes()
        .filter(|n| n.handler_id() == DOCUMENT)
        .filter_map(|n| ctx.get_data::<GeneratedDocument>(&n.id))
        .collect()
}

pub(crate) fn render_documents<'a, I>(docs: I) -> String
where
    I: IntoIterator<Item = &'a Arc<GeneratedDocument>>,
{
    let mut out = String::new();
    for doc in docs {
        let _ = writeln!(out, "<{0}>\n{1}\n</{0}>", doc.tag, doc.content);
    }
    out
}

/// String list option, e.g. `"framework_files": ["a", "b"]`.
pub(crate) fn option_list(node: &BuildNode, key: &str) -> Vec<String> {
    node.options
        .as_ref()
        .and_then(|o| o.get(key))
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
