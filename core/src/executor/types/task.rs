use serde::{Deserialize, Serialize};

/// Common task interface for executor graph handling.
pub trait TaskLike: Clone + Send + Sync {
    fn id(&self) -> &str;
    fn dependencies(&self) -> &[String];
}

/// A single unit of pipeline work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildNode {
    pub id: String,

    /// Handler that performs this node. Defaults to `id` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,

    #[serde(default, alias = "dependsOn", skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<serde_json::Value>,
}

impl BuildNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            handler: None,
            requires: Vec::new(),
            options: None,
        }
    }

    pub fn requires<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn handler(mut self, handler: impl Into<String>) -> Self {
        self.handler = Some(handler.into());
        self
    }

    pub fn options(mut self, options: serde_json::Value) -> Self {
        self.options = Some(options);
        self
    }

    pub fn handler_id(&self) -> &str {
        self.handler.as_deref().unwrap_or(&self.id)
    }

    /// Look up a string option.
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options
            .as_ref()
            .and_then(|o| o.get(key))
            .and_then(|v| v.as_str())
    }
}

impl TaskLike for BuildNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn dependencies(&self) -> &[String] {
        &self.requires
    }
}

/// An ordered group of nodes, run serially or concurrently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildStep {
    pub id: String,

    #[serde(default)]
    pub parallel: bool,

    #[serde(default, alias = "tasks")]
    pub nodes: Vec<BuildNode>,
}

impl BuildStep {
    pub fn serial(id: impl Into<String>, nodes: Vec<BuildNode>) -> Self {
        Self {
            id: id.into(),
            parallel: false,
            nodes,
        }
    }

    pub fn parallel(id: impl Into<String>, nodes: Vec<BuildNode>) -> Self {
        Self {
            id: id.into(),
            parallel: true,
            nodes,
        }
    }
}

/// Staged pipeline definition (canonical form).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildSequence {
    pub id: String,

    #[serde(default = "default_version")]
    pub version: String,

    pub steps: Vec<BuildStep>,
}

impl BuildSequence {
    pub fn new(id: impl Into<String>, steps: Vec<BuildStep>) -> Self {
        Self {
            id: id.into(),
            version: default_version(),
            steps,
        }
    }

    /// All nodes across every step, in declaration order.
    pub fn nodes(&self) -> impl Iterator<Item = &BuildNode> {
        self.steps.iter().flat_map(|s| s.nodes.iter())
    }
}

/// Flat pipeline definition: an unordered task list with inline handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatSequence {
    pub id: String,

    #[serde(default = "default_version")]
    pub version: String,

    pub tasks: Vec<BuildNode>,
}

/// Either declaration form, as read from a pipeline file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PipelineDefinition {
    Staged(BuildSequence),
    Flat(FlatSequence),
}

impl PipelineDefinition {
    pub fn id(&self) -> &str {
        match self {
            Self::Staged(s) => &s.id,
            Self::Flat(f) => &f.id,
        }
    }
}

fn default_version() -> String {
    "1.0.0".to_string()
}
