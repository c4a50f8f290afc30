use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{BuildError, NonRetryableKind};
use crate::executor::TaskGraph;

use super::manifest::VirtualDirectory;
use super::paths::{normalize_path, PathPolicy};

/// Per-file dependency declaration: `{"files": {path: {"dependsOn": [...]}}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGraphSpec {
    pub files: BTreeMap<String, FileDependencies>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDependencies {
    #[serde(default, rename = "dependsOn", alias = "depends_on")]
    pub depends_on: Vec<String>,
}

impl DependencyGraphSpec {
    pub fn from_json(text: &str) -> Result<Self, BuildError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// A validated file dependency graph, ready to be generated layer by layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactGraph {
    /// Resolved dependencies per file, including declared files that are
    /// not generated here.
    dependencies: BTreeMap<String, Vec<String>>,
    layers: Vec<Vec<String>>,
    order: Vec<String>,
}

impl ArtifactGraph {
    /// Resolve, validate and layer a dependency declaration.
    ///
    /// Checks run in this order, all before anything touches the disk:
    /// every referenced path must be declared in `manifest`, every generated
    /// path must pass the path policy, and the graph must be acyclic.
    /// Framework paths are dropped from the graph entirely.
    pub fn build(
        spec: &DependencyGraphSpec,
        manifest: &VirtualDirectory,
        policy: &PathPolicy,
    ) -> Result<Self, BuildError> {
        let mut dependencies: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for (raw, entry) in &spec.files {
            let path = normalize_path(raw);
            if path.is_empty() || policy.is_framework(&path) {
                continue;
            }

            let deps = dependencies.entry(path.clone()).or_default();
            for token in &entry.depends_on {
                if policy.is_framework(token) {
                    continue;
                }
                let dep = policy.resolve(&path, token);
                if !policy.is_framework(&dep) && !deps.contains(&dep) {
                    deps.push(dep);
                }
            }
        }

        let referenced = dependencies
            .iter()
            .flat_map(|(path, deps)| std::iter::once(path).chain(deps.iter()));
        let missing = manifest.validate(referenced);
        if !missing.is_empty() {
            return Err(BuildError::non_retryable(
                NonRetryableKind::ManifestValidation,
                format!(
                    "dependency graph references undeclared paths: {}",
                    missing.join(", ")
                ),
            ));
        }

        for path in dependencies.keys() {
            policy.check(path)?;
        }

        let edges = dependencies.iter().map(|(path, deps)| {
            let internal: Vec<String> = deps
                .iter()
                .filter(|d| dependencies.contains_key(*d))
                .cloned()
                .collect();
            (path.clone(), internal)
        });
        let graph = TaskGraph::from_map(edges)?;
        let order = graph.topological_order()?;
        let layers = graph.concurrency_layers()?;

        tracing::debug!(files = dependencies.len(), layers = layers.len(), "artifact graph built");
        Ok(Self {
            dependencies,
            layers,
            order,
        })
    }

    pub fn layers(&self) -> &[Vec<String>] {
        &self.layers
    }

    /// Files in dependency order.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn dependencies_of(&self, path: &str) -> &[String] {
        self.dependencies
            .get(path)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn files(&self) -> impl Iterator<Item = &String> {
        self.dependencies.keys()
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }
}
