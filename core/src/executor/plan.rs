use std::path::Path;

use serde::Serialize;

use crate::error::{BuildError, ExecutorError};

use super::graph::TaskGraph;
use super::types::{BuildNode, BuildSequence, BuildStep, FlatSequence, PipelineDefinition};

/// Convert the flat form into staged form: one parallel step per Kahn layer.
pub fn flat_to_staged(flat: &FlatSequence) -> Result<BuildSequence, ExecutorError> {
    let graph = TaskGraph::from_tasks(&flat.tasks)?;
    let layers = graph.check()?;

    let steps = layers
        .iter()
        .enumerate()
        .map(|(index, ids)| {
            let nodes: Vec<BuildNode> = ids
                .iter()
                .filter_map(|id| graph.nodes.get(id).cloned())
                .collect();
            BuildStep::parallel(format!("layer-{}", index + 1), nodes)
        })
        .collect();

    Ok(BuildSequence {
        id: flat.id.clone(),
        version: flat.version.clone(),
        steps,
    })
}

impl PipelineDefinition {
    /// Canonical staged form of either declaration.
    pub fn into_sequence(self) -> Result<BuildSequence, ExecutorError> {
        match self {
            Self::Staged(sequence) => Ok(sequence),
            Self::Flat(flat) => flat_to_staged(&flat),
        }
    }

    /// Read a pipeline file. `.toml` files are parsed as TOML, anything
    /// else as JSON.
    pub fn from_path(path: &Path) -> Result<Self, BuildError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| BuildError::file_not_found(format!("{}: {e}", path.display())))?;
        let is_toml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("toml"));

        if is_toml {
            toml::from_str(&raw).map_err(|e| {
                BuildError::invalid_parameter(format!("{}: {e}", path.display()))
            })
        } else {
            serde_json::from_str(&raw).map_err(|e| {
                BuildError::invalid_parameter(format!("{}: {e}", path.display()))
            })
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannedStep {
    pub id: String,
    pub parallel: bool,
    pub tasks: Vec<String>,
}

/// What a run would do, computed without side effects.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPlan {
    pub sequence_id: String,
    pub steps: Vec<PlannedStep>,
    /// Dependency layers over all nodes, independent of step grouping.
    pub layers: Vec<Vec<String>>,
    pub order: Vec<String>,
}

impl ExecutionPlan {
    /// Validate the sequence graph and describe it.
    pub fn build(sequence: &BuildSequence) -> Result<Self, ExecutorError> {
        let nodes: Vec<BuildNode> = sequence.nodes().cloned().collect();
        let graph = TaskGraph::from_tasks(&nodes)?;
        let layers = graph.check()?;
        let order = graph.topological_order()?;

        let steps = sequence
            .steps
            .iter()
            .map(|step| PlannedStep {
                id: step.id.clone(),
                parallel: step.parallel,
                tasks: step.nodes.iter().map(|n| n.id.clone()).collect(),
            })
            .collect();

        Ok(Self {
            sequence_id: sequence.id.clone(),
            steps,
            layers,
            order,
        })
    }
}
