pub mod cli;
pub mod graph;
pub mod plan;
pub mod run;

use std::path::Path;

use buildseq_core::api::{BuildError, BuildSequence, PipelineDefinition};

/// Read a pipeline file in either form and return its staged sequence.
pub fn load_sequence(path: &Path) -> Result<BuildSequence, BuildError> {
    let definition = PipelineDefinition::from_path(path)?;
    Ok(definition.into_sequence()?)
}
