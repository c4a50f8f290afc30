use std::path::PathBuf;

use buildseq_core::api::{
    AppConfig, ArtifactGraph, BuildError, DependencyGraphSpec, PathPolicy, VirtualDirectory,
};

use super::cli::GraphArgs;
use crate::error::CliError;

fn read(path: &std::path::Path) -> Result<String, BuildError> {
    std::fs::read_to_string(path)
        .map_err(|e| BuildError::file_not_found(format!("{}: {e}", path.display())))
}

/// Validate a dependency declaration the way `file-dependencies` does,
/// without generating or writing anything.
pub fn check_graph(cfg: &AppConfig, args: &GraphArgs) -> Result<ArtifactGraph, BuildError> {
    let manifest = VirtualDirectory::from_json(&read(&args.manifest)?)?;
    let spec = DependencyGraphSpec::from_json(&read(&args.dependencies)?)?;
    let root = args
        .root
        .clone()
        .unwrap_or_else(|| PathBuf::from(&cfg.project.output_root));
    let policy = PathPolicy::new(root, &cfg.paths)?;
    ArtifactGraph::build(&spec, &manifest, &policy)
}

pub fn handle_graph(cfg: &AppConfig, args: &GraphArgs) -> Result<i32, CliError> {
    let graph = check_graph(cfg, args)?;

    if args.json {
        let out = serde_json::json!({
            "files": graph.len(),
            "layers": graph.layers(),
            "order": graph.order(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&out).map_err(anyhow::Error::from)?
        );
    } else {
        println!("{} files, {} layers", graph.len(), graph.layers().len());
        for (index, layer) in graph.layers().iter().enumerate() {
            println!("  {}: {}", index + 1, layer.join(", "));
        }
    }
    Ok(0)
}
