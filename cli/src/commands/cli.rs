use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Jsonl,
    #[value(name = "none")]
    Off,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Jsonl => "jsonl",
            Self::Off => "none",
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "buildseq", version, about = "Run dependency-driven generation pipelines")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file; defaults to ~/.buildseq/config.toml, then ./buildseq.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    /// Pipeline definition (.json or .toml, staged or flat form).
    pub pipeline: PathBuf,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Overrides `project.output_root`.
    #[arg(long)]
    pub output_root: Option<String>,

    /// Overrides `generation.model`.
    #[arg(long)]
    pub model: Option<String>,

    #[arg(long)]
    pub run_id: Option<String>,

    #[arg(long)]
    pub max_concurrency: Option<usize>,

    /// Stop a parallel step at its first failed task.
    #[arg(long)]
    pub fail_fast: bool,

    #[arg(long)]
    pub progress: bool,

    /// Plain ASCII status markers in text output.
    #[arg(long)]
    pub ascii: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct PlanArgs {
    pub pipeline: PathBuf,

    /// Print the plan as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct GraphArgs {
    /// Manifest file: {"Paths": [...]}.
    #[arg(long)]
    pub manifest: PathBuf,

    /// Dependency file: {"files": {"path": {"dependsOn": [...]}}}.
    #[arg(long)]
    pub dependencies: PathBuf,

    /// Project root the path policy checks against; defaults to
    /// `project.output_root`.
    #[arg(long)]
    pub root: Option<PathBuf>,

    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a pipeline.
    Run(RunArgs),
    /// Validate a pipeline and print its steps and dependency layers.
    Plan(PlanArgs),
    /// Validate a file dependency graph against a manifest, writing nothing.
    Graph(GraphArgs),
}
