use serde::{Deserialize, Serialize};

use crate::executor::types::{ExecutorConfig, RetryConfig};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Task-level retry for retryable handler failures. Absent means no retry.
    #[serde(default)]
    pub retry: Option<RetryConfig>,

    #[serde(default)]
    pub fix_loop: FixLoopConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub verifier: VerifierConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub project: ProjectConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a daily file under `directory`.
    #[serde(default = "default_logging_file")]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "buildseq_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_file() -> bool {
    false
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: default_logging_file(),
            level: default_logging_level(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixLoopConfig {
    /// Repairs requested before an artifact is abandoned.
    #[serde(default = "default_max_fix_attempts")]
    pub max_fix_attempts: u32,

    /// Read-more-context rounds allowed inside one fix attempt.
    #[serde(default = "default_max_context_reads")]
    pub max_context_reads: u32,

    /// Fail the handler when an artifact is abandoned.
    #[serde(default)]
    pub fail_fast: bool,

    /// Model for fix requests; falls back to `generation.model`.
    #[serde(default)]
    pub model: Option<String>,
}

fn default_max_fix_attempts() -> u32 {
    3
}

fn default_max_context_reads() -> u32 {
    3
}

impl Default for FixLoopConfig {
    fn default() -> Self {
        Self {
            max_fix_attempts: default_max_fix_attempts(),
            max_context_reads: default_max_context_reads(),
            fail_fast: false,
            model: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Chat-completions style endpoint.
    #[serde(default)]
    pub base_url: String,

    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_generation_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_generation_timeout_ms() -> u64 {
    120_000
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            model: default_model(),
            timeout_ms: default_generation_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Run once before the first build, e.g. dependency installation.
    #[serde(default = "default_install_command")]
    pub install_command: Option<String>,

    #[serde(default = "default_build_command")]
    pub build_command: String,

    #[serde(default = "default_verifier_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_install_command() -> Option<String> {
    Some("npm install".to_string())
}

fn default_build_command() -> String {
    "npm run build".to_string()
}

fn default_verifier_timeout_secs() -> u64 {
    300
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            install_command: default_install_command(),
            build_command: default_build_command(),
            timeout_secs: default_verifier_timeout_secs(),
        }
    }
}

/// Path-safety and resolution settings for generated artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Glob patterns for framework-provided paths that always exist.
    #[serde(default = "default_framework_paths")]
    pub framework_paths: Vec<String>,

    /// File names generation may never write or rename onto.
    #[serde(default = "default_protected_files")]
    pub protected_files: Vec<String>,

    /// Directory names generation may never write under.
    #[serde(default = "default_forbidden_dirs")]
    pub forbidden_dirs: Vec<String>,

    /// Glob patterns (matched on the file name) for secret files.
    #[serde(default = "default_secret_patterns")]
    pub secret_patterns: Vec<String>,

    /// File stem a directory reference resolves to.
    #[serde(default = "default_index_stem")]
    pub index_stem: String,
}

fn default_framework_paths() -> Vec<String> {
    vec![
        "src/components/ui/**".to_string(),
        "components/ui/**".to_string(),
        "@/components/ui/**".to_string(),
        "src/lib/utils.*".to_string(),
    ]
}

fn default_protected_files() -> Vec<String> {
    [
        "package.json",
        "package-lock.json",
        "yarn.lock",
        "pnpm-lock.yaml",
        "tsconfig.json",
        "Cargo.toml",
        "Cargo.lock",
        "go.mod",
        "go.sum",
        "pyproject.toml",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_forbidden_dirs() -> Vec<String> {
    ["node_modules", "vendor", ".git", "target", "dist"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_secret_patterns() -> Vec<String> {
    vec![".env".to_string(), ".env.*".to_string(), "*.pem".to_string()]
}

fn default_index_stem() -> String {
    "index".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            framework_paths: default_framework_paths(),
            protected_files: default_protected_files(),
            forbidden_dirs: default_forbidden_dirs(),
            secret_patterns: default_secret_patterns(),
            index_stem: default_index_stem(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default = "default_project_name")]
    pub name: String,

    #[serde(default = "default_database_kind")]
    pub database_kind: String,

    /// Root directory generated files are written under.
    #[serde(default = "default_output_root")]
    pub output_root: String,
}

fn default_project_name() -> String {
    "my-project".to_string()
}

fn default_database_kind() -> String {
    "postgres".to_string()
}

fn default_output_root() -> String {
    "./output".to_string()
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: default_project_name(),
            database_kind: default_database_kind(),
            output_root: default_output_root(),
        }
    }
}
