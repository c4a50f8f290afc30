mod load;
mod types;

pub use load::{apply_env_overrides, expand_paths, get_data_dir, load_default, load_from_path};
pub use types::{
    AppConfig, FixLoopConfig, GenerationConfig, LoggingConfig, PathsConfig, ProjectConfig,
    VerifierConfig,
};
