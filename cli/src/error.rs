use buildseq_core::api::{BuildError, ErrorCode};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("config error: {0}")]
    Config(String),
    #[error("{0}")]
    Build(#[from] BuildError),
    #[error("command failed: {0}")]
    Command(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
}

impl CliError {
    /// Process exit status.
    ///
    /// Build errors exit with their [`ErrorCode`]; everything else falls into
    /// the config, io or general buckets.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => ErrorCode::ConfigMissing.as_u16() as i32,
            Self::Build(e) => e.error_code().as_u16() as i32,
            Self::Io(_) => ErrorCode::FileNotFound.as_u16() as i32,
            Self::Command(_) | Self::Anyhow(_) => ErrorCode::GeneralError.as_u16() as i32,
        }
    }
}
