use std::path::Path;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::BuildError;

/// Result of one verification run over the project root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyOutcome {
    pub success: bool,
    /// Combined diagnostic output, fed back into fix requests on failure.
    pub output: String,
}

impl VerifyOutcome {
    pub fn passed() -> Self {
        Self {
            success: true,
            output: String::new(),
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }
}

/// External build/compile check that accepts or rejects generated files.
///
/// `Ok` with `success: false` means the project was checked and rejected.
/// `Err` means the check itself could not run.
#[async_trait]
pub trait Verifier: Send + Sync {
    fn name(&self) -> &str;

    async fn verify(&self, project_root: &Path) -> Result<VerifyOutcome, BuildError>;
}
