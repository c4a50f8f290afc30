use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use buildseq_core::api::{BuildError, Verifier, VerifierConfig, VerifyOutcome};
use tokio::process::Command;
use tokio::sync::Mutex;

/// Runs the project's own build in the project root.
///
/// The install command runs before the first build and again only until it
/// succeeds once. Each command is bounded by the configured timeout; a
/// timeout surfaces as a retryable error.
///
/// Concurrent `verify` calls share one project root, so builds run one at a
/// time.
pub struct CommandVerifier {
    install_command: Option<String>,
    build_command: String,
    timeout: Duration,
    /// Held for a whole verification; the flag records a successful install.
    installed: Mutex<bool>,
}

struct CommandRun {
    success: bool,
    output: String,
}

impl CommandVerifier {
    pub fn new(
        install_command: Option<String>,
        build_command: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            install_command: install_command.filter(|c| !c.trim().is_empty()),
            build_command: build_command.into(),
            timeout,
            installed: Mutex::new(false),
        }
    }

    pub fn from_config(cfg: &VerifierConfig) -> Self {
        Self::new(
            cfg.install_command.clone(),
            cfg.build_command.clone(),
            Duration::from_secs(cfg.timeout_secs.max(1)),
        )
    }

    fn shell(command: &str) -> Command {
        if cfg!(windows) {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(command);
            cmd
        } else {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(command);
            cmd
        }
    }

    async fn run_command(&self, command: &str, cwd: &Path) -> Result<CommandRun, BuildError> {
        tracing::debug!(command, cwd = %cwd.display(), "running verifier command");
        let child = Self::shell(command)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BuildError::missing_config(format!("cannot start '{command}': {e}")))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                BuildError::timeout(format!(
                    "'{command}' did not finish within {}s",
                    self.timeout.as_secs()
                ))
            })??;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }

        tracing::debug!(
            command,
            exit_code = output.status.code().unwrap_or(-1),
            output_len = combined.len(),
            "verifier command finished"
        );
        Ok(CommandRun {
            success: output.status.success(),
            output: combined,
        })
    }
}

#[async_trait]
impl Verifier for CommandVerifier {
    fn name(&self) -> &str {
        "command"
    }

    async fn verify(&self, project_root: &Path) -> Result<VerifyOutcome, BuildError> {
        let mut installed = self.installed.lock().await;
        if let Some(install) = &self.install_command {
            if !*installed {
                let run = self.run_command(install, project_root).await?;
                if !run.success {
                    tracing::warn!(command = %install, "install command failed");
                    return Ok(VerifyOutcome::failed(run.output));
                }
                *installed = true;
            }
        }

        let run = self.run_command(&self.build_command, project_root).await?;
        drop(installed);
        if run.success {
            Ok(VerifyOutcome::passed())
        } else {
            Ok(VerifyOutcome::failed(run.output))
        }
    }
}
