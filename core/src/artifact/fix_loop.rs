use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::path::Path;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::config::FixLoopConfig;
use crate::error::{BuildError, NonRetryableKind};
use crate::executor::execute_batch_parallel;
use crate::generation::{GenerationRequest, Message, MeteredGeneration};

use super::fix_ops::{FixOperation, FIX_TAG};
use super::paths::{normalize_path, PathPolicy};
use super::verifier::Verifier;

const FIX_INSTRUCTIONS: &str = "You repair generated source files that fail the project build. \
Reply with exactly one <fix>...</fix> block holding a JSON object with an \"operation\" field: \
{\"operation\":\"write\",\"content\":\"<full new file content>\"} to rewrite the file, \
{\"operation\":\"rename\",\"from\":\"<old path>\",\"to\":\"<new path>\"} when the file needs another \
extension or location, or {\"operation\":\"read\",\"paths\":[...]} to see declared dependency files first.";

/// Verifier output beyond this many characters is cut from the front.
const MAX_ERROR_CHARS: usize = 8_000;

/// One generated file queued for verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTask {
    /// Relative to the project root. A rename repair changes it.
    pub path: String,
    pub content: String,
    pub declared_dependencies: Vec<String>,
}

impl FileTask {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            declared_dependencies: Vec::new(),
        }
    }

    pub fn with_dependencies(mut self, deps: Vec<String>) -> Self {
        self.declared_dependencies = deps;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactState {
    Queued,
    Written,
    NeedsFix,
    Verified,
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FixOutcome {
    pub original_path: String,
    /// Final path, after any rename.
    pub path: String,
    pub state: ArtifactState,
    /// Repairs requested.
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl FixOutcome {
    pub fn is_verified(&self) -> bool {
        self.state == ArtifactState::Verified
    }
}

/// Write → verify → repair, bounded by `max_fix_attempts` repairs.
///
/// A read-more-context reply does not consume a repair: the requested files
/// are appended to the conversation and a fix is requested again, up to
/// `max_context_reads` times per repair.
///
/// A rename repair may not move an artifact onto a path that another
/// artifact owns (see [`FixLoop::reserve`]) or that already exists on disk.
pub struct FixLoop {
    generation: MeteredGeneration,
    verifier: Arc<dyn Verifier>,
    policy: Arc<PathPolicy>,
    config: FixLoopConfig,
    claimed: Mutex<HashSet<String>>,
}

impl FixLoop {
    pub fn new(
        generation: MeteredGeneration,
        verifier: Arc<dyn Verifier>,
        policy: Arc<PathPolicy>,
        config: FixLoopConfig,
    ) -> Self {
        Self {
            generation,
            verifier,
            policy,
            config,
            claimed: Mutex::new(HashSet::new()),
        }
    }

    /// Claim paths for artifacts that are planned but not yet written, so no
    /// rename can take them.
    pub fn reserve<'a>(&self, paths: impl IntoIterator<Item = &'a str>) {
        let mut claimed = self.claimed();
        claimed.extend(paths.into_iter().map(normalize_path));
    }

    fn claimed(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        match self.claimed.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Monitor task id for an artifact.
    pub fn task_key(path: &str) -> String {
        format!("artifact:{path}")
    }

    fn model(&self) -> String {
        self.config
            .model
            .clone()
            .unwrap_or_else(|| self.generation.model().to_string())
    }

    #[tracing::instrument(skip_all, fields(path = %task.path))]
    pub async fn run(&self, mut task: FileTask) -> Result<FixOutcome, BuildError> {
        let original_path = task.path.clone();
        let key = Self::task_key(&original_path);
        let monitor = self.generation.monitor();
        let pipeline_id = self.generation.pipeline_id();
        monitor.start_artifact(pipeline_id, &key);
        self.claimed().insert(normalize_path(&original_path));

        let max = self.config.max_fix_attempts;
        let mut state = ArtifactState::Queued;
        let mut retry_count = 0;
        let mut last_error: Option<String> = None;

        for attempt in 0..=max {
            if let Err(e) = self.write(&task).await {
                monitor.end_task(pipeline_id, &key, false, Some(&e.to_string()));
                return Err(e);
            }
            state = ArtifactState::Written;
            tracing::debug!(attempt, state = ?state, "artifact written");

            let report = match self.verifier.verify(self.policy.root()).await {
                Ok(outcome) if outcome.success => {
                    monitor.end_task(pipeline_id, &key, true, None);
                    tracing::info!(path = %task.path, retry_count, "artifact verified");
                    return Ok(FixOutcome {
                        original_path,
                        path: task.path,
                        state: ArtifactState::Verified,
                        retry_count,
                        last_error: None,
                    });
                }
                Ok(outcome) => tail(&outcome.output, MAX_ERROR_CHARS),
                Err(e) if e.is_retryable() => e.to_string(),
                Err(e) => {
                    monitor.end_task(pipeline_id, &key, false, Some(&e.to_string()));
                    return Err(e);
                }
            };
            state = ArtifactState::NeedsFix;
            last_error = Some(first_line(&report));

            if attempt == max {
                break;
            }

            retry_count += 1;
            monitor.increment_retry(pipeline_id, &key);
            tracing::warn!(attempt = retry_count, max, "verification failed, requesting fix");

            match self.request_fix(&mut task, &report, &key).await {
                Ok(()) => {}
                Err(e) if is_write_failure(&e) => {
                    monitor.end_task(pipeline_id, &key, false, Some(&e.to_string()));
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "fix request failed, attempt consumed");
                    last_error = Some(e.to_string());
                }
            }
        }

        debug_assert_eq!(state, ArtifactState::NeedsFix);
        tracing::warn!(path = %task.path, retry_count, "fix budget exhausted, abandoning artifact");
        monitor.end_task(pipeline_id, &key, false, last_error.as_deref());

        if self.config.fail_fast {
            return Err(BuildError::non_retryable(
                NonRetryableKind::VerificationFailed,
                format!(
                    "{} still fails after {retry_count} fixes: {}",
                    task.path,
                    last_error.as_deref().unwrap_or("unknown error")
                ),
            ));
        }

        Ok(FixOutcome {
            original_path,
            path: task.path,
            state: ArtifactState::Abandoned,
            retry_count,
            last_error,
        })
    }

    /// Run every task of one concurrency layer, at most `max_concurrency` at
    /// a time. Outcomes come back in input order; the first error wins.
    pub async fn run_layer(
        &self,
        tasks: Vec<FileTask>,
        max_concurrency: usize,
    ) -> Result<Vec<FixOutcome>, BuildError> {
        let mut ids = Vec::with_capacity(tasks.len());
        let mut queued = HashMap::with_capacity(tasks.len());
        for task in tasks {
            if queued.contains_key(&task.path) {
                return Err(BuildError::invalid_parameter(format!(
                    "{} queued twice in one layer",
                    task.path
                )));
            }
            ids.push(task.path.clone());
            queued.insert(task.path.clone(), task);
        }
        let queued = Mutex::new(queued);

        let results = execute_batch_parallel(&ids, max_concurrency, |id| {
            let task = match queued.lock() {
                Ok(mut q) => q.remove(&id),
                Err(poisoned) => poisoned.into_inner().remove(&id),
            };
            async move {
                match task {
                    Some(task) => self.run(task).await,
                    None => Err(BuildError::invalid_parameter(format!("{id} is not queued"))),
                }
            }
        })
        .await;

        let mut by_id: HashMap<String, Result<FixOutcome, BuildError>> =
            results.into_iter().collect();
        ids.iter()
            .map(|id| {
                by_id
                    .remove(id)
                    .unwrap_or_else(|| Err(BuildError::invalid_parameter(format!("{id} was lost"))))
            })
            .collect()
    }

    async fn write(&self, task: &FileTask) -> Result<(), BuildError> {
        let abs = self.policy.absolute(&task.path)?;
        if let Some(parent) = abs.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BuildError::file_write(format!("{}: {e}", parent.display())))?;
        }
        tokio::fs::write(&abs, &task.content)
            .await
            .map_err(|e| BuildError::file_write(format!("{}: {e}", abs.display())))
    }

    async fn request_fix(
        &self,
        task: &mut FileTask,
        report: &str,
        key: &str,
    ) -> Result<(), BuildError> {
        let mut messages = vec![
            Message::system(FIX_INSTRUCTIONS),
            Message::user(render_fix_request(task, report)),
        ];
        let mut reads = 0;

        loop {
            let request = GenerationRequest::new(self.model(), messages.clone());
            let response = self.generation.generate(key, &request).await?;

            match FixOperation::parse(&response.text)? {
                FixOperation::Read { paths } => {
                    if reads >= self.config.max_context_reads {
                        return Err(BuildError::response_parsing(format!(
                            "still asking for context after {reads} reads"
                        )));
                    }
                    reads += 1;
                    tracing::debug!(paths = ?paths, reads, "fix needs more context");
                    let context = self.read_context(task, &paths).await;
                    messages.push(Message::assistant(response.text));
                    messages.push(Message::user(context));
                }
                FixOperation::Write { content } => {
                    task.content = content;
                    return Ok(());
                }
                FixOperation::Rename { from, to, content } => {
                    self.rename(task, &from, &to).await?;
                    if let Some(content) = content {
                        task.content = content;
                    }
                    return Ok(());
                }
            }
        }
    }

    async fn rename(&self, task: &mut FileTask, from: &str, to: &str) -> Result<(), BuildError> {
        let target = self.policy.check(to)?;
        if normalize_path(from) != task.path {
            tracing::warn!(from, current = %task.path, "rename source is not the artifact, moving the artifact");
        }
        if target == task.path {
            return Ok(());
        }

        let new_abs = self.policy.root().join(&target);
        if tokio::fs::try_exists(&new_abs).await.unwrap_or(true) {
            return Err(BuildError::path_rejected(format!("'{target}' already exists")));
        }
        if !self.claimed().insert(target.clone()) {
            return Err(BuildError::path_rejected(format!(
                "'{target}' belongs to another artifact"
            )));
        }

        if let Err(e) = self.move_file(&task.path, &new_abs).await {
            self.claimed().remove(&target);
            return Err(e);
        }

        tracing::info!(from = %task.path, to = %target, "artifact renamed");
        self.claimed().remove(&task.path);
        task.path = target;
        Ok(())
    }

    async fn move_file(&self, from: &str, to: &Path) -> Result<(), BuildError> {
        let old_abs = self.policy.absolute(from)?;
        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BuildError::file_write(format!("{}: {e}", parent.display())))?;
        }
        if tokio::fs::try_exists(&old_abs).await.unwrap_or(false) {
            tokio::fs::rename(&old_abs, to)
                .await
                .map_err(|e| BuildError::file_write(format!("{}: {e}", to.display())))?;
        }
        Ok(())
    }

    async fn read_context(&self, task: &FileTask, paths: &[String]) -> String {
        let mut out = String::from("Requested files:\n");
        for raw in paths {
            let path = normalize_path(raw);
            if path != task.path && !task.declared_dependencies.contains(&path) {
                let _ = writeln!(out, "{path}: not a declared dependency of {}, skipped", task.path);
                continue;
            }
            let abs = match self.policy.absolute(&path) {
                Ok(abs) => abs,
                Err(e) => {
                    let _ = writeln!(out, "{path}: {e}");
                    continue;
                }
            };
            match tokio::fs::read_to_string(&abs).await {
                Ok(content) => {
                    let _ = writeln!(out, "<file path=\"{path}\">\n{content}\n</file>");
                }
                Err(_) => {
                    let _ = writeln!(out, "{path}: not found");
                }
            }
        }
        let _ = write!(out, "Now reply with one <{FIX_TAG}> block.");
        out
    }
}

fn render_fix_request(task: &FileTask, report: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "File: {}", task.path);
    if task.declared_dependencies.is_empty() {
        let _ = writeln!(out, "Declared dependencies: none");
    } else {
        let _ = writeln!(out, "Declared dependencies:");
        for dep in &task.declared_dependencies {
            let _ = writeln!(out, "- {dep}");
        }
    }
    let _ = writeln!(out, "<current>\n{}\n</current>", task.content);
    let _ = write!(out, "<error>\n{report}\n</error>");
    out
}

fn is_write_failure(err: &BuildError) -> bool {
    matches!(
        err,
        BuildError::NonRetryable {
            kind: NonRetryableKind::FileWrite,
            ..
        }
    )
}

fn first_line(report: &str) -> String {
    report
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("verification failed")
        .to_string()
}

fn tail(s: &str, max_chars: usize) -> String {
    let count = s.chars().count();
    if count <= max_chars {
        return s.to_string();
    }
    s.chars().skip(count - max_chars).collect()
}
