#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use buildseq_core::api::{
    BuildError, BuildHandler, BuildResult, ExecutionContext, ExecutorConfig, GenerationRequest,
    GenerationResponse, GenerationService, HandlerInput, HandlerRegistry, Verifier, VerifyOutcome,
};

/// Executor settings with short waits so tests stay fast.
pub fn fast_config() -> ExecutorConfig {
    ExecutorConfig {
        poll_interval_ms: 5,
        serial_ready_attempts: 3,
        parallel_idle_rounds: 3,
        max_concurrency: 4,
        fail_fast: false,
        progress_bar: false,
    }
}

/// Handler that appends its task id to a shared log when it runs.
pub struct RecordingHandler {
    id: String,
    log: Arc<Mutex<Vec<String>>>,
    delay: Duration,
    fail_with: Option<BuildError>,
}

impl RecordingHandler {
    pub fn new(id: &str, log: &Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            id: id.to_string(),
            log: Arc::clone(log),
            delay: Duration::ZERO,
            fail_with: None,
        }
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing(mut self, error: BuildError) -> Self {
        self.fail_with = Some(error);
        self
    }
}

#[async_trait]
impl BuildHandler for RecordingHandler {
    fn id(&self) -> &str {
        &self.id
    }

    async fn handle(
        &self,
        _ctx: &ExecutionContext,
        input: HandlerInput<'_>,
    ) -> Result<BuildResult, BuildError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.log.lock().unwrap().push(input.node.id.clone());
        match &self.fail_with {
            Some(err) => Err(err.clone()),
            None => Ok(BuildResult::ok(input.node.id.clone())),
        }
    }
}

/// Handler that fails with a retryable error a fixed number of times first.
pub struct FlakyHandler {
    id: String,
    failures_left: AtomicUsize,
    pub calls: AtomicUsize,
}

impl FlakyHandler {
    pub fn new(id: &str, failures: usize) -> Self {
        Self {
            id: id.to_string(),
            failures_left: AtomicUsize::new(failures),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl BuildHandler for FlakyHandler {
    fn id(&self) -> &str {
        &self.id
    }

    async fn handle(
        &self,
        _ctx: &ExecutionContext,
        _input: HandlerInput<'_>,
    ) -> Result<BuildResult, BuildError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(BuildError::service_unavailable("try again"));
        }
        Ok(BuildResult::empty())
    }
}

pub fn registry(handlers: Vec<Arc<dyn BuildHandler>>) -> Arc<HandlerRegistry> {
    Arc::new(HandlerRegistry::new(handlers))
}

/// Generation service that replays queued responses in order.
#[derive(Default)]
pub struct ScriptedGeneration {
    responses: Mutex<VecDeque<String>>,
    pub requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGeneration {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl GenerationService for ScriptedGeneration {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse, BuildError> {
        self.requests.lock().unwrap().push(request.clone());
        match self.responses.lock().unwrap().pop_front() {
            Some(text) => Ok(GenerationResponse::text(text)),
            None => Err(BuildError::service_unavailable("script exhausted")),
        }
    }
}

/// Verifier that fails a fixed number of times, then passes.
pub struct ScriptedVerifier {
    failures_left: AtomicUsize,
    pub calls: AtomicUsize,
}

impl ScriptedVerifier {
    pub fn failing_times(failures: usize) -> Self {
        Self {
            failures_left: AtomicUsize::new(failures),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always_failing() -> Self {
        Self::failing_times(usize::MAX)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Verifier for ScriptedVerifier {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn verify(&self, _project_root: &Path) -> Result<VerifyOutcome, BuildError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left.saturating_sub(1), Ordering::SeqCst);
            return Ok(VerifyOutcome::failed("error TS2304: Cannot find name 'Foo'."));
        }
        Ok(VerifyOutcome::passed())
    }
}
