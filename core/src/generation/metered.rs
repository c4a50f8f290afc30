use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;

use crate::error::BuildError;
use crate::metrics::MetricsMonitor;

use super::tags::{extract_json, extract_tagged};
use super::types::{GenerationRequest, GenerationResponse, GenerationService, TokenUsage};

/// Rough token count for text when the service reports none.
pub fn estimate_tokens(chars: usize) -> u64 {
    chars.div_ceil(4) as u64
}

/// A generation service bound to a pipeline's monitor.
///
/// Every call is timed and attributed to a task id, with token usage taken
/// from the service or estimated from character counts.
#[derive(Clone)]
pub struct MeteredGeneration {
    service: Arc<dyn GenerationService>,
    monitor: Arc<MetricsMonitor>,
    pipeline_id: String,
    model: String,
}

impl MeteredGeneration {
    pub fn new(
        service: Arc<dyn GenerationService>,
        monitor: Arc<MetricsMonitor>,
        pipeline_id: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            service,
            monitor,
            pipeline_id: pipeline_id.into(),
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn monitor(&self) -> &Arc<MetricsMonitor> {
        &self.monitor
    }

    pub fn pipeline_id(&self) -> &str {
        &self.pipeline_id
    }

    /// Build a request for the default model.
    pub fn request(&self, messages: Vec<super::Message>) -> GenerationRequest {
        GenerationRequest::new(self.model.clone(), messages)
    }

    pub async fn generate(
        &self,
        task_id: &str,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, BuildError> {
        let started = Utc::now();
        let result = self.service.generate(request).await;
        let ended = Utc::now();

        let usage = match &result {
            Ok(resp) => resp.usage.unwrap_or(TokenUsage {
                input_tokens: estimate_tokens(request.char_count()),
                output_tokens: estimate_tokens(resp.text.chars().count()),
            }),
            Err(_) => TokenUsage {
                input_tokens: estimate_tokens(request.char_count()),
                output_tokens: 0,
            },
        };
        self.monitor.record_generation(
            &self.pipeline_id,
            task_id,
            started,
            ended,
            usage.input_tokens,
            usage.output_tokens,
        );

        match &result {
            Ok(_) => tracing::debug!(
                task_id,
                service = self.service.name(),
                model = %request.model,
                elapsed_ms = (ended - started).num_milliseconds(),
                "generation call finished"
            ),
            Err(e) => tracing::warn!(
                task_id,
                service = self.service.name(),
                error = %e,
                "generation call failed"
            ),
        }
        result
    }

    /// Generate and return the payload of the first `<tag>` pair.
    pub async fn generate_tagged(
        &self,
        task_id: &str,
        request: &GenerationRequest,
        tag: &str,
    ) -> Result<String, BuildError> {
        let response = self.generate(task_id, request).await?;
        extract_tagged(&response.text, tag)
    }

    /// Generate and decode the `<tag>` payload as JSON.
    pub async fn generate_json<T: DeserializeOwned>(
        &self,
        task_id: &str,
        request: &GenerationRequest,
        tag: &str,
    ) -> Result<T, BuildError> {
        let response = self.generate(task_id, request).await?;
        extract_json(&response.text, tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::Message;
    use async_trait::async_trait;

    struct Fixed;

    #[async_trait]
    impl GenerationService for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn generate(
            &self,
            _request: &GenerationRequest,
        ) -> Result<GenerationResponse, BuildError> {
            Ok(GenerationResponse::text("<doc>12345678</doc>"))
        }
    }

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(0), 0);
        assert_eq!(estimate_tokens(1), 1);
        assert_eq!(estimate_tokens(8), 2);
    }

    #[tokio::test]
    async fn calls_are_recorded_against_the_task() {
        let monitor = Arc::new(MetricsMonitor::new());
        let generation = MeteredGeneration::new(Arc::new(Fixed), monitor.clone(), "run", "m");
        let request = generation.request(vec![Message::user("abcd")]);

        let doc = generation.generate_tagged("docs", &request, "doc").await.unwrap();
        assert_eq!(doc, "12345678");

        let task = monitor.task("run", "docs").unwrap();
        assert_eq!(task.generation_calls, 1);
        assert_eq!(task.input_tokens, 1);
        assert_eq!(task.output_tokens, 5);
    }
}
