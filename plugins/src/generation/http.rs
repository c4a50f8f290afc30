use std::time::Duration;

use async_trait::async_trait;
use buildseq_core::api::{
    BuildError, GenerationConfig, GenerationRequest, GenerationResponse, GenerationService,
    TokenUsage,
};
use serde::Deserialize;
use serde_json::json;

const BODY_PREVIEW_LIMIT: usize = 512;

/// Chat-completions client: `POST {base_url}/chat/completions`.
///
/// Transport failures are classified before they leave this type: timeouts,
/// HTTP 429 and 5xx are retryable, other 4xx and malformed bodies are not
/// worth repeating with the same request.
#[derive(Clone)]
pub struct HttpGenerationService {
    api_key: String,
    http: reqwest::Client,
    url_chat: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

impl HttpGenerationService {
    pub fn new(base_url: &str, api_key: &str, timeout_ms: u64) -> Result<Self, BuildError> {
        let normalized = base_url.trim().trim_end_matches('/');
        if normalized.is_empty() {
            return Err(BuildError::missing_config(
                "generation.base_url is empty (set BUILDSEQ_GENERATION_URL)",
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| BuildError::invalid_parameter(format!("http client: {e}")))?;

        let url_chat = if normalized.ends_with("/chat/completions") {
            normalized.to_string()
        } else {
            format!("{normalized}/chat/completions")
        };

        Ok(Self {
            api_key: api_key.to_string(),
            http,
            url_chat,
        })
    }

    pub fn from_config(cfg: &GenerationConfig) -> Result<Self, BuildError> {
        Self::new(&cfg.base_url, &cfg.api_key, cfg.timeout_ms)
    }

    fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if self.api_key.trim().is_empty() {
            req
        } else {
            req.bearer_auth(&self.api_key)
        }
    }
}

fn classify_transport(err: reqwest::Error, url: &str) -> BuildError {
    if err.is_timeout() {
        BuildError::timeout(format!("{url}: {err}"))
    } else if err.is_connect() || err.is_request() {
        BuildError::service_unavailable(format!("{url}: {err}"))
    } else {
        BuildError::response_parsing(format!("{url}: {err}"))
    }
}

fn classify_status(status: u16, url: &str, preview: String) -> BuildError {
    let message = format!("{url} returned {status}: {preview}");
    match status {
        429 => BuildError::rate_limited(message),
        408 => BuildError::timeout(message),
        500..=599 => BuildError::service_unavailable(message),
        401 | 403 => BuildError::missing_config(message),
        _ => BuildError::invalid_parameter(message),
    }
}

fn preview_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }
    let mut out: String = trimmed.chars().take(BODY_PREVIEW_LIMIT).collect();
    if trimmed.chars().count() > BODY_PREVIEW_LIMIT {
        out.push_str("...");
    }
    out
}

#[async_trait]
impl GenerationService for HttpGenerationService {
    fn name(&self) -> &str {
        "http-chat"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse, BuildError> {
        let url = &self.url_chat;
        tracing::debug!(
            target: "buildseq.generation",
            stage = "generation.http.in",
            url = %url,
            model = %request.model,
            messages = request.messages.len(),
            chars = request.char_count()
        );

        let body = json!({
            "model": request.model,
            "messages": request.messages,
        });
        let resp = self
            .auth(self.http.post(url).json(&body))
            .send()
            .await
            .map_err(|e| classify_transport(e, url))?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| classify_transport(e, url))?;
        if !status.is_success() {
            return Err(classify_status(status.as_u16(), url, preview_body(&text)));
        }

        let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| {
            BuildError::response_parsing(format!(
                "failed to decode response body: {e} | body={}",
                preview_body(&text)
            ))
        })?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| BuildError::response_parsing("response has no message content"))?;

        tracing::debug!(
            target: "buildseq.generation",
            stage = "generation.http.out",
            status = %status,
            chars = content.len()
        );
        Ok(GenerationResponse {
            text: content,
            usage: parsed.usage.map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildseq_core::api::{ErrorCode, Message};
    use mockito::{Matcher, Server};

    fn request() -> GenerationRequest {
        GenerationRequest::new(
            "test-model",
            vec![Message::system("be brief"), Message::user("hello")],
        )
    }

    #[test]
    fn empty_base_url_is_a_config_error() {
        let err = HttpGenerationService::new("  ", "", 1_000).err().unwrap();
        assert_eq!(err.error_code(), ErrorCode::ConfigMissing);
    }

    #[test]
    fn preview_body_truncates() {
        let body = "a".repeat(BODY_PREVIEW_LIMIT + 10);
        assert!(preview_body(&body).ends_with("..."));
        assert_eq!(preview_body(" "), "<empty body>");
    }

    #[tokio::test]
    async fn returns_content_and_usage() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer secret")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "model": "test-model",
                "messages": [{"role": "system", "content": "be brief"}, {"role": "user", "content": "hello"}]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"choices":[{"message":{"role":"assistant","content":"<file>ok</file>"}}],
                    "usage":{"prompt_tokens":12,"completion_tokens":3}}"#,
            )
            .create_async()
            .await;

        let service =
            HttpGenerationService::new(&format!("{}/v1", server.url()), "secret", 1_000).unwrap();
        let resp = service.generate(&request()).await.unwrap();

        assert_eq!(resp.text, "<file>ok</file>");
        assert_eq!(
            resp.usage,
            Some(TokenUsage {
                input_tokens: 12,
                output_tokens: 3
            })
        );
    }

    #[tokio::test]
    async fn rate_limit_is_retryable() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body("slow down")
            .create_async()
            .await;

        let service = HttpGenerationService::new(&server.url(), "", 1_000).unwrap();
        let err = service.generate(&request()).await.unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(err.error_code(), ErrorCode::RateLimited);
        assert!(err.message().contains("slow down"));
    }

    #[tokio::test]
    async fn server_error_is_retryable_and_bad_request_is_not() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/chat/completions")
            .with_status(503)
            .create_async()
            .await;
        let service = HttpGenerationService::new(&server.url(), "", 1_000).unwrap();
        let err = service.generate(&request()).await.unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::ServiceUnavailable);

        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/chat/completions")
            .with_status(400)
            .with_body("unknown model")
            .create_async()
            .await;
        let service = HttpGenerationService::new(&server.url(), "", 1_000).unwrap();
        let err = service.generate(&request()).await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn missing_choices_is_a_parse_error() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[]}"#)
            .create_async()
            .await;

        let service = HttpGenerationService::new(&server.url(), "", 1_000).unwrap();
        let err = service.generate(&request()).await.unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::ParseError);
    }
}
