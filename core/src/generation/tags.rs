use regex::Regex;
use serde::de::DeserializeOwned;

use crate::error::BuildError;

/// Payload of the first `<tag>...</tag>` pair in `text`, trimmed.
///
/// A missing pair is a [`ResponseTag`](crate::error::RetryableKind::ResponseTag)
/// error.
pub fn extract_tagged(text: &str, tag: &str) -> Result<String, BuildError> {
    let name = regex::escape(tag);
    let pattern = format!(r"(?s)<{name}>(.*?)</{name}>");
    let re = Regex::new(&pattern)
        .map_err(|e| BuildError::invalid_parameter(format!("bad tag '{tag}': {e}")))?;

    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .ok_or_else(|| BuildError::response_tag(format!("response has no <{tag}>...</{tag}> pair")))
}

/// Extract a tagged payload and decode it as JSON.
///
/// Decoding failures are [`ResponseParsing`](crate::error::RetryableKind::ResponseParsing)
/// errors. A markdown code fence around the JSON is tolerated.
pub fn extract_json<T: DeserializeOwned>(text: &str, tag: &str) -> Result<T, BuildError> {
    let payload = extract_tagged(text, tag)?;
    let body = strip_code_fence(&payload);
    serde_json::from_str(body)
        .map_err(|e| BuildError::response_parsing(format!("<{tag}> payload is not valid JSON: {e}")))
}

fn strip_code_fence(payload: &str) -> &str {
    let trimmed = payload.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the info string ("json") on the opening fence line
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}
