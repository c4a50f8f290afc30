use serde::{Deserialize, Serialize};

use crate::error::BuildError;
use crate::generation::extract_json;

/// Tag that wraps a fix operation in a generation response.
pub const FIX_TAG: &str = "fix";

/// The single repair a generation service proposes for a failing artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum FixOperation {
    /// Replace the file's content.
    #[serde(alias = "rewrite")]
    Write { content: String },

    /// Move the file, optionally replacing its content in the same step.
    Rename {
        from: String,
        to: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
    },

    /// Ask for declared dependency files before proposing a fix.
    #[serde(alias = "read_more_context")]
    Read { paths: Vec<String> },
}

impl FixOperation {
    pub fn parse(response: &str) -> Result<Self, BuildError> {
        extract_json(response, FIX_TAG)
    }

    /// Wrap in the response tag, as a service would send it.
    pub fn to_response(&self) -> Result<String, BuildError> {
        let body = serde_json::to_string(self)?;
        Ok(format!("<{FIX_TAG}>{body}</{FIX_TAG}>"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_operation_parses() {
        assert_eq!(
            FixOperation::parse(r#"<fix>{"operation": "write", "content": "x"}</fix>"#).unwrap(),
            FixOperation::Write {
                content: "x".into()
            }
        );
        assert_eq!(
            FixOperation::parse(r#"ok <fix>{"operation":"rename","from":"a.js","to":"a.jsx"}</fix>"#)
                .unwrap(),
            FixOperation::Rename {
                from: "a.js".into(),
                to: "a.jsx".into(),
                content: None
            }
        );
        assert_eq!(
            FixOperation::parse(r#"<fix>{"operation":"read_more_context","paths":["b.ts"]}</fix>"#)
                .unwrap(),
            FixOperation::Read {
                paths: vec!["b.ts".into()]
            }
        );
    }

    #[test]
    fn unknown_operation_is_parse_error() {
        let err = FixOperation::parse(r#"<fix>{"operation":"delete"}</fix>"#).unwrap_err();
        assert!(err.is_retryable());
    }
}
