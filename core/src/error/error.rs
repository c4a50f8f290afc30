use std::fmt;

use thiserror::Error;

use super::code::ErrorCode;

/// Failures a caller may reasonably retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryableKind {
    ServiceUnavailable,
    RateLimited,
    /// A tagged payload was found but could not be decoded.
    ResponseParsing,
    /// The delimiting tag pair was missing from a response.
    ResponseTag,
    Timeout,
    /// Kahn layering finished with nodes that never reached in-degree zero.
    UnresolvedLayering,
}

/// Failures that will not change on retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonRetryableKind {
    MissingConfiguration,
    InvalidParameter,
    FileWrite,
    FileNotFound,
    DependencyCycle,
    ManifestValidation,
    PathRejected,
    HandlerNotFound,
    TaskNotReady,
    MissingResult,
    /// An artifact exhausted its fix budget under fail-fast.
    VerificationFailed,
}

impl fmt::Display for RetryableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ServiceUnavailable => "service unavailable",
            Self::RateLimited => "rate limited",
            Self::ResponseParsing => "response parsing error",
            Self::ResponseTag => "response tag error",
            Self::Timeout => "timeout",
            Self::UnresolvedLayering => "unresolved layering",
        };
        f.write_str(s)
    }
}

impl fmt::Display for NonRetryableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::MissingConfiguration => "missing configuration",
            Self::InvalidParameter => "invalid parameter",
            Self::FileWrite => "file write failed",
            Self::FileNotFound => "file not found",
            Self::DependencyCycle => "dependency cycle",
            Self::ManifestValidation => "manifest validation failed",
            Self::PathRejected => "path rejected",
            Self::HandlerNotFound => "handler not found",
            Self::TaskNotReady => "task not ready",
            Self::MissingResult => "missing result",
            Self::VerificationFailed => "verification failed",
        };
        f.write_str(s)
    }
}

/// The error every handler, collaborator and loop in the engine reports.
///
/// Handlers classify each failure into one of the two arms before it leaves
/// them; retry decisions downstream only look at [`BuildError::is_retryable`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("{kind}: {message}")]
    Retryable {
        kind: RetryableKind,
        message: String,
    },

    #[error("{kind}: {message}")]
    NonRetryable {
        kind: NonRetryableKind,
        message: String,
    },
}

impl BuildError {
    pub fn retryable(kind: RetryableKind, message: impl Into<String>) -> Self {
        Self::Retryable {
            kind,
            message: message.into(),
        }
    }

    pub fn non_retryable(kind: NonRetryableKind, message: impl Into<String>) -> Self {
        Self::NonRetryable {
            kind,
            message: message.into(),
        }
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::retryable(RetryableKind::ServiceUnavailable, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::retryable(RetryableKind::RateLimited, message)
    }

    pub fn response_parsing(message: impl Into<String>) -> Self {
        Self::retryable(RetryableKind::ResponseParsing, message)
    }

    pub fn response_tag(message: impl Into<String>) -> Self {
        Self::retryable(RetryableKind::ResponseTag, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::retryable(RetryableKind::Timeout, message)
    }

    pub fn missing_config(message: impl Into<String>) -> Self {
        Self::non_retryable(NonRetryableKind::MissingConfiguration, message)
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::non_retryable(NonRetryableKind::InvalidParameter, message)
    }

    pub fn file_write(message: impl Into<String>) -> Self {
        Self::non_retryable(NonRetryableKind::FileWrite, message)
    }

    pub fn file_not_found(message: impl Into<String>) -> Self {
        Self::non_retryable(NonRetryableKind::FileNotFound, message)
    }

    pub fn path_rejected(message: impl Into<String>) -> Self {
        Self::non_retryable(NonRetryableKind::PathRejected, message)
    }

    pub fn missing_result(task_id: &str) -> Self {
        Self::non_retryable(
            NonRetryableKind::MissingResult,
            format!("no completed result for task '{task_id}'"),
        )
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Retryable { message, .. } | Self::NonRetryable { message, .. } => message,
        }
    }

    /// Map to the protocol error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Retryable { kind, .. } => match kind {
                RetryableKind::ServiceUnavailable => ErrorCode::ServiceUnavailable,
                RetryableKind::RateLimited => ErrorCode::RateLimited,
                RetryableKind::ResponseParsing => ErrorCode::ParseError,
                RetryableKind::ResponseTag => ErrorCode::ResponseTagMissing,
                RetryableKind::Timeout => ErrorCode::Timeout,
                RetryableKind::UnresolvedLayering => ErrorCode::DependencyError,
            },
            Self::NonRetryable { kind, .. } => match kind {
                NonRetryableKind::MissingConfiguration => ErrorCode::ConfigMissing,
                NonRetryableKind::InvalidParameter => ErrorCode::InvalidParameter,
                NonRetryableKind::FileWrite => ErrorCode::FileWriteFailed,
                NonRetryableKind::FileNotFound => ErrorCode::FileNotFound,
                NonRetryableKind::DependencyCycle => ErrorCode::CircularDependency,
                NonRetryableKind::ManifestValidation => ErrorCode::ManifestMismatch,
                NonRetryableKind::PathRejected => ErrorCode::PathRejected,
                NonRetryableKind::HandlerNotFound => ErrorCode::TaskNotFound,
                NonRetryableKind::TaskNotReady => ErrorCode::TaskNotReady,
                NonRetryableKind::MissingResult => ErrorCode::DependencyError,
                NonRetryableKind::VerificationFailed => ErrorCode::VerificationFailed,
            },
        }
    }
}

impl From<std::io::Error> for BuildError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::file_not_found(err.to_string())
        } else {
            Self::file_write(err.to_string())
        }
    }
}

impl From<serde_json::Error> for BuildError {
    fn from(err: serde_json::Error) -> Self {
        Self::response_parsing(err.to_string())
    }
}
