/// Stable numeric codes surfaced in JSONL events and CLI exit statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    Success = 0,
    GeneralError = 1,
    ParseError = 2,
    ValidationError = 3,
    TaskNotFound = 10,
    DependencyError = 11,
    CircularDependency = 12,
    ManifestMismatch = 13,
    TaskNotReady = 14,
    ServiceUnavailable = 20,
    RateLimited = 22,
    ResponseTagMissing = 23,
    Timeout = 30,
    ConfigMissing = 40,
    InvalidParameter = 41,
    FileNotFound = 60,
    FileWriteFailed = 61,
    VerificationFailed = 62,
    PathRejected = 65,
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}
