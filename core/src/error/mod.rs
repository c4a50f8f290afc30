#[allow(clippy::module_inception)]
pub mod error;
pub mod code;
pub mod executor;

pub use code::ErrorCode;
pub use error::{BuildError, NonRetryableKind, RetryableKind};
pub use executor::ExecutorError;
