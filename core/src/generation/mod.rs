//! Interface to the external text generation service.

mod metered;
mod tags;
mod types;

pub use metered::{estimate_tokens, MeteredGeneration};
pub use tags::{extract_json, extract_tagged};
pub use types::{GenerationRequest, GenerationResponse, GenerationService, Message, Role, TokenUsage};
