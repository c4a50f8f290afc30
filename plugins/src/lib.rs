pub mod executor;
pub mod factory;
pub mod generation;
pub mod handlers;
pub mod verifier;
