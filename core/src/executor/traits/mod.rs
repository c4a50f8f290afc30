pub mod handler;
pub mod renderer;
pub mod strategy;

pub use handler::*;
pub use renderer::*;
pub use strategy::*;
