pub mod command;

pub use command::CommandVerifier;
