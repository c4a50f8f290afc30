pub mod http;

pub use http::HttpGenerationService;
