use std::sync::Arc;

use anyhow::{bail, Result};

use buildseq_core::api::{
    AppConfig, BuildHandler, GenerationConfig, GenerationService, HandlerRegistry,
    OutputRendererPlugin, RetryConfig, RetryStrategyPlugin, Verifier, VerifierConfig,
};

use crate::executor::{
    ExponentialBackoffPlugin, JsonlRendererPlugin, LinearRetryPlugin, TextRendererPlugin,
};
use crate::generation::HttpGenerationService;
use crate::handlers::{
    DocumentHandler, FileDependenciesHandler, FileStructureHandler, GenerateArtifactsHandler,
    HandlerServices, ProjectSetupHandler,
};
use crate::verifier::CommandVerifier;

pub fn build_generation(cfg: &GenerationConfig) -> Result<Arc<dyn GenerationService>> {
    Ok(Arc::new(HttpGenerationService::from_config(cfg)?))
}

pub fn build_verifier(cfg: &VerifierConfig) -> Arc<dyn Verifier> {
    Arc::new(CommandVerifier::from_config(cfg))
}

/// Generation and verification collaborators wired from config.
pub fn build_services(cfg: &AppConfig) -> Result<Arc<HandlerServices>> {
    Ok(Arc::new(HandlerServices::new(
        build_generation(&cfg.generation)?,
        build_verifier(&cfg.verifier),
        cfg.clone(),
    )))
}

pub fn builtin_handlers(services: Arc<HandlerServices>) -> Vec<Arc<dyn BuildHandler>> {
    vec![
        Arc::new(ProjectSetupHandler::new(Arc::clone(&services))),
        Arc::new(DocumentHandler::new(Arc::clone(&services))),
        Arc::new(FileStructureHandler::new(Arc::clone(&services))),
        Arc::new(FileDependenciesHandler::new(Arc::clone(&services))),
        Arc::new(GenerateArtifactsHandler::new(services)),
    ]
}

pub fn build_registry(services: Arc<HandlerServices>) -> Arc<HandlerRegistry> {
    Arc::new(HandlerRegistry::new(builtin_handlers(services)))
}

/// `None` when the `[retry]` section is absent.
pub fn build_retry_strategy(
    cfg: Option<&RetryConfig>,
) -> Result<Option<Arc<dyn RetryStrategyPlugin>>> {
    let Some(cfg) = cfg else {
        return Ok(None);
    };
    let strategy: Arc<dyn RetryStrategyPlugin> = match cfg.strategy.as_str() {
        "exponential-backoff" => Arc::new(ExponentialBackoffPlugin::new(cfg.clone())),
        "linear" => Arc::new(LinearRetryPlugin::new(cfg.clone())),
        other => bail!("unknown retry strategy '{other}' (expected exponential-backoff or linear)"),
    };
    Ok(Some(strategy))
}

/// `none` disables rendering. Anything other than `jsonl` renders text.
pub fn build_renderer(format: &str, ascii_only: bool) -> Option<Arc<dyn OutputRendererPlugin>> {
    match format {
        "none" => None,
        "jsonl" => Some(Arc::new(JsonlRendererPlugin::new(false))),
        _ => Some(Arc::new(TextRendererPlugin::new(ascii_only))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{
        DOCUMENT, FILE_DEPENDENCIES, FILE_STRUCTURE, GENERATE_ARTIFACTS, PROJECT_SETUP,
    };

    fn config_with_endpoint() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.generation.base_url = "http://127.0.0.1:9/v1".to_string();
        cfg
    }

    #[test]
    fn registry_holds_every_builtin_handler() {
        let services = build_services(&config_with_endpoint()).unwrap();
        let registry = build_registry(services);

        for id in [
            PROJECT_SETUP,
            DOCUMENT,
            FILE_STRUCTURE,
            FILE_DEPENDENCIES,
            GENERATE_ARTIFACTS,
        ] {
            assert!(registry.contains(id), "{id} missing");
        }
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn missing_endpoint_is_a_config_error() {
        let err = build_services(&AppConfig::default()).err().unwrap();
        assert!(err.to_string().contains("base_url"), "{err}");
    }

    #[test]
    fn retry_strategy_follows_config() {
        assert!(build_retry_strategy(None).unwrap().is_none());

        let linear = RetryConfig {
            strategy: "linear".to_string(),
            ..RetryConfig::default()
        };
        let plugin = build_retry_strategy(Some(&linear)).unwrap().unwrap();
        assert_eq!(plugin.name(), "linear");

        let plugin = build_retry_strategy(Some(&RetryConfig::default()))
            .unwrap()
            .unwrap();
        assert_eq!(plugin.name(), "exponential-backoff");

        let bogus = RetryConfig {
            strategy: "fibonacci".to_string(),
            ..RetryConfig::default()
        };
        assert!(build_retry_strategy(Some(&bogus)).is_err());
    }

    #[test]
    fn renderer_follows_format() {
        assert!(build_renderer("none", false).is_none());
        assert_eq!(build_renderer("jsonl", false).unwrap().format(), "jsonl");
        assert_eq!(build_renderer("text", true).unwrap().format(), "text");
    }
}
