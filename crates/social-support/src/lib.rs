pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;

pub use config::AppConfig;
pub use error::AppError;

use std::sync::Arc;

use tracing::info;

use crate::config::{AuthorityConfig, ConfigError, GenerationConfig};
use crate::workflows::assistance::validation::ValidationCoordinator;
use crate::workflows::assistance::{
    Authority, CheckKind, DisabledTextGenerator, EligibilityScorer, HttpAuthority,
    OfflineAuthority, OllamaTextGenerator, PipelineOrchestrator, ReconciliationPolicy,
    TextGenerator,
};

/// Assemble the pipeline from configuration. The eligibility model is loaded here and a
/// load failure is returned to the caller, which is expected to stop the process.
pub fn build_orchestrator(config: &AppConfig) -> Result<PipelineOrchestrator, AppError> {
    let scorer = EligibilityScorer::load(
        &config.pipeline.model_path,
        config.pipeline.eligibility_cutoff,
    )?;
    info!(
        model_version = scorer.model_version(),
        cutoff = scorer.cutoff(),
        "eligibility model loaded"
    );

    let mut validation = validation_coordinator(&config.authorities)?;
    if config.pipeline.demo_sentinels {
        info!("demo sentinel failures enabled for authority checks");
        validation = validation.with_demo_sentinels();
    }

    Ok(PipelineOrchestrator::new(Arc::new(scorer))
        .with_reconciliation_policy(ReconciliationPolicy {
            amount_tolerance: config.pipeline.income_tolerance,
            address_similarity: config.pipeline.address_similarity,
        })
        .with_validation(validation)
        .with_text_generator(text_generator(&config.generation)?))
}

fn authority(
    kind: CheckKind,
    variable: &'static str,
    url: Option<&str>,
    config: &AuthorityConfig,
) -> Result<Arc<dyn Authority>, ConfigError> {
    match url {
        Some(endpoint) => {
            let client = HttpAuthority::new(kind, endpoint, config.timeout).map_err(|err| {
                ConfigError::Client {
                    variable,
                    message: err.to_string(),
                }
            })?;
            info!(check = kind.label(), endpoint, "authority client configured");
            Ok(Arc::new(client))
        }
        None => Ok(Arc::new(OfflineAuthority::new(kind))),
    }
}

fn validation_coordinator(config: &AuthorityConfig) -> Result<ValidationCoordinator, ConfigError> {
    Ok(ValidationCoordinator::new(
        authority(
            CheckKind::Identity,
            "APP_IDENTITY_AUTHORITY_URL",
            config.identity_url.as_deref(),
            config,
        )?,
        authority(
            CheckKind::Financial,
            "APP_FINANCIAL_AUTHORITY_URL",
            config.financial_url.as_deref(),
            config,
        )?,
        authority(
            CheckKind::Credit,
            "APP_CREDIT_AUTHORITY_URL",
            config.credit_url.as_deref(),
            config,
        )?,
        config.timeout,
    ))
}

fn text_generator(config: &GenerationConfig) -> Result<Arc<dyn TextGenerator>, ConfigError> {
    match &config.base_url {
        Some(base_url) => {
            let client = OllamaTextGenerator::new(base_url, config.model.clone(), config.timeout)
                .map_err(|err| ConfigError::Client {
                    variable: "APP_TEXT_GENERATION_URL",
                    message: err.to_string(),
                })?;
            info!(endpoint = client.endpoint(), model = %config.model, "text generation configured");
            Ok(Arc::new(client))
        }
        None => {
            info!("text generation disabled; narratives and recommendations will be empty");
            Ok(Arc::new(DisabledTextGenerator))
        }
    }
}
