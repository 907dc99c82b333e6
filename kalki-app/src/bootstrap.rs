//! Wiring settings into a registry, an oracle and an agent loop.

use crate::config::{AgentSettings, CapabilitySettings, ModelApi, ModelSettings};
use kalki_core::{AgentLoop, KeywordCompletion, Oracle, OracleError, ThoughtExtractor};
use kalki_providers::{JanOracle, OpenAiOracle};
use kalki_tools::{builtin_capabilities, CapabilityRegistry};
use std::sync::Arc;
use tracing::{info, warn};

/// Registry holding the enabled built-ins.
pub fn build_registry(settings: &CapabilitySettings) -> Arc<CapabilityRegistry> {
    let registry = Arc::new(CapabilityRegistry::with_timeout(settings.timeout_ms));
    let builtins = builtin_capabilities(&settings.allowed_commands);

    for name in &settings.enabled {
        if !builtins.iter().any(|c| c.name() == name) {
            warn!(capability = %name, "Enabled capability is not a built-in, ignoring");
        }
    }

    for capability in builtins {
        let wanted = settings.enabled.is_empty()
            || settings.enabled.iter().any(|name| name == capability.name());
        if wanted {
            registry.register_capability(capability);
        }
    }
    info!(count = registry.len(), "Capability registry ready");
    registry
}

fn jan(settings: &ModelSettings) -> JanOracle {
    let mut oracle = JanOracle::new(&settings.base_url, &settings.default)
        .with_options(settings.generation_options());
    if let Some(fallback) = &settings.fallback {
        oracle = oracle.with_fallback(fallback);
    }
    if settings.cache_size > 0 {
        oracle = oracle.with_cache(settings.cache_size);
    }
    oracle
}

fn openai(settings: &ModelSettings) -> OpenAiOracle {
    OpenAiOracle::new(&settings.base_url, &settings.default)
        .with_api_key(settings.api_key.clone())
        .with_options(settings.generation_options())
}

pub fn build_oracle(settings: &ModelSettings) -> Arc<dyn Oracle> {
    info!(
        api = ?settings.api,
        base_url = %settings.base_url,
        model = %settings.default,
        "Using model server"
    );
    match settings.api {
        ModelApi::Jan => Arc::new(jan(settings)),
        ModelApi::OpenAi => Arc::new(openai(settings)),
    }
}

/// Models the configured server offers.
pub async fn list_models(settings: &ModelSettings) -> Result<Vec<String>, OracleError> {
    match settings.api {
        ModelApi::Jan => jan(settings).list_models().await,
        ModelApi::OpenAi => openai(settings).list_models().await,
    }
}

pub fn build_agent(
    settings: &AgentSettings,
    oracle: Arc<dyn Oracle>,
    registry: Arc<CapabilityRegistry>,
) -> AgentLoop {
    AgentLoop::new(oracle, registry)
        .with_extractor(ThoughtExtractor::with_cues(
            &settings.plan_cues,
            &settings.action_cues,
        ))
        .with_completion_policy(Arc::new(KeywordCompletion::new(
            &settings.completion_cues,
            &settings.completion_negations,
        )))
        .with_max_subgoals(settings.max_subgoals)
}
