//! Client for a local Jan server's text-generation API.

use crate::cache::ResponseCache;
use crate::http::{build_client, endpoint, parse_model_ids, send, GenerationOptions};
use async_trait::async_trait;
use kalki_core::{Oracle, OracleError};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "http://localhost:1337";

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    temperature: f32,
    max_tokens: u32,
}

/// Oracle backed by Jan's `/api/generate`.
///
/// The primary model is tried first. If it fails, or replies with empty
/// text, the fallback model gets one attempt. Nothing is retried beyond
/// that.
pub struct JanOracle {
    client: reqwest::Client,
    base_url: String,
    model: String,
    fallback_model: Option<String>,
    options: GenerationOptions,
    cache: Option<ResponseCache>,
}

impl JanOracle {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: build_client(),
            base_url: base_url.into(),
            model: model.into(),
            fallback_model: None,
            options: GenerationOptions::default(),
            cache: None,
        }
    }

    pub fn with_fallback(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        self.fallback_model = (!model.trim().is_empty()).then_some(model);
        self
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    /// Memoize replies for identical prompts, keeping at most `capacity`.
    pub fn with_cache(mut self, capacity: usize) -> Self {
        self.cache = Some(ResponseCache::new(capacity));
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    /// Models installed on the server.
    pub async fn list_models(&self) -> Result<Vec<String>, OracleError> {
        let request = self.client.get(endpoint(&self.base_url, "api/models"));
        let body = send(request, self.options.timeout_secs).await?;
        parse_model_ids(&body)
    }

    async fn generate_with_model(&self, model: &str, prompt: &str) -> Result<String, OracleError> {
        debug!(model, prompt_len = prompt.len(), "Requesting generation");
        let request = self
            .client
            .post(endpoint(&self.base_url, "api/generate"))
            .json(&GenerateRequest {
                model,
                prompt,
                temperature: self.options.temperature,
                max_tokens: self.options.max_tokens,
            });
        let body = send(request, self.options.timeout_secs).await?;
        parse_generate_body(&body)
    }
}

/// Pull the generated text out of a `/api/generate` response. Empty text
/// counts as a failure.
pub fn parse_generate_body(body: &str) -> Result<String, OracleError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| OracleError::InvalidResponse(format!("response is not JSON: {e}")))?;
    let text = value
        .get("text")
        .and_then(Value::as_str)
        .ok_or_else(|| OracleError::InvalidResponse("response has no text field".to_string()))?;
    if text.trim().is_empty() {
        return Err(OracleError::InvalidResponse("empty text".to_string()));
    }
    Ok(text.to_string())
}

fn combine_failures(primary: OracleError, fallback: OracleError) -> OracleError {
    match (&primary, &fallback) {
        (OracleError::Timeout(secs), OracleError::Timeout(_)) => OracleError::Timeout(*secs),
        _ => OracleError::Unavailable(format!(
            "primary and fallback models failed: {primary}; {fallback}"
        )),
    }
}

#[async_trait]
impl Oracle for JanOracle {
    async fn generate(&self, prompt: &str) -> Result<String, OracleError> {
        if let Some(reply) = self.cache.as_ref().and_then(|c| c.get(&self.model, prompt)) {
            debug!(model = %self.model, "Cache hit");
            return Ok(reply);
        }

        let reply = match self.generate_with_model(&self.model, prompt).await {
            Ok(reply) => reply,
            Err(primary_err) => {
                let Some(fallback) = self.fallback_model.as_deref() else {
                    return Err(primary_err);
                };
                warn!(
                    model = %self.model,
                    fallback,
                    "Primary model failed, trying fallback: {}",
                    primary_err
                );
                self.generate_with_model(fallback, prompt)
                    .await
                    .map_err(|e| combine_failures(primary_err, e))?
            }
        };

        if let Some(cache) = &self.cache {
            cache.insert(&self.model, prompt, &reply);
        }
        Ok(reply)
    }

    fn name(&self) -> &str {
        "jan"
    }
}
