//! Client for OpenAI-compatible chat-completion servers.

use crate::http::{build_client, endpoint, parse_model_ids, send, GenerationOptions};
use async_trait::async_trait;
use kalki_core::{Oracle, OracleError};
use serde_json::{json, Value};
use tracing::debug;

pub struct OpenAiOracle {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    options: GenerationOptions,
}

impl OpenAiOracle {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: build_client(),
            base_url: base_url.into(),
            api_key: None,
            model: model.into(),
            options: GenerationOptions::default(),
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|key| !key.trim().is_empty());
        self
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    pub async fn list_models(&self) -> Result<Vec<String>, OracleError> {
        let request = self.authorized(self.client.get(endpoint(&self.base_url, "models")));
        let body = send(request, self.options.timeout_secs).await?;
        parse_model_ids(&body)
    }
}

/// `choices[0].message.content` of a chat-completion response.
pub fn parse_chat_body(body: &str) -> Result<String, OracleError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| OracleError::InvalidResponse(format!("response is not JSON: {e}")))?;
    let choice = value
        .get("choices")
        .and_then(|c| c.get(0))
        .ok_or_else(|| OracleError::InvalidResponse("no choices in response".to_string()))?;
    match choice.pointer("/message/content").and_then(Value::as_str) {
        Some(content) if !content.trim().is_empty() => Ok(content.to_string()),
        _ => Err(OracleError::InvalidResponse(
            "choice has no message content".to_string(),
        )),
    }
}

#[async_trait]
impl Oracle for OpenAiOracle {
    async fn generate(&self, prompt: &str) -> Result<String, OracleError> {
        debug!(model = %self.model, prompt_len = prompt.len(), "Requesting chat completion");
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": self.options.temperature,
            "max_tokens": self.options.max_tokens,
        });
        let request = self.authorized(
            self.client
                .post(endpoint(&self.base_url, "chat/completions"))
                .json(&body),
        );
        let body = send(request, self.options.timeout_secs).await?;
        parse_chat_body(&body)
    }

    fn name(&self) -> &str {
        "openai-compatible"
    }
}
