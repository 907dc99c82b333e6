//! Plumbing shared by the HTTP oracle clients.

use kalki_core::OracleError;
use serde_json::Value;
use std::time::Duration;

pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 2000;

/// Per-request generation knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

pub(crate) fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

pub(crate) fn map_request_error(err: reqwest::Error, timeout_secs: u64) -> OracleError {
    if err.is_timeout() {
        OracleError::Timeout(timeout_secs)
    } else {
        OracleError::Unavailable(err.to_string())
    }
}

/// Send a request and return the body of a successful response.
pub(crate) async fn send(
    request: reqwest::RequestBuilder,
    timeout_secs: u64,
) -> Result<String, OracleError> {
    let response = request
        .timeout(Duration::from_secs(timeout_secs))
        .send()
        .await
        .map_err(|e| map_request_error(e, timeout_secs))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| map_request_error(e, timeout_secs))?;
    if !status.is_success() {
        return Err(OracleError::Unavailable(format!("HTTP {status}: {}", body.trim())));
    }
    Ok(body)
}

/// Model ids from a listing in any of the shapes local servers use:
/// `{"data": [{"id": ..}]}`, `{"models": [..]}` or a bare array of ids or
/// objects.
pub fn parse_model_ids(body: &str) -> Result<Vec<String>, OracleError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| OracleError::InvalidResponse(format!("model listing is not JSON: {e}")))?;

    let items = match &value {
        Value::Array(items) => items,
        Value::Object(object) => match object.get("data").or_else(|| object.get("models")) {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(OracleError::InvalidResponse(
                    "model listing has no data or models array".to_string(),
                ))
            }
        },
        _ => {
            return Err(OracleError::InvalidResponse(
                "model listing must be an object or array".to_string(),
            ))
        }
    };

    let mut models: Vec<String> = items
        .iter()
        .filter_map(|item| match item {
            Value::String(id) => Some(id.clone()),
            Value::Object(model) => model
                .get("id")
                .or_else(|| model.get("name"))
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        })
        .collect();
    models.sort();
    models.dedup();
    Ok(models)
}
