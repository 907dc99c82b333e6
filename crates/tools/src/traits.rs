//! Capability contract shared by the registry and every plugin.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Keyword arguments handed to a capability.
pub type Parameters = serde_json::Map<String, Value>;

#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
    #[error("Timed out after {0}ms")]
    Timeout(u64),
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Uniform result envelope returned by every capability invocation.
///
/// `data` is meaningful on success, `error` on failure. Both may be absent
/// only for a success without payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionOutcome {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn ok_empty() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    /// One-line rendering used in observations and prompts.
    pub fn summary(&self) -> String {
        match (self.success, &self.data, &self.error) {
            (true, Some(data), _) => data.to_string(),
            (true, None, _) => "no output".to_string(),
            (false, _, Some(err)) => err.clone(),
            (false, _, None) => "unknown error".to_string(),
        }
    }
}

/// A named action handler.
///
/// The registry does not serialize calls: a capability that drives a single
/// physical target (mouse, keyboard) is responsible for tolerating, or
/// rejecting, overlapping invocations itself.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Unique name the oracle uses in action payloads.
    fn name(&self) -> &str;

    /// Description rendered into the available-tools section of prompts.
    fn description(&self) -> &str;

    fn version(&self) -> &str {
        "0.1.0"
    }

    async fn execute(&self, params: Parameters) -> Result<ActionOutcome, CapabilityError>;
}
