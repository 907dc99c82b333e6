//! The reasoning oracle seen from the loop: text in, text out.

use crate::error::OracleError;
use async_trait::async_trait;

/// External reasoning service (an LLM behind some client).
///
/// Implementations own transport concerns such as retries and model
/// fallback; the loop calls `generate` once per round-trip and treats any
/// error as fatal to the task.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, OracleError>;

    fn name(&self) -> &str {
        "oracle"
    }
}
