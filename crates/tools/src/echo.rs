use crate::traits::{ActionOutcome, Capability, CapabilityError, Parameters};
use async_trait::async_trait;
use serde_json::Value;

/// Returns its parameters unchanged. Handy for wiring checks.
pub struct EchoCapability;

#[async_trait]
impl Capability for EchoCapability {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echoes its parameters back"
    }

    async fn execute(&self, params: Parameters) -> Result<ActionOutcome, CapabilityError> {
        Ok(ActionOutcome::ok(Value::Object(params)))
    }
}
