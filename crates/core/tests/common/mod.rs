//! Shared fixtures for the agent loop tests.

#![allow(dead_code)]

use async_trait::async_trait;
use kalki_core::{Oracle, OracleError};
use kalki_tools::{ActionOutcome, Capability, CapabilityError, Parameters};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Answers from a fixed script, repeating the final entry once the script
/// runs out. Every prompt it receives is kept for inspection.
pub struct ScriptedOracle {
    script: Mutex<VecDeque<Result<String, OracleError>>>,
    last: Mutex<Result<String, OracleError>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    pub fn new(replies: &[&str]) -> Self {
        Self::from_results(replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn from_results(script: Vec<Result<String, OracleError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(Ok(String::new())),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn generate(&self, prompt: &str) -> Result<String, OracleError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            *last = next;
        }
        last.clone()
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Never answers.
pub struct StalledOracle;

#[async_trait]
impl Oracle for StalledOracle {
    async fn generate(&self, _prompt: &str) -> Result<String, OracleError> {
        std::future::pending().await
    }
}

/// Records the parameters of every call and reports success.
pub struct RecordingCapability {
    pub name: &'static str,
    pub calls: AtomicUsize,
    pub seen: Mutex<Vec<Parameters>>,
}

impl RecordingCapability {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Capability for RecordingCapability {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "Records its calls"
    }

    async fn execute(&self, params: Parameters) -> Result<ActionOutcome, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(params.clone());
        Ok(ActionOutcome::ok(Value::Object(params)))
    }
}

/// Fires a cancellation token from inside its own execution, then succeeds.
pub struct CancellingCapability {
    pub token: CancellationToken,
}

#[async_trait]
impl Capability for CancellingCapability {
    fn name(&self) -> &str {
        "stop_all"
    }

    fn description(&self) -> &str {
        "Cancels the running task"
    }

    async fn execute(&self, _params: Parameters) -> Result<ActionOutcome, CapabilityError> {
        self.token.cancel();
        Ok(ActionOutcome::ok_empty())
    }
}
