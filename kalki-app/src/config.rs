//! `settings.yaml`: model server, loop tuning and capability setup.

use anyhow::{bail, Context, Result};
use kalki_core::completion::{DEFAULT_COMPLETION_CUES, DEFAULT_COMPLETION_NEGATIONS};
use kalki_core::extractor::{DEFAULT_ACTION_CUES, DEFAULT_PLAN_CUES};
use kalki_core::DEFAULT_MAX_SUBGOALS;
use kalki_providers::GenerationOptions;
use kalki_tools::process::DEFAULT_ALLOWED_COMMANDS;
use kalki_tools::registry::DEFAULT_TIMEOUT_MS;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "settings.yaml";

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelApi {
    /// Jan's `/api/generate`.
    Jan,
    /// `/chat/completions` servers (llama.cpp, vLLM, Ollama, ...).
    OpenAi,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub base_url: String,
    pub api: ModelApi,
    pub default: String,
    pub fallback: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub api_key: Option<String>,
    /// Replies cached per prompt; 0 disables the cache.
    pub cache_size: usize,
}

impl Default for ModelSettings {
    fn default() -> Self {
        let options = GenerationOptions::default();
        Self {
            base_url: "http://localhost:1337".to_string(),
            api: ModelApi::Jan,
            default: "mistral".to_string(),
            fallback: Some("llama2".to_string()),
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            timeout_secs: options.timeout_secs,
            api_key: None,
            cache_size: 0,
        }
    }
}

impl ModelSettings {
    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            timeout_secs: self.timeout_secs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub max_steps: usize,
    pub max_subgoals: usize,
    pub plan_cues: Vec<String>,
    pub action_cues: Vec<String>,
    pub completion_cues: Vec<String>,
    pub completion_negations: Vec<String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_steps: 10,
            max_subgoals: DEFAULT_MAX_SUBGOALS,
            plan_cues: owned(DEFAULT_PLAN_CUES),
            action_cues: owned(DEFAULT_ACTION_CUES),
            completion_cues: owned(DEFAULT_COMPLETION_CUES),
            completion_negations: owned(DEFAULT_COMPLETION_NEGATIONS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilitySettings {
    pub timeout_ms: u64,
    /// Built-ins to register. Empty means all of them.
    pub enabled: Vec<String>,
    /// Programs `run_command` may start.
    pub allowed_commands: Vec<String>,
}

impl Default for CapabilitySettings {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            enabled: Vec::new(),
            allowed_commands: owned(DEFAULT_ALLOWED_COMMANDS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemSettings {
    pub log_level: String,
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub model: ModelSettings,
    pub agent: AgentSettings,
    pub capabilities: CapabilitySettings,
    pub system: SystemSettings,
}

/// Where the settings in use came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsSource {
    File,
    Defaults,
}

impl Settings {
    /// Load `path`, falling back to defaults when it does not exist.
    /// Environment overrides are applied and the result validated.
    pub fn load(path: &Path) -> Result<(Self, SettingsSource)> {
        let (mut settings, source) = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("read {}", path.display()))?;
            let settings =
                Self::from_yaml(&content).with_context(|| format!("parse {}", path.display()))?;
            (settings, SettingsSource::File)
        } else {
            (Self::default(), SettingsSource::Defaults)
        };

        settings.apply_overrides(|key| std::env::var(key).ok());
        settings.validate()?;
        Ok((settings, source))
    }

    /// Parse YAML. A blank document yields the defaults.
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).context("invalid settings YAML")
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("serialize settings")
    }

    /// `KALKI_MODEL_URL` and `KALKI_MODEL` win over the file.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("KALKI_MODEL_URL").filter(|v| !v.trim().is_empty()) {
            self.model.base_url = url;
        }
        if let Some(model) = lookup("KALKI_MODEL").filter(|v| !v.trim().is_empty()) {
            self.model.default = model;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.agent.max_steps == 0 {
            bail!("agent.max_steps must be at least 1");
        }
        if self.model.default.trim().is_empty() {
            bail!("model.default cannot be empty");
        }
        if self.model.base_url.trim().is_empty() {
            bail!("model.base_url cannot be empty");
        }
        if !(0.0..=2.0).contains(&self.model.temperature) {
            bail!(
                "model.temperature must be within 0.0..=2.0, got {}",
                self.model.temperature
            );
        }
        if self.model.timeout_secs == 0 {
            bail!("model.timeout_secs must be at least 1");
        }
        if self.capabilities.timeout_ms == 0 {
            bail!("capabilities.timeout_ms must be at least 1");
        }
        Ok(())
    }
}
