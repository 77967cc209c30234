//! # Models
//!
//! LLM provider selection. Stages share a global [`ModelConfig`] unless the
//! orchestrator configuration overrides the provider or model for a stage.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ConfigError;
use crate::llm::{AnthropicLlm, LlmBackend, OpenAiLlm};

/// Supported LLM providers
///
/// - Anthropic (Claude) - `ANTHROPIC_API_KEY`
/// - OpenAI (GPT) and compatible endpoints - `OPENAI_API_KEY`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Anthropic,
    #[serde(rename = "openai")]
    OpenAI,
}

impl LlmProvider {
    pub fn all() -> Vec<LlmProvider> {
        vec![LlmProvider::Anthropic, LlmProvider::OpenAI]
    }

    /// Display name for UI
    pub fn display_name(&self) -> &'static str {
        match self {
            LlmProvider::Anthropic => "Anthropic",
            LlmProvider::OpenAI => "OpenAI",
        }
    }

    /// Whether this provider supports custom base URL
    pub fn supports_base_url(&self) -> bool {
        matches!(self, LlmProvider::OpenAI)
    }

    /// Environment variable holding the provider's API key
    pub fn api_key_env(&self) -> &'static str {
        match self {
            LlmProvider::Anthropic => "ANTHROPIC_API_KEY",
            LlmProvider::OpenAI => "OPENAI_API_KEY",
        }
    }

    /// Model used when none is configured
    pub fn default_model(&self) -> &'static str {
        match self {
            LlmProvider::Anthropic => "claude-sonnet-4-20250514",
            LlmProvider::OpenAI => "gpt-4o",
        }
    }
}

/// Which LLM backend a stage talks to
///
/// ```rust,ignore
/// use pagegen_core::models::{LlmProvider, ModelConfig};
///
/// let config = ModelConfig::with_provider(LlmProvider::OpenAI, "gpt-4o").with_temperature(0.7);
/// let llm = config.create_llm()?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub provider: LlmProvider,
    /// Model name (e.g., "claude-sonnet-4-20250514", "gpt-4o")
    pub model: String,
    /// Optional base URL override for OpenAI-compatible APIs
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_temperature() -> f32 {
    0.3
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::with_provider(LlmProvider::Anthropic, LlmProvider::Anthropic.default_model())
    }
}

impl ModelConfig {
    pub fn with_provider(provider: LlmProvider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            base_url: None,
            temperature: default_temperature(),
        }
    }

    /// Set base URL (for OpenAI-compatible endpoints)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Create an LLM client, reading the API key from the provider's
    /// environment variable
    pub fn create_llm(&self) -> Result<Arc<dyn LlmBackend>, ConfigError> {
        let key = std::env::var(self.provider.api_key_env())
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingLlmKey(self.provider.display_name().to_string()))?;
        Ok(self.create_llm_with_key(key))
    }

    /// Create an LLM client with an explicit API key
    pub fn create_llm_with_key(&self, key: impl Into<String>) -> Arc<dyn LlmBackend> {
        match self.provider {
            LlmProvider::Anthropic => Arc::new(
                AnthropicLlm::new(key, &self.model).with_temperature(self.temperature),
            ),
            LlmProvider::OpenAI => {
                let mut llm = OpenAiLlm::new(key, &self.model).with_temperature(self.temperature);
                if let Some(base_url) = &self.base_url {
                    llm = llm.with_base_url(base_url);
                }
                Arc::new(llm)
            }
        }
    }
}
