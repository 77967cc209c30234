//! Persisted server settings at `.pagegen/config.json`.
//!
//! Every field is optional; unset fields leave the orchestrator default in
//! place.

use pagegen_core::{LlmProvider, OrchestratorConfig, StageId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const CONFIG_PATH: &str = ".pagegen/config.json";

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PersistedConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_provider: Option<LlmProvider>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_refinement_iterations: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub research_step_budget: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_browser_validation: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_url: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub per_stage_providers: HashMap<StageId, LlmProvider>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub per_stage_models: HashMap<StageId, String>,
}

impl PersistedConfig {
    pub async fn load() -> Self {
        Self::load_from(Path::new(CONFIG_PATH)).await
    }

    /// Missing or unreadable files yield the empty config
    pub async fn load_from(path: &Path) -> Self {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring malformed {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub async fn save(&self) -> Result<(), std::io::Error> {
        self.save_to(Path::new(CONFIG_PATH)).await
    }

    pub async fn save_to(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        tokio::fs::write(path, content).await
    }

    /// Overlay the fields set in `other`
    pub fn merge(&mut self, other: PersistedConfig) {
        if other.global_provider.is_some() {
            self.global_provider = other.global_provider;
        }
        if other.global_model.is_some() {
            self.global_model = other.global_model;
        }
        if other.base_url.is_some() {
            self.base_url = other.base_url;
        }
        if other.max_refinement_iterations.is_some() {
            self.max_refinement_iterations = other.max_refinement_iterations;
        }
        if other.research_step_budget.is_some() {
            self.research_step_budget = other.research_step_budget;
        }
        if other.enable_browser_validation.is_some() {
            self.enable_browser_validation = other.enable_browser_validation;
        }
        if other.export_dir.is_some() {
            self.export_dir = other.export_dir;
        }
        if other.docs_url.is_some() {
            self.docs_url = other.docs_url;
        }
        self.per_stage_providers.extend(other.per_stage_providers);
        self.per_stage_models.extend(other.per_stage_models);
    }

    pub fn into_orchestrator_config(self) -> OrchestratorConfig {
        let mut config = OrchestratorConfig::default();
        if let Some(provider) = self.global_provider {
            config.global_provider = provider;
        }
        config.global_model = self.global_model;
        config.base_url = self.base_url;
        if let Some(max) = self.max_refinement_iterations {
            config.max_refinement_iterations = max;
        }
        if let Some(budget) = self.research_step_budget {
            config.research_step_budget = budget;
        }
        if let Some(enabled) = self.enable_browser_validation {
            config.enable_browser_validation = enabled;
        }
        if let Some(dir) = self.export_dir {
            config.export_dir = dir;
        }
        config.docs_url = self.docs_url;
        config.per_stage_providers = self.per_stage_providers;
        config.per_stage_models = self.per_stage_models;
        config
    }
}
