//! # Orchestrator
//!
//! The facade a UI talks to: holds the SDK connection settings, builds the
//! six stages from injected collaborators and runs the engine in blocking
//! or streaming mode.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::engine::{RunStatus, WorkflowEngine};
use super::events::WorkflowEvent;
use crate::error::{ConfigError, OrchestratorError};
use crate::llm::tool_agent::ToolExecutor;
use crate::llm::LlmBackend;
use crate::models::{LlmProvider, ModelConfig};
use crate::stages::planning::first_http_url;
use crate::stages::research::DEFAULT_STEP_BUDGET;
use crate::stages::{
    CodeGenerationStage, FinalizationStage, PlanningStage, RefinementStage, ResearchStage, Stage,
    StageId, ValidationStage,
};
use crate::state::{ApiConfig, WorkflowState};
use crate::tools::{
    BrandingExtractor, BrowserValidator, DocsSearch, DocsToolset, Exporter, FileExporter,
    HttpBrandingExtractor, HttpDocsSearch, UnconfiguredDocs,
};

/// Configuration for the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Global LLM provider (default: Anthropic)
    pub global_provider: LlmProvider,
    /// Global model to use for all stages
    pub global_model: Option<String>,
    /// Base URL override for OpenAI-compatible endpoints
    pub base_url: Option<String>,
    /// Per-stage model overrides
    pub per_stage_models: HashMap<StageId, String>,
    /// Per-stage provider overrides
    pub per_stage_providers: HashMap<StageId, LlmProvider>,
    /// Refinement rounds allowed after a failed validation
    pub max_refinement_iterations: u32,
    /// Step ceiling of the research agent
    pub research_step_budget: usize,
    /// Run the headless-browser check during validation
    pub enable_browser_validation: bool,
    /// Where exported pages are written
    pub export_dir: PathBuf,
    /// Documentation search endpoint; research runs without docs when unset
    pub docs_url: Option<String>,
    pub branding_timeout_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            global_provider: LlmProvider::Anthropic,
            global_model: None,
            base_url: None,
            per_stage_models: HashMap::new(),
            per_stage_providers: HashMap::new(),
            max_refinement_iterations: 3,
            research_step_budget: DEFAULT_STEP_BUDGET,
            enable_browser_validation: false,
            export_dir: PathBuf::from("./exports"),
            docs_url: None,
            branding_timeout_secs: 10,
        }
    }
}

impl OrchestratorConfig {
    /// Resolve the model for a stage: stage override, then global, then
    /// the provider default
    pub fn model_config(&self, stage: StageId) -> ModelConfig {
        let provider = self
            .per_stage_providers
            .get(&stage)
            .copied()
            .unwrap_or(self.global_provider);

        let model = self
            .per_stage_models
            .get(&stage)
            .or(self.global_model.as_ref())
            .cloned()
            .unwrap_or_else(|| provider.default_model().to_string());

        let base_url = if provider.supports_base_url() {
            self.base_url.clone()
        } else {
            None
        };

        ModelConfig {
            provider,
            model,
            base_url,
            temperature: stage.default_temperature(),
        }
    }
}

/// External collaborators the stages delegate to
#[derive(Clone)]
pub struct Collaborators {
    /// Backend for stages without their own entry in `stage_llms`
    pub llm: Arc<dyn LlmBackend>,
    pub stage_llms: HashMap<StageId, Arc<dyn LlmBackend>>,
    pub branding: Arc<dyn BrandingExtractor>,
    /// Tools of the research agent, shared by every run
    pub research_tools: Arc<dyn ToolExecutor>,
    pub validator: Option<Arc<dyn BrowserValidator>>,
    pub exporter: Arc<dyn Exporter>,
}

impl Collaborators {
    /// Production collaborators, with LLM keys read from the environment
    pub fn from_config(config: &OrchestratorConfig) -> Result<Self, ConfigError> {
        let mut stage_llms = HashMap::new();
        for stage in StageId::all() {
            stage_llms.insert(stage, config.model_config(stage).create_llm()?);
        }
        let llm = config.model_config(StageId::Planning).create_llm()?;

        let docs: Arc<dyn DocsSearch> = match &config.docs_url {
            Some(url) => Arc::new(HttpDocsSearch::new(url.clone())),
            None => Arc::new(UnconfiguredDocs),
        };

        Ok(Self {
            llm,
            stage_llms,
            branding: Arc::new(HttpBrandingExtractor::new(Duration::from_secs(
                config.branding_timeout_secs,
            ))),
            research_tools: Arc::new(DocsToolset::new(docs)),
            validator: None,
            exporter: Arc::new(FileExporter::new(config.export_dir.clone())),
        })
    }

    fn llm_for(&self, stage: StageId) -> Arc<dyn LlmBackend> {
        self.stage_llms
            .get(&stage)
            .cloned()
            .unwrap_or_else(|| self.llm.clone())
    }
}

/// Landing page generator facade
pub struct Orchestrator {
    config: OrchestratorConfig,
    engine: WorkflowEngine,
    api_config: RwLock<Option<ApiConfig>>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, collaborators: Collaborators) -> Self {
        let c = &collaborators;
        let mut validation = ValidationStage::new(c.llm_for(StageId::Validation));
        if let Some(browser) = &c.validator {
            validation = validation.with_browser(browser.clone());
        }
        let validation = validation.enabled(config.enable_browser_validation);

        let stages: Vec<Arc<dyn Stage>> = vec![
            Arc::new(PlanningStage::new(
                c.llm_for(StageId::Planning),
                c.branding.clone(),
            )),
            Arc::new(
                ResearchStage::new(c.llm_for(StageId::Research), c.research_tools.clone())
                    .with_step_budget(config.research_step_budget),
            ),
            Arc::new(CodeGenerationStage::new(c.llm_for(StageId::CodeGeneration))),
            Arc::new(validation),
            Arc::new(RefinementStage::new(c.llm_for(StageId::Refinement))),
            Arc::new(FinalizationStage::new(
                c.llm_for(StageId::Finalization),
                c.exporter.clone(),
            )),
        ];

        Self {
            config,
            engine: WorkflowEngine::new(stages),
            api_config: RwLock::new(None),
        }
    }

    /// Orchestrator with production collaborators
    pub fn from_env(config: OrchestratorConfig) -> Result<Self, ConfigError> {
        let collaborators = Collaborators::from_config(&config)?;
        Ok(Self::new(config, collaborators))
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Validate and store the SDK connection settings
    pub fn configure(&self, api_key: &str, sdk_endpoint: &str) -> Result<(), ConfigError> {
        let api = ApiConfig::new(api_key, sdk_endpoint)?;
        info!(endpoint = %api.sdk_endpoint, "SDK connection configured");
        let mut guard = self.api_config.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(api);
        Ok(())
    }

    pub fn is_configured(&self) -> bool {
        self.current_api().is_some()
    }

    fn current_api(&self) -> Option<ApiConfig> {
        self.api_config
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn initial_state(
        &self,
        message: &str,
        website_url: Option<String>,
        max_refinement_iterations: Option<u32>,
    ) -> Result<WorkflowState, OrchestratorError> {
        let api = self.current_api().ok_or(OrchestratorError::NotConfigured)?;
        Ok(WorkflowState::new(
            message,
            website_url,
            max_refinement_iterations.unwrap_or(self.config.max_refinement_iterations),
            Some(api),
        ))
    }

    /// Run a generation to completion.
    ///
    /// A failed run still returns its final state with `error` set.
    pub async fn generate(
        &self,
        message: &str,
        website_url: Option<String>,
        max_refinement_iterations: Option<u32>,
    ) -> Result<WorkflowState, OrchestratorError> {
        self.generate_with_cancel(
            message,
            website_url,
            max_refinement_iterations,
            CancellationToken::new(),
        )
        .await
    }

    #[tracing::instrument(skip(self, message, cancel))]
    pub async fn generate_with_cancel(
        &self,
        message: &str,
        website_url: Option<String>,
        max_refinement_iterations: Option<u32>,
        cancel: CancellationToken,
    ) -> Result<WorkflowState, OrchestratorError> {
        let state = self.initial_state(message, website_url, max_refinement_iterations)?;
        info!(
            request = %message.chars().take(100).collect::<String>(),
            "Starting landing page generation"
        );

        let outcome = self.engine.run(state, cancel).await;
        match outcome.status {
            RunStatus::Completed => Ok(outcome.state),
            RunStatus::Failed(message) => {
                let mut state = outcome.state;
                state.error.get_or_insert(message);
                Ok(state)
            }
            RunStatus::Cancelled => Err(OrchestratorError::Cancelled),
        }
    }

    /// Run a generation, yielding progress events.
    ///
    /// Without SDK settings the stream holds a single `error` event.
    pub fn generate_streaming(
        &self,
        message: &str,
        website_url: Option<String>,
        max_refinement_iterations: Option<u32>,
        cancel: CancellationToken,
    ) -> ReceiverStream<WorkflowEvent> {
        match self.initial_state(message, website_url, max_refinement_iterations) {
            Ok(state) => {
                info!(
                    request = %message.chars().take(100).collect::<String>(),
                    "Starting streaming generation"
                );
                self.engine.run_streaming(state, cancel)
            }
            Err(e) => {
                let (tx, rx) = mpsc::channel(1);
                let _ = tx.try_send(WorkflowEvent::Error {
                    message: e.to_string(),
                });
                ReceiverStream::new(rx)
            }
        }
    }

    /// Chat-style entry point: never fails, returns a short report
    pub async fn process_message(&self, message: &str) -> String {
        let url = first_http_url(message);
        match self.generate(message, url, None).await {
            Ok(state) => match (&state.export_path, &state.error) {
                (Some(path), _) => chat_report(path, &state),
                (None, Some(e)) => format!("❌ Error: {}", e),
                (None, None) => "❌ Error: the landing page was not exported".to_string(),
            },
            Err(e) => {
                error!("Error processing message: {}", e);
                format!("❌ Error: {}", e)
            }
        }
    }
}

fn chat_report(path: &str, state: &WorkflowState) -> String {
    let features = match &state.generated_code {
        Some(code) if !code.features_implemented.is_empty() => code
            .features_implemented
            .iter()
            .map(|f| format!("- {}", f))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => "- No features listed".to_string(),
    };

    let branding = match &state.branding_data {
        None => "- Default Braze branding used".to_string(),
        Some(b) => {
            let mut lines = Vec::new();
            if let Some(url) = &b.website_url {
                lines.push(format!("- Website: {}", url));
            }
            lines.push(format!("- Primary Color: {}", b.colors.primary));
            lines.push(format!("- Accent Color: {}", b.colors.accent));
            if b.fallback_used {
                lines.push("- (Fallback to default branding - website blocked scraping)".to_string());
            }
            lines.join("\n")
        }
    };

    format!(
        "✅ Landing page generated successfully!\n\n**Export Path**: {}\n\n**Features Implemented**:\n{}\n\n**Branding**:\n{}\n\nOpen the HTML file in your browser to test the landing page.",
        path, features, branding
    )
}
