//! # Workflow State
//!
//! The single record threaded through one generation run. Stages never
//! mutate it directly: each returns a [`StateUpdate`] that the engine merges
//! before invoking the next stage.

use serde::{Deserialize, Serialize};

use super::types::{
    ApiConfig, BrandingData, ChatMessage, FeaturePlan, GeneratedCode, ResearchResult, Role,
    ValidationReport,
};

/// Routing hint a stage attaches to its update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextStep {
    Research,
    CodeGeneration,
    Validation,
    Refine,
    Finalize,
    ErrorHandler,
    End,
}

/// Shared state for one run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowState {
    /// Conversation turns, append-only
    pub messages: Vec<ChatMessage>,
    /// Customer site, fixed once resolved
    pub customer_website_url: Option<String>,
    pub branding_data: Option<BrandingData>,
    pub feature_plan: Option<FeaturePlan>,
    pub research_results: Option<ResearchResult>,
    pub generated_code: Option<GeneratedCode>,
    pub validation_report: Option<ValidationReport>,
    pub validation_passed: bool,
    /// Number of refinement passes so far
    pub refinement_iteration: u32,
    pub max_refinement_iterations: u32,
    pub api_config: Option<ApiConfig>,
    /// Last absorbed or fatal failure
    pub error: Option<String>,
    pub next_step: Option<NextStep>,
    pub export_path: Option<String>,
    pub is_complete: bool,
}

impl WorkflowState {
    /// Fresh state for a user request
    pub fn new(
        user_message: impl Into<String>,
        website_url: Option<String>,
        max_refinement_iterations: u32,
        api_config: Option<ApiConfig>,
    ) -> Self {
        Self {
            messages: vec![ChatMessage::user(user_message)],
            customer_website_url: website_url.filter(|u| !u.trim().is_empty()),
            max_refinement_iterations,
            api_config,
            ..Self::default()
        }
    }

    /// Most recent user turn, or empty
    pub fn latest_user_message(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }

    /// Shallow merge of a partial update.
    ///
    /// Present fields overwrite, absent fields are kept, and messages are
    /// appended. An update without an error clears the previous one. The
    /// website URL is only taken when none is set yet.
    pub fn merge(&mut self, update: StateUpdate) {
        self.messages.extend(update.messages);

        if self.customer_website_url.is_none() {
            if let Some(url) = update.customer_website_url {
                self.customer_website_url = Some(url);
            }
        }
        if let Some(v) = update.branding_data {
            self.branding_data = Some(v);
        }
        if let Some(v) = update.feature_plan {
            self.feature_plan = Some(v);
        }
        if let Some(v) = update.research_results {
            self.research_results = Some(v);
        }
        if let Some(v) = update.generated_code {
            self.generated_code = Some(v);
        }
        if let Some(v) = update.validation_report {
            self.validation_report = Some(v);
        }
        if let Some(v) = update.validation_passed {
            self.validation_passed = v;
        }
        if let Some(v) = update.refinement_iteration {
            // never decreases
            self.refinement_iteration = self.refinement_iteration.max(v);
        }
        if let Some(v) = update.export_path {
            self.export_path = Some(v);
        }
        if let Some(v) = update.is_complete {
            self.is_complete = v;
        }
        if update.next_step.is_some() {
            self.next_step = update.next_step;
        }
        self.error = update.error;
    }
}

/// Partial update returned by a stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<ChatMessage>,
    pub customer_website_url: Option<String>,
    pub branding_data: Option<BrandingData>,
    pub feature_plan: Option<FeaturePlan>,
    pub research_results: Option<ResearchResult>,
    pub generated_code: Option<GeneratedCode>,
    pub validation_report: Option<ValidationReport>,
    pub validation_passed: Option<bool>,
    pub refinement_iteration: Option<u32>,
    pub error: Option<String>,
    pub next_step: Option<NextStep>,
    pub export_path: Option<String>,
    pub is_complete: Option<bool>,
}

impl StateUpdate {
    /// Update carrying only a routing hint
    pub fn route(next: NextStep) -> Self {
        Self {
            next_step: Some(next),
            ..Self::default()
        }
    }

    /// Update reporting a failure with a fallback route
    pub fn failure(error: impl Into<String>, next: NextStep) -> Self {
        Self {
            error: Some(error.into()),
            next_step: Some(next),
            ..Self::default()
        }
    }

    pub fn with_message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }
}
