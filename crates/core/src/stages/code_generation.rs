//! # Code Generation Stage
//!
//! Builds the SDK-initialized base template and asks the model to turn it
//! into the complete landing page. A failure here ends the run.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info};

use super::prompts::{self, render};
use super::{cancelled_update, Stage, StageContext, StageId};
use crate::html::{base_template, normalize_html};
use crate::llm::LlmBackend;
use crate::state::{FeaturePlan, GeneratedCode, NextStep, StateUpdate, WorkflowState};

pub struct CodeGenerationStage {
    llm: Arc<dyn LlmBackend>,
}

impl CodeGenerationStage {
    pub fn new(llm: Arc<dyn LlmBackend>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Stage for CodeGenerationStage {
    fn id(&self) -> StageId {
        StageId::CodeGeneration
    }

    async fn process(&self, state: &WorkflowState, ctx: &StageContext) -> StateUpdate {
        let (Some(plan), Some(api)) = (&state.feature_plan, &state.api_config) else {
            error!("Missing required data for code generation");
            return StateUpdate::failure(
                "Missing feature plan or API config",
                NextStep::ErrorHandler,
            );
        };
        let branding = state.branding_data.clone().unwrap_or_default();

        let base = base_template(api, &branding, &plan.page_title);
        let research_summary = match &state.research_results {
            Some(r) if !r.summary.trim().is_empty() => r.summary.as_str(),
            Some(_) => "No research results available",
            None => "No research was conducted",
        };
        let features = plan_details(plan);
        let system = render(
            prompts::CODE_GENERATION,
            &[
                ("feature_plan", &features),
                ("research_summary", research_summary),
                ("primary_color", &branding.colors.primary),
                ("secondary_color", &branding.colors.secondary),
                ("accent_color", &branding.colors.accent),
                ("background_color", &branding.colors.background),
                ("text_color", &branding.colors.text),
                ("primary_font", &branding.typography.primary_font),
                ("heading_font", &branding.typography.heading_font),
            ],
        );
        let prompt = format!(
            "Generate the complete HTML landing page.\n\nBase template:\n{}",
            base
        );

        ctx.status(StageId::CodeGeneration, "Writing landing page");
        let sink = ctx.token_sink(StageId::CodeGeneration);
        let Ok(result) = ctx
            .guard(self.llm.complete(&system, &prompt, sink.as_deref()))
            .await
        else {
            return cancelled_update();
        };

        match result.map(|raw| normalize_html(&raw)) {
            Ok(html) if !html.is_empty() => {
                info!(chars = html.len(), "Generated HTML");
                StateUpdate {
                    generated_code: Some(GeneratedCode {
                        html,
                        sdk_initialized: true,
                        features_implemented: plan.feature_names(),
                    }),
                    ..StateUpdate::route(NextStep::Validation)
                }
            }
            Ok(_) => StateUpdate::failure(
                "Code generation failed: model returned no HTML",
                NextStep::ErrorHandler,
            ),
            Err(e) => {
                error!("Error generating code: {:#}", e);
                StateUpdate::failure(
                    format!("Code generation failed: {}", e),
                    NextStep::ErrorHandler,
                )
            }
        }
    }
}

fn plan_details(plan: &FeaturePlan) -> String {
    let mut lines = vec![
        format!("**Page**: {}", plan.page_title),
        format!("**Description**: {}", plan.page_description),
        "\n**Features to Implement:**\n".to_string(),
    ];
    for (i, feature) in plan.features.iter().enumerate() {
        lines.push(format!("{}. **{}**", i + 1, feature.name));
        lines.push(format!("   Description: {}", feature.description));
        lines.push(format!("   SDK Methods: {}", feature.sdk_methods.join(", ")));
        if !feature.implementation_notes.is_empty() {
            lines.push(format!("   Notes: {}", feature.implementation_notes));
        }
        lines.push(format!("   Priority: {}", feature.priority));
        lines.push(String::new());
    }
    lines.join("\n")
}
