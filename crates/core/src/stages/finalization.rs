//! # Finalization Stage
//!
//! Best-effort production polish, export through the [`Exporter`], and the
//! success summary shown to the user. This is the only stage that completes
//! a run.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::prompts::{self, render};
use super::{cancelled_update, code_summary, Stage, StageContext, StageId};
use crate::html::normalize_html;
use crate::llm::LlmBackend;
use crate::state::{
    BrandingData, ChatMessage, FeaturePlan, GeneratedCode, NextStep, StateUpdate, WorkflowState,
};
use crate::tools::Exporter;

pub struct FinalizationStage {
    llm: Arc<dyn LlmBackend>,
    exporter: Arc<dyn Exporter>,
}

impl FinalizationStage {
    pub fn new(llm: Arc<dyn LlmBackend>, exporter: Arc<dyn Exporter>) -> Self {
        Self { llm, exporter }
    }

    async fn polish(&self, code: &GeneratedCode, status: &str, ctx: &StageContext) -> Option<String> {
        let system = render(
            prompts::FINALIZATION,
            &[
                ("code_summary", &code_summary(code)),
                ("validation_status", status),
            ],
        );
        let prompt = format!("Polish this HTML for production:\n\n{}", code.html);
        let sink = ctx.token_sink(StageId::Finalization);

        let result = ctx
            .guard(self.llm.complete(&system, &prompt, sink.as_deref()))
            .await
            .ok()?;
        let polished = match result {
            Ok(raw) => normalize_html(&raw),
            Err(e) => {
                warn!("Error polishing code: {:#}", e);
                return Some(code.html.clone());
            }
        };
        if polished.is_empty() {
            warn!("Polish returned no HTML, keeping the validated page");
            return Some(code.html.clone());
        }
        info!(chars = polished.len(), "Polished HTML");
        Some(polished)
    }
}

#[async_trait]
impl Stage for FinalizationStage {
    fn id(&self) -> StageId {
        StageId::Finalization
    }

    async fn process(&self, state: &WorkflowState, ctx: &StageContext) -> StateUpdate {
        let (Some(code), Some(plan)) = (&state.generated_code, &state.feature_plan) else {
            error!("Missing required data for finalization");
            return StateUpdate {
                is_complete: Some(true),
                ..StateUpdate::failure("Missing generated code or feature plan", NextStep::End)
            };
        };
        let branding = state.branding_data.clone().unwrap_or_default();
        let passed = state.validation_report.as_ref().map(|_| state.validation_passed);

        let status = match passed {
            None => "Unknown",
            Some(true) => "Passed",
            Some(false) => "Failed (but proceeding)",
        };
        ctx.status(StageId::Finalization, "Polishing for production");
        let Some(html) = self.polish(code, status, ctx).await else {
            return cancelled_update();
        };

        ctx.status(StageId::Finalization, "Exporting landing page");
        let Ok(exported) = ctx.guard(self.exporter.export(&html, &branding, plan)).await else {
            return cancelled_update();
        };
        let path = match exported {
            Ok(path) => path,
            Err(e) => {
                error!("Error exporting landing page: {:#}", e);
                return StateUpdate {
                    is_complete: Some(true),
                    ..StateUpdate::failure(format!("Export failed: {}", e), NextStep::End)
                };
            }
        };
        info!(path = %path, "Exported landing page");

        let issue_count = state
            .validation_report
            .as_ref()
            .map(|r| r.issues.len())
            .unwrap_or(0);
        let summary = success_summary(&path, plan, &branding, passed, issue_count);

        StateUpdate {
            generated_code: Some(GeneratedCode {
                html,
                sdk_initialized: code.sdk_initialized,
                features_implemented: code.features_implemented.clone(),
            }),
            export_path: Some(path),
            is_complete: Some(true),
            ..StateUpdate::route(NextStep::End)
        }
        .with_message(ChatMessage::assistant(summary))
    }
}

/// Markdown summary of a finished run.
///
/// `validation_passed` is `None` when the page was never validated.
pub fn success_summary(
    export_path: &str,
    plan: &FeaturePlan,
    branding: &BrandingData,
    validation_passed: Option<bool>,
    issue_count: usize,
) -> String {
    let mut lines = vec![
        "# ✅ Landing Page Generated Successfully!".to_string(),
        String::new(),
        format!("**Exported to**: `{}`", export_path),
        String::new(),
        "## Features Implemented".to_string(),
    ];
    for (i, feature) in plan.features.iter().enumerate() {
        lines.push(format!("{}. **{}**: {}", i + 1, feature.name, feature.description));
    }
    lines.push(String::new());

    lines.push("## Customer Branding Applied".to_string());
    if branding.extraction_success {
        lines.push(format!(
            "- **Website**: {}",
            branding.website_url.as_deref().unwrap_or("unknown")
        ));
        lines.push(format!("- **Primary Color**: {}", branding.colors.primary));
        lines.push(format!("- **Accent Color**: {}", branding.colors.accent));
        lines.push(format!("- **Font**: {}", branding.typography.primary_font));
    } else {
        lines.push("- Used default Braze branding (website analysis failed)".to_string());
    }
    lines.push(String::new());

    if let Some(passed) = validation_passed {
        lines.push("## Validation Status".to_string());
        if passed {
            lines.push("✅ All validation checks passed".to_string());
        } else {
            lines.push("⚠️ Some validation issues detected (exported anyway)".to_string());
            if issue_count > 0 {
                lines.push(format!("- {} issues found", issue_count));
            }
        }
        lines.push(String::new());
    }

    lines.push("## Next Steps".to_string());
    lines.push("1. Open the exported HTML file in your browser".to_string());
    lines.push("2. Test all features and interactions".to_string());
    lines.push("3. Verify Braze SDK connection (check status indicator)".to_string());
    lines.push("4. Customize further if needed".to_string());
    lines.join("\n")
}
