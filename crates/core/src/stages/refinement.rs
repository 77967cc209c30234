//! # Refinement Stage
//!
//! Asks the model for a minimal fix of the issues the last validation found.
//! Every invocation advances the iteration counter by one. A failed fix does
//! not retry: the run moves on to finalization with the previous page.

use anyhow::anyhow;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::prompts::{self, render};
use super::{cancelled_update, code_summary, Stage, StageContext, StageId};
use crate::html::normalize_html;
use crate::llm::LlmBackend;
use crate::state::{
    GeneratedCode, NextStep, StateUpdate, ValidationIssue, ValidationReport, WorkflowState,
};

const MAX_CONSOLE_ERRORS: usize = 3;

pub struct RefinementStage {
    llm: Arc<dyn LlmBackend>,
}

impl RefinementStage {
    pub fn new(llm: Arc<dyn LlmBackend>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Stage for RefinementStage {
    fn id(&self) -> StageId {
        StageId::Refinement
    }

    async fn process(&self, state: &WorkflowState, ctx: &StageContext) -> StateUpdate {
        let current = state.refinement_iteration;
        let next_iteration = current + 1;

        let (Some(code), Some(report)) = (&state.generated_code, &state.validation_report) else {
            error!("Missing generated code or validation report");
            return StateUpdate {
                refinement_iteration: Some(next_iteration),
                ..StateUpdate::failure(
                    "Cannot refine without code and validation report",
                    NextStep::ErrorHandler,
                )
            };
        };

        let system = render(
            prompts::REFINEMENT,
            &[
                ("code_summary", &code_summary(code)),
                ("validation_status", &status_summary(report)),
                ("issues_to_fix", &issues_to_fix(report)),
            ],
        );
        let prompt = format!("Fix the validation issues in this HTML:\n\n{}", code.html);

        ctx.status(
            StageId::Refinement,
            format!(
                "Fixing {} issue(s), attempt {}/{}",
                report.issues.len(),
                next_iteration,
                state.max_refinement_iterations
            ),
        );
        let sink = ctx.token_sink(StageId::Refinement);
        let Ok(result) = ctx
            .guard(self.llm.complete(&system, &prompt, sink.as_deref()))
            .await
        else {
            return cancelled_update();
        };

        let refined = result.and_then(|raw| {
            let html = normalize_html(&raw);
            if html.is_empty() {
                Err(anyhow!("model returned no HTML"))
            } else {
                Ok(html)
            }
        });

        match refined {
            Ok(html) => {
                info!(chars = html.len(), iteration = next_iteration, "Refined HTML");
                StateUpdate {
                    generated_code: Some(GeneratedCode {
                        html,
                        sdk_initialized: code.sdk_initialized,
                        features_implemented: code.features_implemented.clone(),
                    }),
                    refinement_iteration: Some(next_iteration),
                    ..StateUpdate::route(NextStep::Validation)
                }
            }
            Err(e) => {
                error!("Error refining code: {:#}", e);
                if current + 1 >= state.max_refinement_iterations {
                    warn!("Max refinement iterations reached, proceeding to finalization");
                }
                StateUpdate {
                    refinement_iteration: Some(next_iteration),
                    ..StateUpdate::failure(format!("Refinement failed: {}", e), NextStep::Finalize)
                }
            }
        }
    }
}

/// Fix list with errors ahead of warnings
pub fn issues_to_fix(report: &ValidationReport) -> String {
    if report.issues.is_empty() {
        return "No specific issues found, but validation failed.".to_string();
    }

    let mut lines = Vec::new();
    let errors: Vec<_> = report.errors().collect();
    let warnings: Vec<_> = report.warnings().collect();
    if !errors.is_empty() {
        lines.push("**CRITICAL ERRORS (Fix These First):**".to_string());
        push_numbered(&mut lines, &errors);
    }
    if !warnings.is_empty() {
        lines.push("**WARNINGS (Fix If Possible):**".to_string());
        push_numbered(&mut lines, &warnings);
    }
    lines.join("\n")
}

fn push_numbered(lines: &mut Vec<String>, issues: &[&ValidationIssue]) {
    for (i, issue) in issues.iter().enumerate() {
        lines.push(format!("{}. {}", i + 1, issue.message));
        if let Some(fix) = &issue.fix_suggestion {
            lines.push(format!("   → {}", fix));
        }
        lines.push(String::new());
    }
}

fn status_summary(report: &ValidationReport) -> String {
    let mut lines = vec![
        format!(
            "**Validation Status**: {}",
            if report.passed { "PASSED" } else { "FAILED" }
        ),
        format!(
            "**Braze SDK Loaded**: {}",
            if report.sdk_loaded { "Yes" } else { "No" }
        ),
        format!("**Issues Count**: {}", report.issues.len()),
    ];
    if !report.console_errors.is_empty() {
        lines.push("\n**Console Errors**:".to_string());
        for err in report.console_errors.iter().take(MAX_CONSOLE_ERRORS) {
            lines.push(format!("  - {}", err));
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Severity;
    use crate::test_support::MockLlm;

    fn issue(severity: Severity, message: &str, fix: Option<&str>) -> ValidationIssue {
        ValidationIssue {
            severity,
            category: "javascript".to_string(),
            message: message.to_string(),
            fix_suggestion: fix.map(str::to_string),
        }
    }

    fn failing_state(iteration: u32) -> WorkflowState {
        let mut state = WorkflowState::new("x", None, 3, None);
        state.generated_code = Some(GeneratedCode {
            html: "<!DOCTYPE html><html>old</html>".to_string(),
            sdk_initialized: true,
            features_implemented: vec!["User Tracking".to_string()],
        });
        let mut report = ValidationReport::infrastructure_failure("boom");
        report.issues.push(issue(Severity::Warning, "Missing alt text", None));
        state.validation_report = Some(report);
        state.refinement_iteration = iteration;
        state
    }

    #[test]
    fn test_issues_errors_before_warnings() {
        let report = ValidationReport {
            issues: vec![
                issue(Severity::Warning, "Low contrast", Some("Darken text")),
                issue(Severity::Error, "braze is not defined", Some("Load the SDK first")),
                issue(Severity::Info, "FYI", None),
            ],
            ..ValidationReport::skipped()
        };

        let text = issues_to_fix(&report);

        let errors_at = text.find("**CRITICAL ERRORS (Fix These First):**").unwrap();
        let warnings_at = text.find("**WARNINGS (Fix If Possible):**").unwrap();
        assert!(errors_at < warnings_at);
        assert!(text.contains("1. braze is not defined\n   → Load the SDK first"));
        assert!(!text.contains("FYI"));
    }

    #[test]
    fn test_no_issues_message() {
        let report = ValidationReport {
            passed: false,
            ..ValidationReport::skipped()
        };
        assert_eq!(
            issues_to_fix(&report),
            "No specific issues found, but validation failed."
        );
    }

    #[test]
    fn test_status_summary_caps_console_errors() {
        let mut report = ValidationReport::infrastructure_failure("a");
        report.console_errors = vec!["a", "b", "c", "d"].into_iter().map(String::from).collect();

        let text = status_summary(&report);

        assert!(text.contains("  - c"));
        assert!(!text.contains("  - d"));
    }

    #[tokio::test]
    async fn test_success_replaces_code_and_loops_back() {
        let llm = Arc::new(MockLlm::new().with_completion("```html\n<html>fixed</html>\n```"));

        let update = RefinementStage::new(llm.clone())
            .process(&failing_state(0), &StageContext::default())
            .await;

        assert_eq!(
            update.generated_code.unwrap().html,
            "<!DOCTYPE html>\n<html>fixed</html>"
        );
        assert_eq!(update.refinement_iteration, Some(1));
        assert_eq!(update.next_step, Some(NextStep::Validation));

        let (system, user) = llm.prompts().remove(0);
        assert!(system.contains("**CRITICAL ERRORS (Fix These First):**"));
        assert!(user.ends_with("<!DOCTYPE html><html>old</html>"));
    }

    #[tokio::test]
    async fn test_failure_increments_and_finalizes() {
        for iteration in [0, 2] {
            let llm = Arc::new(MockLlm::new().with_completion_error("overloaded"));

            let update = RefinementStage::new(llm)
                .process(&failing_state(iteration), &StageContext::default())
                .await;

            assert_eq!(update.refinement_iteration, Some(iteration + 1));
            assert_eq!(update.next_step, Some(NextStep::Finalize));
            assert_eq!(update.error.as_deref(), Some("Refinement failed: overloaded"));
            assert!(update.generated_code.is_none());
        }
    }

    #[tokio::test]
    async fn test_missing_report_is_fatal() {
        let llm = Arc::new(MockLlm::new());
        let mut state = failing_state(1);
        state.validation_report = None;

        let update = RefinementStage::new(llm.clone())
            .process(&state, &StageContext::default())
            .await;

        assert_eq!(update.next_step, Some(NextStep::ErrorHandler));
        assert_eq!(update.refinement_iteration, Some(2));
        assert_eq!(llm.complete_calls(), 0);
    }
}
