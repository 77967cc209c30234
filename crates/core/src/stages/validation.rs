//! # Validation Stage
//!
//! Runs the optional browser check, then asks the model for a PASS/FAIL
//! judgment over the report. A failing browser collaborator produces a
//! failing report instead of a pipeline error.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::prompts::{self, render};
use super::{cancelled_update, code_summary, Stage, StageContext, StageId};
use crate::llm::LlmBackend;
use crate::state::{NextStep, StateUpdate, ValidationReport, WorkflowState};
use crate::tools::BrowserValidator;
use crate::workflow::router::{route_after_validation, Route};

const USER_PROMPT: &str =
    "Analyze the validation report and determine if the code passes validation.";

/// Console errors included in the judge's report
const MAX_CONSOLE_ERRORS: usize = 5;

pub struct ValidationStage {
    llm: Arc<dyn LlmBackend>,
    browser: Option<Arc<dyn BrowserValidator>>,
    enabled: bool,
}

impl ValidationStage {
    pub fn new(llm: Arc<dyn LlmBackend>) -> Self {
        Self {
            llm,
            browser: None,
            enabled: false,
        }
    }

    /// Enable browser checks through `browser`
    pub fn with_browser(mut self, browser: Arc<dyn BrowserValidator>) -> Self {
        self.browser = Some(browser);
        self.enabled = true;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

#[async_trait]
impl Stage for ValidationStage {
    fn id(&self) -> StageId {
        StageId::Validation
    }

    async fn process(&self, state: &WorkflowState, ctx: &StageContext) -> StateUpdate {
        let Some(code) = &state.generated_code else {
            error!("No generated code to validate");
            return StateUpdate::failure("No generated code available", NextStep::ErrorHandler);
        };

        let report = match (&self.browser, self.enabled) {
            (Some(browser), true) => {
                ctx.status(StageId::Validation, "Testing page in headless browser");
                let Ok(result) = ctx.guard(browser.validate(&code.html)).await else {
                    return cancelled_update();
                };
                match result {
                    Ok(report) => {
                        info!(passed = report.passed, issues = report.issues.len(), "Browser validation finished");
                        report
                    }
                    Err(e) => {
                        error!("Browser testing error: {:#}", e);
                        ValidationReport::infrastructure_failure(&e.to_string())
                    }
                }
            }
            _ => {
                info!("Browser testing disabled, skipping validation");
                ValidationReport::skipped()
            }
        };

        let system = render(
            prompts::VALIDATION,
            &[
                ("code_summary", &code_summary(code)),
                ("validation_report", &format_report(&report)),
            ],
        );
        ctx.status(StageId::Validation, "Reviewing validation report");
        let Ok(verdict) = ctx.guard(self.llm.complete(&system, USER_PROMPT, None)).await else {
            return cancelled_update();
        };
        let passed = match verdict {
            Ok(text) => judge_verdict(&text),
            Err(e) => {
                warn!("Error analyzing validation report: {:#}", e);
                false
            }
        };

        let next = match route_after_validation(
            passed,
            state.refinement_iteration,
            state.max_refinement_iterations,
        ) {
            Route::Finalize => NextStep::Finalize,
            Route::Refine => NextStep::Refine,
        };
        if passed {
            info!("Validation PASSED");
        } else if next == NextStep::Refine {
            info!(
                iteration = state.refinement_iteration + 1,
                max = state.max_refinement_iterations,
                "Validation FAILED, refining"
            );
        } else {
            warn!(
                max = state.max_refinement_iterations,
                "Max refinement iterations reached, finalizing anyway"
            );
        }

        StateUpdate {
            validation_report: Some(report),
            validation_passed: Some(passed),
            ..StateUpdate::route(next)
        }
    }
}

/// PASS only when the reply says PASS and never says FAIL
pub fn judge_verdict(reply: &str) -> bool {
    let upper = reply.to_uppercase();
    upper.contains("PASS") && !upper.contains("FAIL")
}

/// Render a report as the judge reads it
pub fn format_report(report: &ValidationReport) -> String {
    let mut lines = vec![
        format!(
            "**Validation Status**: {}",
            if report.passed { "PASSED" } else { "FAILED" }
        ),
        format!(
            "**Braze SDK Loaded**: {}",
            if report.sdk_loaded { "Yes" } else { "No" }
        ),
        format!("**Test Timestamp**: {}", report.timestamp),
        String::new(),
    ];

    if report.issues.is_empty() {
        lines.push("**Issues Found**: None".to_string());
    } else {
        lines.push(format!("**Issues Found**: {}", report.issues.len()));
        for (i, issue) in report.issues.iter().enumerate() {
            lines.push(format!(
                "\n{}. [{}] {}",
                i + 1,
                issue.severity.as_str().to_uppercase(),
                issue.category
            ));
            lines.push(format!("   Message: {}", issue.message));
            if let Some(fix) = &issue.fix_suggestion {
                lines.push(format!("   Fix: {}", fix));
            }
        }
    }

    if !report.console_errors.is_empty() {
        lines.push(format!("\n**Console Errors**: {}", report.console_errors.len()));
        for err in report.console_errors.iter().take(MAX_CONSOLE_ERRORS) {
            lines.push(format!("   - {}", err));
        }
    }

    lines.join("\n")
}
