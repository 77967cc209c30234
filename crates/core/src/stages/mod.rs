//! # Stages
//!
//! The six pipeline stages and the contract they share. A stage reads the
//! workflow state and returns a [`StateUpdate`]; it never returns an error.
//! Delegated failures are folded into the update's `error` field together
//! with a routing hint.

pub mod code_generation;
pub mod finalization;
pub mod planning;
pub mod prompts;
pub mod refinement;
pub mod research;
pub mod validation;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::state::{FeaturePlan, GeneratedCode, NextStep, StateUpdate, WorkflowState};
use crate::workflow::events::WorkflowEvent;

pub use code_generation::CodeGenerationStage;
pub use finalization::FinalizationStage;
pub use planning::PlanningStage;
pub use refinement::RefinementStage;
pub use research::ResearchStage;
pub use validation::ValidationStage;

/// Identity of a pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    /// Feature planning and branding extraction
    Planning,
    /// Documentation research
    Research,
    /// Landing page generation
    CodeGeneration,
    /// Browser check plus PASS/FAIL judgment
    Validation,
    /// Fixes for validation issues
    Refinement,
    /// Polish and export
    Finalization,
}

impl StageId {
    pub fn all() -> [StageId; 6] {
        [
            StageId::Planning,
            StageId::Research,
            StageId::CodeGeneration,
            StageId::Validation,
            StageId::Refinement,
            StageId::Finalization,
        ]
    }

    /// Node name used in events and configuration keys
    pub fn as_str(&self) -> &'static str {
        match self {
            StageId::Planning => "planning",
            StageId::Research => "research",
            StageId::CodeGeneration => "code_generation",
            StageId::Validation => "validation",
            StageId::Refinement => "refinement",
            StageId::Finalization => "finalization",
        }
    }

    pub fn from_name(name: &str) -> Option<StageId> {
        StageId::all().into_iter().find(|s| s.as_str() == name)
    }

    /// Sampling temperature the stage uses unless configured otherwise
    pub fn default_temperature(&self) -> f32 {
        match self {
            StageId::CodeGeneration => 0.7,
            StageId::Refinement => 0.5,
            _ => 0.3,
        }
    }

    /// Human-readable completion status for a merged update
    pub fn completion_status(&self, update: &StateUpdate, state: &WorkflowState) -> String {
        let status = match self {
            StageId::Planning => "✓ Feature plan created with customer branding".to_string(),
            StageId::Research => "✓ Braze documentation research complete".to_string(),
            StageId::CodeGeneration => "✓ Landing page code generated".to_string(),
            StageId::Validation => {
                if update.validation_passed.unwrap_or(false) {
                    "✓ Browser validation complete".to_string()
                } else {
                    "⚠ Validation issues detected, starting refinement".to_string()
                }
            }
            StageId::Refinement => format!(
                "✓ Code refined (iteration {})",
                update
                    .refinement_iteration
                    .unwrap_or(state.refinement_iteration)
            ),
            StageId::Finalization => "✓ Landing page finalized and exported".to_string(),
        };
        if update.error.is_some() {
            format!("{} (with warnings)", status)
        } else {
            status
        }
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pipeline stage
#[async_trait]
pub trait Stage: Send + Sync {
    fn id(&self) -> StageId;

    /// Produce a partial update from the current state
    async fn process(&self, state: &WorkflowState, ctx: &StageContext) -> StateUpdate;
}

/// Raised by [`StageContext::guard`] when the run is cancelled
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("cancelled")]
pub struct Cancelled;

/// Progress plumbing and cancellation handed to each stage
#[derive(Clone, Default)]
pub struct StageContext {
    cancel: CancellationToken,
    events: Option<mpsc::Sender<WorkflowEvent>>,
}

impl StageContext {
    pub fn new(cancel: CancellationToken, events: Option<mpsc::Sender<WorkflowEvent>>) -> Self {
        Self { cancel, events }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Await `fut` unless the run is cancelled first
    pub async fn guard<F: Future>(&self, fut: F) -> Result<F::Output, Cancelled> {
        if self.cancel.is_cancelled() {
            return Err(Cancelled);
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Cancelled),
            out = fut => Ok(out),
        }
    }

    /// Report a stage milestone; dropped when nobody listens
    pub fn status(&self, stage: StageId, message: impl Into<String>) {
        if let Some(tx) = &self.events {
            let _ = tx.try_send(WorkflowEvent::Status {
                node: stage.as_str().to_string(),
                message: message.into(),
            });
        }
    }

    /// Token callback forwarding streamed output, present only when streaming
    pub fn token_sink(&self, stage: StageId) -> Option<Box<dyn Fn(&str) + Send + Sync>> {
        let tx = self.events.clone()?;
        let node = stage.as_str().to_string();
        Some(Box::new(move |text: &str| {
            let _ = tx.try_send(WorkflowEvent::Token {
                node: node.clone(),
                text: text.to_string(),
            });
        }))
    }
}

/// Update returned when a stage notices cancellation; the engine discards it
pub(crate) fn cancelled_update() -> StateUpdate {
    StateUpdate::failure("Cancelled", NextStep::End)
}

/// Short description of the current page for prompts
pub(crate) fn code_summary(code: &GeneratedCode) -> String {
    format!(
        "HTML length: {} characters\nFeatures implemented: {}\nSDK initialized: {}",
        code.html.len(),
        code.features_implemented.join(", "),
        code.sdk_initialized
    )
}

/// Numbered feature list shared by research and code generation prompts
pub(crate) fn format_features(plan: &FeaturePlan) -> String {
    let mut lines = Vec::new();
    for (i, feature) in plan.features.iter().enumerate() {
        lines.push(format!("{}. **{}**: {}", i + 1, feature.name, feature.description));
        let methods = if feature.sdk_methods.is_empty() {
            "None".to_string()
        } else {
            feature.sdk_methods.join(", ")
        };
        lines.push(format!("   SDK Methods: {}", methods));
        if !feature.implementation_notes.is_empty() {
            lines.push(format!("   Notes: {}", feature.implementation_notes));
        }
        lines.push(String::new());
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_plan;

    #[test]
    fn test_stage_names_round_trip() {
        for stage in StageId::all() {
            assert_eq!(StageId::from_name(stage.as_str()), Some(stage));
        }
        assert_eq!(StageId::from_name("lead"), None);
    }

    #[test]
    fn test_completion_status_variants() {
        let state = WorkflowState::default();

        let passed = StateUpdate {
            validation_passed: Some(true),
            ..StateUpdate::default()
        };
        assert_eq!(
            StageId::Validation.completion_status(&passed, &state),
            "✓ Browser validation complete"
        );
        assert_eq!(
            StageId::Validation.completion_status(&StateUpdate::default(), &state),
            "⚠ Validation issues detected, starting refinement"
        );

        let refined = StateUpdate {
            refinement_iteration: Some(2),
            error: Some("boom".to_string()),
            ..StateUpdate::default()
        };
        assert_eq!(
            StageId::Refinement.completion_status(&refined, &state),
            "✓ Code refined (iteration 2) (with warnings)"
        );
    }

    #[test]
    fn test_format_features() {
        let text = format_features(&sample_plan("T"));
        assert!(text.starts_with("1. **User Tracking**: "));
        assert!(text.contains("   SDK Methods: braze.logCustomEvent()"));
        assert!(text.contains("2. **User Attributes**"));
    }

    #[tokio::test]
    async fn test_guard_stops_on_cancel() {
        let ctx = StageContext::default();
        assert_eq!(ctx.guard(async { 7 }).await, Ok(7));

        ctx.cancel_token().cancel();
        let pending = std::future::pending::<()>();
        assert_eq!(ctx.guard(pending).await, Err(Cancelled));
    }

    #[tokio::test]
    async fn test_status_and_tokens_reach_channel() {
        let (tx, mut rx) = mpsc::channel(8);
        let ctx = StageContext::new(CancellationToken::new(), Some(tx));

        ctx.status(StageId::Research, "Searching documentation…");
        let sink = ctx.token_sink(StageId::CodeGeneration).unwrap();
        sink("<html>");

        assert!(matches!(rx.recv().await, Some(WorkflowEvent::Status { node, .. }) if node == "research"));
        assert!(matches!(rx.recv().await, Some(WorkflowEvent::Token { text, .. }) if text == "<html>"));
        assert!(StageContext::default().token_sink(StageId::Planning).is_none());
    }
}
