//! # Research Stage
//!
//! Runs a bounded tool-using agent over the documentation tools to collect
//! implementation guidance for every planned feature. Failure here is not
//! fatal: the pipeline continues to code generation without guidance.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info};

use super::{cancelled_update, format_features, prompts, Stage, StageContext, StageId};
use crate::llm::tool_agent::{run_tool_agent, ToolExecutor};
use crate::llm::LlmBackend;
use crate::state::{FeaturePlan, NextStep, ResearchResult, StateUpdate, WorkflowState};

/// Tool-agent step ceiling used unless configured otherwise
pub const DEFAULT_STEP_BUDGET: usize = 35;

pub struct ResearchStage {
    llm: Arc<dyn LlmBackend>,
    tools: Arc<dyn ToolExecutor>,
    step_budget: usize,
}

impl ResearchStage {
    pub fn new(llm: Arc<dyn LlmBackend>, tools: Arc<dyn ToolExecutor>) -> Self {
        Self {
            llm,
            tools,
            step_budget: DEFAULT_STEP_BUDGET,
        }
    }

    pub fn with_step_budget(mut self, step_budget: usize) -> Self {
        self.step_budget = step_budget.max(1);
        self
    }
}

#[async_trait]
impl Stage for ResearchStage {
    fn id(&self) -> StageId {
        StageId::Research
    }

    async fn process(&self, state: &WorkflowState, ctx: &StageContext) -> StateUpdate {
        let Some(plan) = &state.feature_plan else {
            return StateUpdate::failure(
                "No feature plan available for research",
                NextStep::ErrorHandler,
            );
        };

        let query = research_query(plan);
        ctx.status(StageId::Research, "Searching documentation…");

        let on_tool = |name: &str| ctx.status(StageId::Research, format!("Using tool {}", name));
        let run = run_tool_agent(
            self.llm.as_ref(),
            prompts::RESEARCH,
            &query,
            self.tools.as_ref(),
            self.step_budget,
            ctx.cancel_token(),
            &on_tool,
        )
        .await;

        if ctx.is_cancelled() {
            return cancelled_update();
        }

        match run {
            Ok(run) => {
                info!(
                    steps = run.steps,
                    tool_calls = run.tool_calls,
                    chars = run.answer.len(),
                    "Research completed"
                );
                let implementation_guidance = guidance_from(&run.answer);
                StateUpdate {
                    research_results: Some(ResearchResult {
                        query,
                        summary: run.answer,
                        implementation_guidance,
                    }),
                    ..StateUpdate::route(NextStep::CodeGeneration)
                }
            }
            Err(e) => {
                error!("Error during research: {:#}", e);
                StateUpdate::failure(format!("Research failed: {}", e), NextStep::CodeGeneration)
            }
        }
    }
}

/// Question handed to the research agent
pub fn research_query(plan: &FeaturePlan) -> String {
    format!(
        "Research Braze SDK documentation for these features:\n\n{}\n\nFor each feature, find:\n1. SDK initialization steps\n2. Code examples\n3. Required methods and parameters\n4. Best practices\n",
        format_features(plan)
    )
}

fn guidance_from(summary: &str) -> String {
    let heading = if summary.contains("```") {
        "**Code Examples Found:**"
    } else {
        "**Implementation Guidance:**"
    };
    format!("{}\n{}", heading, summary)
}
