//! # Tool Agent
//!
//! A bounded tool-calling loop: the model answers, any requested tools run,
//! their results go back as the next user turn, until the model answers
//! without tool calls or the step budget is spent.

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{LlmBackend, Message, ToolDef, ToolResultBlock};

/// Tools the agent may call
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    fn definitions(&self) -> Vec<ToolDef>;

    /// Run a tool; failures are reported in the returned text
    async fn execute(&self, name: &str, input: &serde_json::Value) -> String;
}

/// Final answer of an agent run
#[derive(Debug, Clone, PartialEq)]
pub struct AgentRun {
    pub answer: String,
    pub steps: usize,
    pub tool_calls: usize,
}

/// Run the agent until it answers, the budget is spent, or `cancel` fires.
///
/// `on_tool` is called with the name of every tool before it runs.
pub async fn run_tool_agent(
    llm: &dyn LlmBackend,
    system: &str,
    prompt: &str,
    tools: &dyn ToolExecutor,
    max_steps: usize,
    cancel: &CancellationToken,
    on_tool: &(dyn Fn(&str) + Send + Sync),
) -> Result<AgentRun> {
    let definitions = tools.definitions();
    let mut messages = vec![Message::user(prompt)];
    let mut tool_calls = 0;

    for step in 1..=max_steps {
        if cancel.is_cancelled() {
            anyhow::bail!("Agent cancelled");
        }

        let turn = tokio::select! {
            _ = cancel.cancelled() => anyhow::bail!("Agent cancelled"),
            turn = llm.chat(system, &messages, &definitions) => turn?,
        };

        let uses: Vec<_> = turn.tool_uses().into_iter().cloned().collect();
        if uses.is_empty() {
            debug!(step, tool_calls, "Agent finished");
            return Ok(AgentRun {
                answer: turn.text(),
                steps: step,
                tool_calls,
            });
        }

        messages.push(Message::from(turn));

        let mut results = Vec::with_capacity(uses.len());
        for tu in &uses {
            on_tool(&tu.name);
            let content = tokio::select! {
                _ = cancel.cancelled() => anyhow::bail!("Agent cancelled"),
                out = tools.execute(&tu.name, &tu.input) => out,
            };
            tool_calls += 1;
            results.push(ToolResultBlock {
                tool_use_id: tu.id.clone(),
                content,
                is_error: None,
            });
        }
        messages.push(Message::tool_results(results));
    }

    warn!(max_steps, tool_calls, "Agent exhausted its step budget");
    anyhow::bail!("Agent exceeded its step budget of {} steps", max_steps)
}
