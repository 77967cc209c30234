//! # LLM Backends
//!
//! The inference collaborator every stage delegates to. [`LlmBackend`] is the
//! seam; [`anthropic::AnthropicLlm`] and [`openai::OpenAiLlm`] are the
//! shipped adapters, and [`tool_agent`] runs a bounded tool-calling loop on
//! top of any backend.
//!
//! The message model follows the Anthropic Messages shape: content is either
//! plain text or a list of `text` / `tool_use` / `tool_result` blocks.

pub mod anthropic;
pub mod openai;
pub mod tool_agent;

use anyhow::{Context, Result};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub use anthropic::AnthropicLlm;
pub use openai::OpenAiLlm;

/// Callback receiving streamed text fragments
pub type TokenSink<'a> = Option<&'a (dyn Fn(&str) + Send + Sync)>;

/// A message in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: MessageContent,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn assistant_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: MessageContent::Blocks(blocks),
        }
    }

    pub fn tool_results(results: Vec<ToolResultBlock>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Blocks(
                results.into_iter().map(ContentBlock::ToolResult).collect(),
            ),
        }
    }
}

/// Either a simple string or structured blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    /// Plain text of the content; text blocks are joined by newlines
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Blocks(blocks) => blocks_text(blocks),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse(ToolUseBlock),
    #[serde(rename = "tool_result")]
    ToolResult(ToolResultBlock),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUseBlock {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultBlock {
    pub tool_use_id: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

/// Tool definition offered to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

impl ToolDef {
    /// Definition whose input schema is derived from `T`
    pub fn for_args<T: JsonSchema>(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: schema_of::<T>(),
        }
    }
}

/// One assistant turn of a tool-using conversation
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatTurn {
    pub content: Vec<ContentBlock>,
    pub stop_reason: Option<String>,
}

impl ChatTurn {
    pub fn text(&self) -> String {
        blocks_text(&self.content)
    }

    pub fn tool_uses(&self) -> Vec<&ToolUseBlock> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse(tu) => Some(tu),
                _ => None,
            })
            .collect()
    }
}

impl From<ChatTurn> for Message {
    fn from(turn: ChatTurn) -> Self {
        Message::assistant_blocks(turn.content)
    }
}

fn blocks_text(blocks: &[ContentBlock]) -> String {
    blocks
        .iter()
        .filter_map(|b| match b {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Inference collaborator
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Short identifier for logs
    fn name(&self) -> &str;

    /// Single-turn text completion; streams fragments to `on_token` when given
    async fn complete(&self, system: &str, prompt: &str, on_token: TokenSink<'_>)
        -> Result<String>;

    /// Single-turn completion constrained to a JSON schema
    async fn complete_structured(
        &self,
        system: &str,
        prompt: &str,
        schema: &serde_json::Value,
    ) -> Result<serde_json::Value>;

    /// One turn of a tool-using conversation
    async fn chat(&self, system: &str, messages: &[Message], tools: &[ToolDef])
        -> Result<ChatTurn>;
}

/// JSON schema for `T` without the meta-schema marker
pub fn schema_of<T: JsonSchema>() -> serde_json::Value {
    let mut value = serde_json::to_value(schemars::schema_for!(T)).unwrap_or_default();
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
    }
    value
}

/// Structured completion deserialized into `T`
pub async fn complete_as<T>(llm: &dyn LlmBackend, system: &str, prompt: &str) -> Result<T>
where
    T: DeserializeOwned + JsonSchema,
{
    let schema = schema_of::<T>();
    let value = llm.complete_structured(system, prompt, &schema).await?;
    serde_json::from_value(value).context("Structured output did not match the schema")
}

/// Incremental parser for `data:` lines of a Server-Sent Events body
#[derive(Debug, Default)]
pub(crate) struct SseBuffer {
    /// Bytes after the last newline; may end inside a UTF-8 sequence
    pending: Vec<u8>,
}

impl SseBuffer {
    /// Feed a chunk and return the complete data payloads it finished
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut out = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\r', '\n']);
            if let Some(data) = line.strip_prefix("data:") {
                out.push(data.trim_start().to_string());
            }
        }
        out
    }
}
