//! Anthropic Messages API adapter.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use tracing::debug;

use super::{ChatTurn, LlmBackend, Message, SseBuffer, TokenSink, ToolDef};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const STRUCTURED_TOOL: &str = "respond";

/// Claude client
pub struct AnthropicLlm {
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    http: reqwest::Client,
}

impl AnthropicLlm {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.3,
            max_tokens: 8192,
            http: reqwest::Client::new(),
        }
    }

    /// Read the key from `ANTHROPIC_API_KEY`
    pub fn from_env(model: impl Into<String>) -> Result<Self> {
        let key = std::env::var("ANTHROPIC_API_KEY").context("ANTHROPIC_API_KEY is not set")?;
        Ok(Self::new(key, model))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn body(&self, system: &str, messages: &[Message]) -> serde_json::Value {
        serde_json::json!({
            "model": &self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "system": system,
            "messages": messages,
        })
    }

    async fn send(&self, body: &serde_json::Value) -> Result<reqwest::Response> {
        let resp = self
            .http
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .context("Failed to call Anthropic API")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Anthropic API error {status}: {text}");
        }
        Ok(resp)
    }

    async fn stream_text(
        &self,
        mut body: serde_json::Value,
        on_token: &(dyn Fn(&str) + Send + Sync),
    ) -> Result<String> {
        body["stream"] = serde_json::Value::Bool(true);
        let resp = self.send(&body).await?;

        let mut stream = resp.bytes_stream();
        let mut sse = SseBuffer::default();
        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("Anthropic stream interrupted")?;
            for data in sse.push(&chunk) {
                let Ok(event) = serde_json::from_str::<StreamEvent>(&data) else {
                    continue;
                };
                match event {
                    StreamEvent::ContentBlockDelta { delta } => {
                        if let Some(fragment) = delta.text {
                            on_token(&fragment);
                            text.push_str(&fragment);
                        }
                    }
                    StreamEvent::Error { error } => {
                        anyhow::bail!("Anthropic stream error: {}", error);
                    }
                    StreamEvent::MessageStop => break,
                    StreamEvent::Other => {}
                }
            }
        }
        Ok(text)
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    ContentBlockDelta {
        delta: Delta,
    },
    Error {
        error: serde_json::Value,
    },
    MessageStop,
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct Delta {
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl LlmBackend for AnthropicLlm {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        system: &str,
        prompt: &str,
        on_token: TokenSink<'_>,
    ) -> Result<String> {
        let body = self.body(system, &[Message::user(prompt)]);
        if let Some(sink) = on_token {
            return self.stream_text(body, sink).await;
        }
        let turn: ChatTurn = self
            .send(&body)
            .await?
            .json()
            .await
            .context("Failed to parse Anthropic response")?;
        Ok(turn.text())
    }

    async fn complete_structured(
        &self,
        system: &str,
        prompt: &str,
        schema: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let tool = ToolDef {
            name: STRUCTURED_TOOL.to_string(),
            description: "Return the response in the required structure".to_string(),
            input_schema: schema.clone(),
        };
        let mut body = self.body(system, &[Message::user(prompt)]);
        body["tools"] = serde_json::to_value([tool])?;
        body["tool_choice"] = serde_json::json!({"type": "tool", "name": STRUCTURED_TOOL});

        let turn: ChatTurn = self
            .send(&body)
            .await?
            .json()
            .await
            .context("Failed to parse Anthropic response")?;
        let input = turn
            .tool_uses()
            .into_iter()
            .find(|tu| tu.name == STRUCTURED_TOOL)
            .map(|tu| tu.input.clone())
            .context("Anthropic response carried no structured output")?;
        debug!(model = %self.model, "Structured output received");
        Ok(input)
    }

    async fn chat(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[ToolDef],
    ) -> Result<ChatTurn> {
        let mut body = self.body(system, messages);
        if !tools.is_empty() {
            body["tools"] = serde_json::to_value(tools)?;
        }
        self.send(&body)
            .await?
            .json::<ChatTurn>()
            .await
            .context("Failed to parse Anthropic response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_event_parsing() {
        let delta: StreamEvent = serde_json::from_str(
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hel"}}"#,
        )
        .unwrap();
        assert!(matches!(
            delta,
            StreamEvent::ContentBlockDelta { delta: Delta { text: Some(ref t) } } if t == "Hel"
        ));

        let ping: StreamEvent = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(ping, StreamEvent::Other));
    }

    #[test]
    fn test_response_parsing_with_tool_use() {
        let turn: ChatTurn = serde_json::from_str(
            r#"{"id":"msg_1","content":[{"type":"text","text":"Looking"},{"type":"tool_use","id":"tu_1","name":"search_docs","input":{"query":"x"}}],"stop_reason":"tool_use","usage":{"input_tokens":1,"output_tokens":2}}"#,
        )
        .unwrap();
        assert_eq!(turn.text(), "Looking");
        assert_eq!(turn.tool_uses().len(), 1);
        assert_eq!(turn.stop_reason.as_deref(), Some("tool_use"));
    }

    #[test]
    fn test_request_body_shape() {
        let llm = AnthropicLlm::new("key", "claude-sonnet-4-20250514").with_temperature(0.7);
        let body = llm.body("sys", &[Message::user("hi")]);
        assert_eq!(body["system"], "sys");
        assert_eq!(body["messages"][0]["content"], "hi");
        assert!((body["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
    }
}
