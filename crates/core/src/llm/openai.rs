//! OpenAI Chat Completions adapter, usable with any compatible endpoint.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;

use super::{
    ChatTurn, ContentBlock, LlmBackend, Message, MessageContent, SseBuffer, TokenSink, ToolDef,
    ToolUseBlock,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// GPT client
pub struct OpenAiLlm {
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
    http: reqwest::Client,
}

impl OpenAiLlm {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature: 0.3,
            http: reqwest::Client::new(),
        }
    }

    /// Read the key from `OPENAI_API_KEY`
    pub fn from_env(model: impl Into<String>) -> Result<Self> {
        let key = std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY is not set")?;
        Ok(Self::new(key, model))
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn body(&self, system: &str, messages: &[Message]) -> serde_json::Value {
        let mut wire = vec![serde_json::json!({"role": "system", "content": system})];
        for message in messages {
            wire.extend(to_wire(message));
        }
        serde_json::json!({
            "model": &self.model,
            "temperature": self.temperature,
            "messages": wire,
        })
    }

    async fn send(&self, body: &serde_json::Value) -> Result<reqwest::Response> {
        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .context("Failed to call OpenAI API")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI API error {status}: {text}");
        }
        Ok(resp)
    }

    async fn first_choice(&self, body: &serde_json::Value) -> Result<WireMessage> {
        let completion: Completion = self
            .send(body)
            .await?
            .json()
            .await
            .context("Failed to parse OpenAI response")?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.with_finish(c.finish_reason))
            .context("OpenAI response had no choices")
    }
}

/// Translate one message into Chat Completions wire messages
fn to_wire(message: &Message) -> Vec<serde_json::Value> {
    let blocks = match &message.content {
        MessageContent::Text(text) => {
            return vec![serde_json::json!({"role": message.role, "content": text})]
        }
        MessageContent::Blocks(blocks) => blocks,
    };

    let mut out = Vec::new();
    let mut text = Vec::new();
    let mut calls = Vec::new();
    for block in blocks {
        match block {
            ContentBlock::Text { text: t } => text.push(t.as_str()),
            ContentBlock::ToolUse(tu) => calls.push(serde_json::json!({
                "id": tu.id,
                "type": "function",
                "function": {"name": tu.name, "arguments": tu.input.to_string()},
            })),
            ContentBlock::ToolResult(result) => out.push(serde_json::json!({
                "role": "tool",
                "tool_call_id": result.tool_use_id,
                "content": result.content,
            })),
        }
    }

    if !calls.is_empty() {
        let content = if text.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::Value::String(text.join("\n"))
        };
        out.insert(
            0,
            serde_json::json!({"role": message.role, "content": content, "tool_calls": calls}),
        );
    } else if !text.is_empty() {
        out.push(serde_json::json!({"role": message.role, "content": text.join("\n")}));
    }
    out
}

#[derive(Debug, Deserialize)]
struct Completion {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: WireMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip)]
    finish_reason: Option<String>,
}

impl WireMessage {
    fn with_finish(mut self, finish_reason: Option<String>) -> Self {
        self.finish_reason = finish_reason;
        self
    }

    fn into_turn(self) -> ChatTurn {
        let mut content = Vec::new();
        if let Some(text) = self.content.filter(|t| !t.is_empty()) {
            content.push(ContentBlock::Text { text });
        }
        for call in self.tool_calls {
            let input = serde_json::from_str(&call.function.arguments)
                .unwrap_or(serde_json::Value::String(call.function.arguments));
            content.push(ContentBlock::ToolUse(ToolUseBlock {
                id: call.id,
                name: call.function.name,
                input,
            }));
        }
        let stop_reason = self.finish_reason.map(|r| match r.as_str() {
            "tool_calls" => "tool_use".to_string(),
            "stop" => "end_turn".to_string(),
            _ => r,
        });
        ChatTurn {
            content,
            stop_reason,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl LlmBackend for OpenAiLlm {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        system: &str,
        prompt: &str,
        on_token: TokenSink<'_>,
    ) -> Result<String> {
        let mut body = self.body(system, &[Message::user(prompt)]);

        let Some(sink) = on_token else {
            let message = self.first_choice(&body).await?;
            return Ok(message.content.unwrap_or_default());
        };

        body["stream"] = serde_json::Value::Bool(true);
        let mut stream = self.send(&body).await?.bytes_stream();
        let mut sse = SseBuffer::default();
        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.context("OpenAI stream interrupted")?;
            for data in sse.push(&chunk) {
                if data == "[DONE]" {
                    return Ok(text);
                }
                let Ok(parsed) = serde_json::from_str::<StreamChunk>(&data) else {
                    continue;
                };
                for choice in parsed.choices {
                    if let Some(fragment) = choice.delta.content {
                        sink(&fragment);
                        text.push_str(&fragment);
                    }
                }
            }
        }
        Ok(text)
    }

    async fn complete_structured(
        &self,
        system: &str,
        prompt: &str,
        schema: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let mut body = self.body(system, &[Message::user(prompt)]);
        body["response_format"] = serde_json::json!({
            "type": "json_schema",
            "json_schema": {"name": "response", "schema": schema, "strict": false},
        });
        let message = self.first_choice(&body).await?;
        let text = message
            .content
            .context("OpenAI structured response was empty")?;
        serde_json::from_str(&text).context("OpenAI structured response was not valid JSON")
    }

    async fn chat(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[ToolDef],
    ) -> Result<ChatTurn> {
        let mut body = self.body(system, messages);
        if !tools.is_empty() {
            let functions: Vec<_> = tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.input_schema,
                        },
                    })
                })
                .collect();
            body["tools"] = serde_json::Value::Array(functions);
        }
        Ok(self.first_choice(&body).await?.into_turn())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ToolResultBlock;

    #[test]
    fn test_tool_use_round_trip_to_wire() {
        let assistant = Message::assistant_blocks(vec![
            ContentBlock::Text {
                text: "Searching".to_string(),
            },
            ContentBlock::ToolUse(ToolUseBlock {
                id: "call_1".to_string(),
                name: "search_docs".to_string(),
                input: serde_json::json!({"query": "events"}),
            }),
        ]);
        let wire = to_wire(&assistant);
        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0]["content"], "Searching");
        assert_eq!(wire[0]["tool_calls"][0]["function"]["name"], "search_docs");
        assert_eq!(
            wire[0]["tool_calls"][0]["function"]["arguments"],
            "{\"query\":\"events\"}"
        );

        let results = Message::tool_results(vec![ToolResultBlock {
            tool_use_id: "call_1".to_string(),
            content: "found".to_string(),
            is_error: None,
        }]);
        let wire = to_wire(&results);
        assert_eq!(wire[0]["role"], "tool");
        assert_eq!(wire[0]["tool_call_id"], "call_1");
    }

    #[test]
    fn test_response_maps_to_blocks() {
        let completion: Completion = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":null,"tool_calls":[{"id":"c1","type":"function","function":{"name":"get_event_schema","arguments":"{\"event_key\":\"purchase\"}"}}]},"finish_reason":"tool_calls"}]}"#,
        )
        .unwrap();
        let choice = completion.choices.into_iter().next().unwrap();
        let turn = choice.message.with_finish(choice.finish_reason).into_turn();

        assert_eq!(turn.stop_reason.as_deref(), Some("tool_use"));
        let uses = turn.tool_uses();
        assert_eq!(uses[0].name, "get_event_schema");
        assert_eq!(uses[0].input["event_key"], "purchase");
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let llm = OpenAiLlm::new("k", "gpt-4o").with_base_url("http://localhost:11434/v1/");
        assert_eq!(llm.base_url, "http://localhost:11434/v1");
    }
}
