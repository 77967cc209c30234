//! # Documentation Search
//!
//! The documentation collaborator used by the research agent, and the tool
//! wrapper exposing it to the agent. Every tool failure becomes a returned
//! `Error …` string so the agent can recover on its own.

use anyhow::{Context, Result};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::llm::tool_agent::ToolExecutor;
use crate::llm::ToolDef;

const RESULT_LIMIT: u32 = 5;

/// Documentation backend
#[async_trait]
pub trait DocsSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<String>;
    async fn get_examples(&self, topic: &str, language: &str, sdk: &str) -> Result<String>;
    async fn get_event_schema(&self, event_key: &str) -> Result<String>;
    async fn get_setup_checklist(&self, environment: &str) -> Result<String>;
}

/// Documentation service reachable over HTTP with JSON responses
pub struct HttpDocsSearch {
    base_url: String,
    http: reqwest::Client,
}

impl HttpDocsSearch {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    async fn get(&self, path: &str) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "Querying documentation service");
        let resp = self
            .http
            .get(&url)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .context("Failed to reach documentation service")?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("documentation service returned {status}: {body}");
        }
        Ok(render_body(&body))
    }
}

/// Pretty-print JSON bodies, pass text through
fn render_body(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::String(s)) => s,
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| body.to_string()),
        Err(_) => body.to_string(),
    }
}

#[async_trait]
impl DocsSearch for HttpDocsSearch {
    async fn search(&self, query: &str) -> Result<String> {
        self.get(&format!(
            "/search?q={}&limit={}",
            urlencoding::encode(query),
            RESULT_LIMIT
        ))
        .await
    }

    async fn get_examples(&self, topic: &str, language: &str, sdk: &str) -> Result<String> {
        self.get(&format!(
            "/examples?topic={}&language={}&sdk={}&limit={}",
            urlencoding::encode(topic),
            urlencoding::encode(language),
            urlencoding::encode(sdk),
            RESULT_LIMIT
        ))
        .await
    }

    async fn get_event_schema(&self, event_key: &str) -> Result<String> {
        self.get(&format!("/schemas/{}", urlencoding::encode(event_key)))
            .await
    }

    async fn get_setup_checklist(&self, environment: &str) -> Result<String> {
        self.get(&format!(
            "/checklist?environment={}",
            urlencoding::encode(environment)
        ))
        .await
    }
}

/// Backend used when no documentation service is configured
pub struct UnconfiguredDocs;

#[async_trait]
impl DocsSearch for UnconfiguredDocs {
    async fn search(&self, _query: &str) -> Result<String> {
        anyhow::bail!("documentation service is not configured")
    }

    async fn get_examples(&self, _topic: &str, _language: &str, _sdk: &str) -> Result<String> {
        anyhow::bail!("documentation service is not configured")
    }

    async fn get_event_schema(&self, _event_key: &str) -> Result<String> {
        anyhow::bail!("documentation service is not configured")
    }

    async fn get_setup_checklist(&self, _environment: &str) -> Result<String> {
        anyhow::bail!("documentation service is not configured")
    }
}

/// Arguments for documentation search
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchDocsArgs {
    /// What to search for, specific but not verbose (e.g. "track custom events")
    pub query: String,
}

/// Arguments for code example retrieval
#[derive(Debug, Deserialize, JsonSchema)]
pub struct CodeExamplesArgs {
    /// SDK feature or topic (e.g. "user_attributes", "content_cards")
    pub topic: String,
}

/// Arguments for event schema lookup
#[derive(Debug, Deserialize, JsonSchema)]
pub struct EventSchemaArgs {
    /// Event type identifier (e.g. "custom_event", "purchase", "user_attribute")
    pub event_key: String,
}

/// Arguments for the setup checklist
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SetupChecklistArgs {
    /// Target environment: "dev", "staging" or "prod" (default "dev")
    pub environment: Option<String>,
}

/// The four documentation tools, with access to the backend serialized
pub struct DocsToolset {
    docs: Arc<dyn DocsSearch>,
    lock: Mutex<()>,
}

impl DocsToolset {
    pub fn new(docs: Arc<dyn DocsSearch>) -> Self {
        Self {
            docs,
            lock: Mutex::new(()),
        }
    }

    async fn dispatch(&self, name: &str, input: &serde_json::Value) -> Result<String, String> {
        let _guard = self.lock.lock().await;
        match name {
            "search_docs" => {
                let args: SearchDocsArgs = parse_args(name, input)?;
                self.docs
                    .search(&args.query)
                    .await
                    .map_err(|e| tool_error("searching documentation", e))
            }
            "get_code_examples" => {
                let args: CodeExamplesArgs = parse_args(name, input)?;
                self.docs
                    .get_examples(&args.topic, "javascript", "web")
                    .await
                    .map_err(|e| tool_error("getting code examples", e))
            }
            "get_event_schema" => {
                let args: EventSchemaArgs = parse_args(name, input)?;
                self.docs
                    .get_event_schema(&args.event_key)
                    .await
                    .map_err(|e| tool_error("getting event schema", e))
            }
            "get_setup_checklist" => {
                let args: SetupChecklistArgs = parse_args(name, input)?;
                let environment = args.environment.unwrap_or_else(|| "dev".to_string());
                self.docs
                    .get_setup_checklist(&environment)
                    .await
                    .map_err(|e| tool_error("getting setup checklist", e))
            }
            other => Err(format!("Error: unknown tool '{}'", other)),
        }
    }
}

fn parse_args<T: DeserializeOwned>(name: &str, input: &serde_json::Value) -> Result<T, String> {
    serde_json::from_value(input.clone())
        .map_err(|e| format!("Error: invalid arguments for {}: {}", name, e))
}

fn tool_error(action: &str, e: anyhow::Error) -> String {
    error!(action, error = %e, "Documentation tool failed");
    format!("Error {}: {}", action, e)
}

#[async_trait]
impl ToolExecutor for DocsToolset {
    fn definitions(&self) -> Vec<ToolDef> {
        vec![
            ToolDef::for_args::<SearchDocsArgs>(
                "search_docs",
                "Search the SDK documentation. Returns relevant pages with titles, URLs and snippets.",
            ),
            ToolDef::for_args::<CodeExamplesArgs>(
                "get_code_examples",
                "Get working JavaScript code examples for a Web SDK feature.",
            ),
            ToolDef::for_args::<EventSchemaArgs>(
                "get_event_schema",
                "Get the JSON schema (fields, types, examples) for an event type.",
            ),
            ToolDef::for_args::<SetupChecklistArgs>(
                "get_setup_checklist",
                "Get a step-by-step SDK integration checklist for an environment.",
            ),
        ]
    }

    async fn execute(&self, name: &str, input: &serde_json::Value) -> String {
        match self.dispatch(name, input).await {
            Ok(text) | Err(text) => text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockDocs;

    #[tokio::test]
    async fn test_tools_route_to_backend() {
        let docs = Arc::new(MockDocs::default());
        let toolset = DocsToolset::new(docs.clone());

        let out = toolset
            .execute("get_code_examples", &serde_json::json!({"topic": "content_cards"}))
            .await;
        assert_eq!(out, "examples for content_cards (javascript/web)");

        let out = toolset
            .execute("get_setup_checklist", &serde_json::json!({}))
            .await;
        assert_eq!(out, "checklist for dev");
        assert_eq!(docs.calls(), 2);
    }

    #[tokio::test]
    async fn test_failures_become_error_strings() {
        let toolset = DocsToolset::new(Arc::new(UnconfiguredDocs));

        let out = toolset
            .execute("search_docs", &serde_json::json!({"query": "events"}))
            .await;
        assert_eq!(
            out,
            "Error searching documentation: documentation service is not configured"
        );

        let out = toolset.execute("search_docs", &serde_json::json!({})).await;
        assert!(out.starts_with("Error: invalid arguments for search_docs"));

        let out = toolset.execute("rm_rf", &serde_json::json!({})).await;
        assert_eq!(out, "Error: unknown tool 'rm_rf'");
    }

    #[test]
    fn test_definitions_carry_schemas() {
        let toolset = DocsToolset::new(Arc::new(UnconfiguredDocs));
        let defs = toolset.definitions();
        assert_eq!(defs.len(), 4);
        assert!(defs[2].input_schema.to_string().contains("event_key"));
    }

    #[test]
    fn test_render_body() {
        assert_eq!(render_body("\"plain\""), "plain");
        assert_eq!(render_body("not json"), "not json");
        assert!(render_body("{\"a\":1}").contains("\"a\": 1"));
    }
}
