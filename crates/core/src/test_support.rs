//! Scripted collaborators shared by the unit tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::llm::{ChatTurn, ContentBlock, LlmBackend, Message, TokenSink, ToolDef};
use crate::stages::planning::default_plan;
use crate::stages::StageId;
use crate::state::{BrandingData, FeaturePlan, ValidationReport};
use crate::tools::{BrandingExtractor, BrowserValidator, DocsSearch, DocsToolset, Exporter};
use crate::workflow::orchestrator::Collaborators;

/// Plan with the two default features and the given title
pub fn sample_plan(title: &str) -> FeaturePlan {
    FeaturePlan {
        page_title: title.to_string(),
        ..default_plan(None)
    }
}

/// LLM that replays scripted responses and counts calls
#[derive(Default)]
pub struct MockLlm {
    completions: Mutex<VecDeque<Result<String, String>>>,
    default_completion: Mutex<Option<Result<String, String>>>,
    structured: Mutex<VecDeque<Result<serde_json::Value, String>>>,
    chat_turns: Mutex<VecDeque<ChatTurn>>,
    prompts: Mutex<Vec<(String, String)>>,
    complete_calls: AtomicUsize,
    structured_calls: AtomicUsize,
    chat_calls: AtomicUsize,
    cancel_on_chat: Option<CancellationToken>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_completion(self, text: &str) -> Self {
        self.completions.lock().unwrap().push_back(Ok(text.to_string()));
        self
    }

    pub fn with_completion_error(self, message: &str) -> Self {
        self.completions.lock().unwrap().push_back(Err(message.to_string()));
        self
    }

    pub fn with_default_completion(self, text: &str) -> Self {
        self.set_default_completion(text);
        self
    }

    pub fn with_structured(self, value: serde_json::Value) -> Self {
        self.structured.lock().unwrap().push_back(Ok(value));
        self
    }

    pub fn with_structured_error(self, message: &str) -> Self {
        self.fail_structured(message);
        self
    }

    pub fn with_chat_turns(self, turns: Vec<ChatTurn>) -> Self {
        self.chat_turns.lock().unwrap().extend(turns);
        self
    }

    /// Cancel `token` on the first chat call and never answer
    pub fn cancelling_on_chat(mut self, token: CancellationToken) -> Self {
        self.cancel_on_chat = Some(token);
        self
    }

    /// Completion returned once the scripted queue is empty
    pub fn set_default_completion(&self, text: &str) {
        *self.default_completion.lock().unwrap() = Some(Ok(text.to_string()));
    }

    /// Make every further completion fail with `message`
    pub fn fail_completions(&self, message: &str) {
        self.completions.lock().unwrap().clear();
        *self.default_completion.lock().unwrap() = Some(Err(message.to_string()));
    }

    pub fn fail_structured(&self, message: &str) {
        self.structured.lock().unwrap().push_back(Err(message.to_string()));
    }

    pub fn push_chat_turn(&self, turn: ChatTurn) {
        self.chat_turns.lock().unwrap().push_back(turn);
    }

    pub fn complete_calls(&self) -> usize {
        self.complete_calls.load(Ordering::SeqCst)
    }

    pub fn structured_calls(&self) -> usize {
        self.structured_calls.load(Ordering::SeqCst)
    }

    pub fn chat_calls(&self) -> usize {
        self.chat_calls.load(Ordering::SeqCst)
    }

    /// (system, user) prompts of every completion, oldest first
    pub fn prompts(&self) -> Vec<(String, String)> {
        self.prompts.lock().unwrap().clone()
    }

    fn record(&self, system: &str, prompt: &str) {
        self.prompts
            .lock()
            .unwrap()
            .push((system.to_string(), prompt.to_string()));
    }
}

#[async_trait]
impl LlmBackend for MockLlm {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, system: &str, prompt: &str, on_token: TokenSink<'_>) -> Result<String> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        self.record(system, prompt);
        let scripted = self.completions.lock().unwrap().pop_front();
        let next = scripted
            .or_else(|| self.default_completion.lock().unwrap().clone())
            .unwrap_or_else(|| Err("no scripted completion".to_string()));
        let text = next.map_err(|e| anyhow!(e))?;
        if let Some(sink) = on_token {
            sink(&text);
        }
        Ok(text)
    }

    async fn complete_structured(
        &self,
        system: &str,
        prompt: &str,
        _schema: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        self.structured_calls.fetch_add(1, Ordering::SeqCst);
        self.record(system, prompt);
        let next = self.structured.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Err("no scripted structured output".to_string()))
            .map_err(|e| anyhow!(e))
    }

    async fn chat(&self, _system: &str, _messages: &[Message], _tools: &[ToolDef]) -> Result<ChatTurn> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(token) = &self.cancel_on_chat {
            token.cancel();
            std::future::pending::<()>().await;
        }
        let next = self.chat_turns.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| ChatTurn {
            content: vec![ContentBlock::Text {
                text: "Call braze.logCustomEvent('demo_click') after braze.openSession().".to_string(),
            }],
            stop_reason: Some("end_turn".to_string()),
        }))
    }
}

/// Branding extractor that reports success for any URL
#[derive(Default)]
pub struct MockBranding {
    calls: AtomicUsize,
}

impl MockBranding {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrandingExtractor for MockBranding {
    async fn analyze(&self, url: &str) -> BrandingData {
        self.calls.fetch_add(1, Ordering::SeqCst);
        BrandingData {
            website_url: Some(url.to_string()),
            extraction_success: true,
            fallback_used: false,
            extraction_notes: "scripted".to_string(),
            ..BrandingData::default()
        }
    }
}

#[derive(Default)]
pub struct MockDocs {
    calls: AtomicUsize,
}

impl MockDocs {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocsSearch for MockDocs {
    async fn search(&self, query: &str) -> Result<String> {
        self.hit();
        Ok(format!("docs for {}", query))
    }

    async fn get_examples(&self, topic: &str, language: &str, sdk: &str) -> Result<String> {
        self.hit();
        Ok(format!("examples for {} ({}/{})", topic, language, sdk))
    }

    async fn get_event_schema(&self, event_key: &str) -> Result<String> {
        self.hit();
        Ok(format!("schema for {}", event_key))
    }

    async fn get_setup_checklist(&self, environment: &str) -> Result<String> {
        self.hit();
        Ok(format!("checklist for {}", environment))
    }
}

pub struct MockValidator {
    failure: Option<String>,
}

impl MockValidator {
    pub fn passing() -> Self {
        Self { failure: None }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
        }
    }
}

#[async_trait]
impl BrowserValidator for MockValidator {
    async fn validate(&self, _html: &str) -> Result<ValidationReport> {
        match &self.failure {
            Some(message) => Err(anyhow!(message.clone())),
            None => Ok(ValidationReport::skipped()),
        }
    }
}

/// Exporter that remembers the last page instead of writing it
pub struct MockExporter {
    result: Result<String, String>,
    last: Mutex<Option<String>>,
}

impl MockExporter {
    pub fn at(path: &str) -> Self {
        Self {
            result: Ok(path.to_string()),
            last: Mutex::new(None),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            result: Err(message.to_string()),
            last: Mutex::new(None),
        }
    }

    pub fn exported(&self) -> Option<String> {
        self.last.lock().unwrap().clone()
    }
}

#[async_trait]
impl Exporter for MockExporter {
    async fn export(&self, html: &str, _branding: &BrandingData, _plan: &FeaturePlan) -> Result<String> {
        let path = self.result.clone().map_err(|e| anyhow!(e))?;
        *self.last.lock().unwrap() = Some(html.to_string());
        Ok(path)
    }
}

/// One mock per collaborator, with responses that let a run finish
pub struct TestRig {
    pub planner: Arc<MockLlm>,
    pub researcher: Arc<MockLlm>,
    pub coder: Arc<MockLlm>,
    pub validator_llm: Arc<MockLlm>,
    pub refiner: Arc<MockLlm>,
    pub polisher: Arc<MockLlm>,
    pub branding: Arc<MockBranding>,
    pub docs: Arc<MockDocs>,
    pub exporter: Arc<MockExporter>,
}

impl Default for TestRig {
    fn default() -> Self {
        Self {
            planner: Arc::new(MockLlm::new()),
            researcher: Arc::new(MockLlm::new()),
            coder: Arc::new(MockLlm::new().with_default_completion(
                "```html\n<html><body><button onclick=\"braze.logCustomEvent('demo_click')\">Go</button></body></html>\n```",
            )),
            validator_llm: Arc::new(MockLlm::new().with_default_completion("PASS")),
            refiner: Arc::new(MockLlm::new().with_default_completion("<html>refined</html>")),
            polisher: Arc::new(MockLlm::new().with_default_completion("<html>polished</html>")),
            branding: Arc::new(MockBranding::default()),
            docs: Arc::new(MockDocs::default()),
            exporter: Arc::new(MockExporter::at("/tmp/exports/page.html")),
        }
    }
}

/// Collaborators wired to the rig's mocks
pub fn collaborators(rig: &TestRig) -> Collaborators {
    let mut stage_llms: std::collections::HashMap<StageId, Arc<dyn LlmBackend>> =
        std::collections::HashMap::new();
    stage_llms.insert(StageId::Planning, rig.planner.clone());
    stage_llms.insert(StageId::Research, rig.researcher.clone());
    stage_llms.insert(StageId::CodeGeneration, rig.coder.clone());
    stage_llms.insert(StageId::Validation, rig.validator_llm.clone());
    stage_llms.insert(StageId::Refinement, rig.refiner.clone());
    stage_llms.insert(StageId::Finalization, rig.polisher.clone());

    Collaborators {
        llm: rig.planner.clone(),
        stage_llms,
        branding: rig.branding.clone(),
        research_tools: Arc::new(DocsToolset::new(rig.docs.clone())),
        validator: None,
        exporter: rig.exporter.clone(),
    }
}
