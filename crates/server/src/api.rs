//! HTTP routes under `/api/v1`.

use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
    routing::{get, post},
    Router,
};
use futures::{Stream, StreamExt};
use pagegen_core::{LlmProvider, Orchestrator, OrchestratorConfig, OrchestratorError};
use serde::{Deserialize, Serialize};

use crate::config::PersistedConfig;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    /// Token of the most recently started run
    active_run: RwLock<Option<CancellationToken>>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            active_run: RwLock::new(None),
        }
    }

    /// Register a fresh token as the active run
    async fn start_run(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.active_run.write().await = Some(token.clone());
        token
    }
}

pub type SharedState = Arc<AppState>;

#[derive(Debug, Deserialize)]
pub struct ConfigureRequest {
    pub api_key: String,
    pub sdk_endpoint: String,
}

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub message: String,
    #[serde(default)]
    pub website_url: Option<String>,
    #[serde(default)]
    pub max_refinement_iterations: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ApiResponse {
            success: false,
            message: message.into(),
        }),
    )
        .into_response()
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/api/v1/configure", post(configure))
        .route("/api/v1/generate", post(generate))
        .route("/api/v1/generate/stream", post(generate_stream))
        .route("/api/v1/stop", post(stop))
        .route("/api/v1/config", get(get_config).patch(update_config))
        .route("/api/v1/providers", get(get_providers))
        .with_state(state)
}

async fn configure(State(state): State<SharedState>, Json(req): Json<ConfigureRequest>) -> Response {
    match state.orchestrator.configure(&req.api_key, &req.sdk_endpoint) {
        Ok(()) => Json(ApiResponse {
            success: true,
            message: "SDK connection configured".to_string(),
        })
        .into_response(),
        Err(e) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

/// Blocking generation; responds with the final state
async fn generate(State(state): State<SharedState>, Json(req): Json<GenerateRequest>) -> Response {
    let cancel = state.start_run().await;
    let result = state
        .orchestrator
        .generate_with_cancel(
            &req.message,
            req.website_url,
            req.max_refinement_iterations,
            cancel,
        )
        .await;

    match result {
        Ok(final_state) => Json(final_state).into_response(),
        Err(e @ OrchestratorError::NotConfigured) => {
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        }
        Err(e @ OrchestratorError::Cancelled) => error_response(StatusCode::CONFLICT, e.to_string()),
    }
}

async fn generate_stream(
    State(state): State<SharedState>,
    Json(req): Json<GenerateRequest>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let cancel = state.start_run().await;
    let events = state.orchestrator.generate_streaming(
        &req.message,
        req.website_url,
        req.max_refinement_iterations,
        cancel,
    );

    let stream = events.map(|event| Event::default().event(event.kind()).json_data(&event));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn stop(State(state): State<SharedState>) -> Json<ApiResponse> {
    match state.active_run.write().await.take() {
        Some(token) => {
            token.cancel();
            tracing::info!("Active run cancelled");
            Json(ApiResponse {
                success: true,
                message: "Generation stopped".to_string(),
            })
        }
        None => Json(ApiResponse {
            success: false,
            message: "No active generation".to_string(),
        }),
    }
}

async fn get_config(State(state): State<SharedState>) -> Json<OrchestratorConfig> {
    Json(state.orchestrator.config().clone())
}

/// Merge into `.pagegen/config.json`; applies on the next start
async fn update_config(Json(updates): Json<PersistedConfig>) -> Response {
    let mut config = PersistedConfig::load().await;
    config.merge(updates);
    match config.save().await {
        Ok(()) => Json(config).into_response(),
        Err(e) => {
            tracing::warn!("Failed to save config: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub id: LlmProvider,
    pub name: String,
    pub default_model: String,
    pub supports_base_url: bool,
}

async fn get_providers() -> Json<Vec<ProviderInfo>> {
    let providers = LlmProvider::all()
        .into_iter()
        .map(|p| ProviderInfo {
            id: p,
            name: p.display_name().to_string(),
            default_model: p.default_model().to_string(),
            supports_base_url: p.supports_base_url(),
        })
        .collect();
    Json(providers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use pagegen_core::tools::{DocsToolset, FileExporter, HttpBrandingExtractor, UnconfiguredDocs};
    use pagegen_core::workflow::Collaborators;
    use pagegen_core::ModelConfig;
    use std::collections::HashMap;
    use std::time::Duration;

    /// Orchestrator with real adapters that never reach the network in these tests
    fn app_state() -> SharedState {
        let collaborators = Collaborators {
            llm: ModelConfig::default().create_llm_with_key("test-key"),
            stage_llms: HashMap::new(),
            branding: Arc::new(HttpBrandingExtractor::new(Duration::from_secs(1))),
            research_tools: Arc::new(DocsToolset::new(Arc::new(UnconfiguredDocs))),
            validator: None,
            exporter: Arc::new(FileExporter::new(std::env::temp_dir())),
        };
        let orchestrator = Orchestrator::new(OrchestratorConfig::default(), collaborators);
        Arc::new(AppState::new(Arc::new(orchestrator)))
    }

    async fn body_of(response: Response) -> ApiResponse {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_configure_rejects_short_key() {
        let state = app_state();
        let response = configure(
            State(state.clone()),
            Json(ConfigureRequest {
                api_key: "short".to_string(),
                sdk_endpoint: "sdk.iad-01.braze.com".to_string(),
            }),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_of(response).await;
        assert!(!body.success);
        assert!(body.message.contains("too short"));
        assert!(!state.orchestrator.is_configured());
    }

    #[tokio::test]
    async fn test_configure_accepts_valid_settings() {
        let state = app_state();
        let response = configure(
            State(state.clone()),
            Json(ConfigureRequest {
                api_key: "k".repeat(40),
                sdk_endpoint: "https://sdk.iad-01.braze.com".to_string(),
            }),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(state.orchestrator.is_configured());
    }

    #[tokio::test]
    async fn test_generate_requires_configuration() {
        let response = generate(
            State(app_state()),
            Json(GenerateRequest {
                message: "Build a page".to_string(),
                website_url: None,
                max_refinement_iterations: None,
            }),
        )
        .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_of(response).await;
        assert!(body.message.contains("not configured"));
    }

    #[tokio::test]
    async fn test_stop_cancels_active_run() {
        let state = app_state();
        let token = state.start_run().await;

        let Json(body) = stop(State(state.clone())).await;
        assert!(body.success);
        assert!(token.is_cancelled());

        let Json(body) = stop(State(state)).await;
        assert!(!body.success);
    }

    #[tokio::test]
    async fn test_new_run_replaces_active_token() {
        let state = app_state();
        let first = state.start_run().await;
        let second = state.start_run().await;

        let _ = stop(State(state)).await;
        assert!(second.is_cancelled());
        assert!(!first.is_cancelled());
    }

    #[tokio::test]
    async fn test_get_config_reports_effective_values() {
        let Json(config) = get_config(State(app_state())).await;
        assert_eq!(config.max_refinement_iterations, 3);
        assert_eq!(config.research_step_budget, 35);
    }

    #[tokio::test]
    async fn test_providers_list() {
        let Json(providers) = get_providers().await;
        assert_eq!(providers.len(), 2);
        let openai = providers
            .iter()
            .find(|p| p.id == LlmProvider::OpenAI)
            .unwrap();
        assert!(openai.supports_base_url);
        assert_eq!(openai.default_model, "gpt-4o");
    }
}
