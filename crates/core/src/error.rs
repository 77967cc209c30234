//! # Errors
//!
//! Typed errors for configuration and the orchestrator facade. Stage and
//! collaborator failures stay inside `anyhow` and the state's `error` field.

use thiserror::Error;

/// Minimum accepted length of an SDK API key
pub const MIN_API_KEY_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("API key is too short ({actual} characters, at least {min} required)")]
    ApiKeyTooShort { min: usize, actual: usize },
    #[error("SDK endpoint is required")]
    MissingEndpoint,
    #[error("No API key found for {0} (set the provider's API key environment variable)")]
    MissingLlmKey(String),
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Orchestrator is not configured, call configure() with an API key and endpoint first")]
    NotConfigured,
    #[error("Generation was cancelled")]
    Cancelled,
}
