//! # Pagegen Core
//!
//! Generates SDK demo landing pages from a natural-language request through
//! a six-stage pipeline: planning, research, code generation, validation,
//! refinement and finalization.
//!
//! ## Architecture
//!
//! - `state/` - The workflow state, its partial updates and domain records
//! - `stages/` - The six stages behind one `Stage` trait, plus prompt templates
//! - `workflow/` - The engine driving the stage graph and the orchestrator facade
//! - `llm/` - LLM backends and the bounded tool-calling agent
//! - `tools/` - Branding, documentation, browser and export collaborators
//! - `models` - LLM provider selection
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pagegen_core::{Orchestrator, OrchestratorConfig};
//!
//! let orchestrator = Orchestrator::from_env(OrchestratorConfig::default())?;
//! orchestrator.configure(&api_key, "https://sdk.iad-01.braze.com")?;
//! let state = orchestrator.generate("Content cards and push for acme.io", None, None).await?;
//! println!("{:?}", state.export_path);
//! ```

pub mod error;
pub mod html;
pub mod llm;
pub mod models;
pub mod stages;
pub mod state;
pub mod tools;
pub mod workflow;

#[cfg(test)]
mod test_support;

pub use error::{ConfigError, OrchestratorError};
pub use models::{LlmProvider, ModelConfig};
pub use stages::StageId;
pub use state::{ApiConfig, WorkflowState};
pub use workflow::{Orchestrator, OrchestratorConfig, RunStatus, WorkflowEvent};
