//! # Workflow
//!
//! The stage graph, its routing rule, progress events and the orchestrator
//! facade.

pub mod engine;
pub mod events;
pub mod orchestrator;
pub mod router;

pub use engine::{RunOutcome, RunStatus, WorkflowEngine};
pub use events::WorkflowEvent;
pub use orchestrator::{Collaborators, Orchestrator, OrchestratorConfig};
pub use router::{route_after_validation, Route};
