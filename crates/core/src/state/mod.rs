pub mod types;
pub mod workflow_state;

pub use types::{
    ApiConfig, BrandingData, ChatMessage, ColorScheme, FeaturePlan, GeneratedCode,
    ResearchResult, Role, SdkFeature, Severity, Typography, ValidationIssue, ValidationReport,
};
pub use workflow_state::{NextStep, StateUpdate, WorkflowState};
