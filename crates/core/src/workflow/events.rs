//! # Workflow Events
//!
//! Progress events yielded by the streaming run. Every stream ends with
//! exactly one terminal event: `complete`, `error` or `cancelled`.

use serde::{Deserialize, Serialize};

use crate::state::WorkflowState;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// A stage is about to run
    NodeStart { node: String },
    /// A stage finished and its update was merged
    NodeComplete { node: String, status: String },
    /// A stage appended a conversation message
    Message { content: String },
    /// Streamed model output
    Token { node: String, text: String },
    /// Progress note from inside a stage
    Status { node: String, message: String },
    /// Absorbed failure, or the terminal failure of the run
    Error { message: String },
    /// Terminal: run finished with this state
    Complete { state: Box<WorkflowState> },
    /// Terminal: run was stopped
    Cancelled,
}

impl WorkflowEvent {
    /// Event name as it appears in the `type` field
    pub fn kind(&self) -> &'static str {
        match self {
            WorkflowEvent::NodeStart { .. } => "node_start",
            WorkflowEvent::NodeComplete { .. } => "node_complete",
            WorkflowEvent::Message { .. } => "message",
            WorkflowEvent::Token { .. } => "token",
            WorkflowEvent::Status { .. } => "status",
            WorkflowEvent::Error { .. } => "error",
            WorkflowEvent::Complete { .. } => "complete",
            WorkflowEvent::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_format() {
        let event = WorkflowEvent::NodeComplete {
            node: "validation".to_string(),
            status: "✓ Browser validation complete".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "node_complete");
        assert_eq!(json["node"], "validation");

        let json = serde_json::to_value(WorkflowEvent::Cancelled).unwrap();
        assert_eq!(json["type"], "cancelled");
    }

    #[test]
    fn test_kind_matches_serialized_tag() {
        let events = [
            WorkflowEvent::NodeStart {
                node: "planning".to_string(),
            },
            WorkflowEvent::Error {
                message: "x".to_string(),
            },
            WorkflowEvent::Cancelled,
        ];
        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], event.kind());
        }
    }
}
