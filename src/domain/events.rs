//! Event records for the append-only run log.
//!
//! Events are the source of truth for run progress. The type is a free-form
//! tag; the well-known tags produced by the scheduler and orchestrator are
//! listed in [`kinds`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single event in the append-only log.
///
/// `id` is unique across the whole store and strictly increasing, so it
/// doubles as a resumable cursor for readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Ordering key
    pub id: i64,

    /// The run this event belongs to (lookup key, not ownership)
    pub run_id: Uuid,

    /// Free-form type tag
    #[serde(rename = "type")]
    pub event_type: String,

    /// Free text, possibly serialized structured data
    pub payload: String,

    /// When the event was appended
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Whether this event describes a terminal status change
    pub fn is_terminal(&self) -> bool {
        kinds::TERMINAL.contains(&self.event_type.as_str())
    }
}

/// Well-known event type tags
pub mod kinds {
    pub const RUN_CREATED: &str = "RUN_CREATED";
    pub const RUN_STARTED: &str = "RUN_STARTED";
    pub const RUN_COMPLETED: &str = "RUN_COMPLETED";
    pub const RUN_FAILED: &str = "RUN_FAILED";
    pub const RUN_PAUSED: &str = "RUN_PAUSED";
    pub const RUN_RESUMED: &str = "RUN_RESUMED";
    pub const RUN_STOPPED: &str = "RUN_STOPPED";
    pub const DIRECTIVE: &str = "DIRECTIVE";

    // Simulated runs
    pub const AGENT_THINKING: &str = "AGENT_THINKING";
    pub const PLAN_GENERATED: &str = "PLAN_GENERATED";
    pub const EXECUTING: &str = "EXECUTING";

    // Workflow runs
    pub const WORKFLOW_LOOKUP: &str = "WORKFLOW_LOOKUP";
    pub const WORKFLOW_NOT_FOUND: &str = "WORKFLOW_NOT_FOUND";
    pub const PROJECT_NOT_FOUND: &str = "PROJECT_NOT_FOUND";
    pub const WORKFLOW_START: &str = "WORKFLOW_START";
    pub const WORKFLOW_STARTED: &str = "WORKFLOW_STARTED";
    pub const WORKFLOW_COMPLETED: &str = "WORKFLOW_COMPLETED";
    pub const WORKFLOW_FAILED: &str = "WORKFLOW_FAILED";
    pub const WORKFLOW_SUMMARY: &str = "WORKFLOW_SUMMARY";
    pub const STEP_STARTED: &str = "STEP_STARTED";
    pub const STEP_COMPLETED: &str = "STEP_COMPLETED";
    pub const SHELL_EXECUTING: &str = "SHELL_EXECUTING";
    pub const ARTIFACT_CREATED: &str = "ARTIFACT_CREATED";

    /// Prefix for text-generation progress (`LLM_GENERATING`, `LLM_HEARTBEAT`, ...)
    pub const LLM_PREFIX: &str = "LLM_";

    /// Events that accompany a terminal status write
    pub const TERMINAL: [&str; 3] = [RUN_COMPLETED, RUN_FAILED, RUN_STOPPED];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_type_tag() {
        let event = Event {
            id: 7,
            run_id: Uuid::new_v4(),
            event_type: kinds::DIRECTIVE.to_string(),
            payload: "do X".to_string(),
            created_at: Utc::now(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "DIRECTIVE");
        assert_eq!(json["id"], 7);
        assert!(!event.is_terminal());
    }

    #[test]
    fn test_terminal_tags() {
        let mut event = Event {
            id: 1,
            run_id: Uuid::new_v4(),
            event_type: kinds::RUN_FAILED.to_string(),
            payload: String::new(),
            created_at: Utc::now(),
        };
        assert!(event.is_terminal());

        event.event_type = kinds::STEP_COMPLETED.to_string();
        assert!(!event.is_terminal());
    }
}
