//! Run records and their status lifecycle.
//!
//! A Run is one request to execute a goal. It is created QUEUED, claimed
//! atomically by a scheduler (QUEUED -> RUNNING) and finalized as COMPLETED
//! or FAILED. PAUSED and STOPPED are reached only through control actions.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A persisted run record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    /// Opaque unique identifier, assigned at creation
    pub id: Uuid,

    /// Project whose workspace hosts workflow execution
    pub project_id: Option<i64>,

    /// Free-text goal
    pub goal: String,

    /// Optional human-readable name
    pub name: Option<String>,

    /// How the run is executed
    pub run_type: RunType,

    /// Current lifecycle state
    pub status: RunStatus,

    /// Progress counter for simulated runs
    pub current_iteration: u32,

    /// Execution options (provider, model, workflow selection, ...)
    pub options: RunOptions,

    /// Caller-defined metadata, never interpreted by the core
    pub metadata: Map<String, Value>,

    /// Creation time (immutable)
    pub created_at: DateTime<Utc>,
}

impl Run {
    /// Check if the run reached a terminal state
    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Lifecycle state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Queued,
    Running,
    Paused,
    Completed,
    Failed,
    Stopped,
}

impl RunStatus {
    /// Storage and wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Paused => "PAUSED",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Stopped => "STOPPED",
        }
    }

    /// Terminal states never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "QUEUED" => Ok(Self::Queued),
            "RUNNING" => Ok(Self::Running),
            "PAUSED" => Ok(Self::Paused),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            "STOPPED" => Ok(Self::Stopped),
            other => Err(format!("unknown run status: {other}")),
        }
    }
}

/// How a run is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunType {
    /// Inline simulated procedure
    #[default]
    Agent,

    /// Declarative workflow executed by the orchestrator
    Workflow,

    /// Alias of a workflow run, kept for API compatibility
    Pipeline,

    /// Lightweight simulated task
    Task,
}

impl RunType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Agent => "agent",
            Self::Workflow => "workflow",
            Self::Pipeline => "pipeline",
            Self::Task => "task",
        }
    }

    /// Whether this run type is driven by the workflow orchestrator
    pub fn is_orchestrated(&self) -> bool {
        matches!(self, Self::Workflow | Self::Pipeline)
    }
}

impl fmt::Display for RunType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "agent" => Ok(Self::Agent),
            "workflow" => Ok(Self::Workflow),
            "pipeline" => Ok(Self::Pipeline),
            "task" => Ok(Self::Task),
            other => Err(format!("unknown run type: {other}")),
        }
    }
}

/// Execution options attached to a run.
///
/// Known keys are typed; anything else is carried through untouched in
/// `extra` so callers can stash their own configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Provider name (resolved at creation time)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// Model name (resolved at creation time)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Route text generation to the offline provider
    #[serde(default, skip_serializing_if = "is_false")]
    pub dry_run: bool,

    /// Workflow to execute for orchestrated runs
    #[serde(default, alias = "workflow", skip_serializing_if = "Option::is_none")]
    pub workflow_name: Option<String>,

    /// Per-role model overrides (role -> model)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub models: HashMap<String, String>,

    /// Run-level text generation timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,

    /// Run-level heartbeat interval while generating
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_interval_seconds: Option<u64>,

    /// Unrecognized keys
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_and_terminal() {
        for status in [
            RunStatus::Queued,
            RunStatus::Running,
            RunStatus::Paused,
            RunStatus::Completed,
            RunStatus::Failed,
            RunStatus::Stopped,
        ] {
            assert_eq!(status.as_str().parse::<RunStatus>().unwrap(), status);
        }

        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Stopped.is_terminal());
        assert!(!RunStatus::Paused.is_terminal());
        assert!("bogus".parse::<RunStatus>().is_err());
    }

    #[test]
    fn test_run_type_dispatch_class() {
        assert_eq!("WORKFLOW".parse::<RunType>().unwrap(), RunType::Workflow);
        assert!(RunType::Pipeline.is_orchestrated());
        assert!(!RunType::Agent.is_orchestrated());
        assert_eq!(RunType::default(), RunType::Agent);
    }

    #[test]
    fn test_options_keep_unknown_keys() {
        let json = r#"{"workflow":"custom","dry_run":true,"team":"infra","models":{"planner":"llama2"}}"#;
        let options: RunOptions = serde_json::from_str(json).unwrap();

        assert_eq!(options.workflow_name.as_deref(), Some("custom"));
        assert!(options.dry_run);
        assert_eq!(options.models.get("planner").map(String::as_str), Some("llama2"));
        assert_eq!(options.extra.get("team"), Some(&Value::from("infra")));

        let back = serde_json::to_value(&options).unwrap();
        assert_eq!(back["team"], "infra");
        assert_eq!(back["workflow_name"], "custom");
    }
}
