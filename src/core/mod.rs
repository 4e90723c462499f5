//! Core run-tracking logic.
//!
//! This module contains:
//! - Database / RunStore / ProjectStore: SQLite persistence
//! - EventLog: append-only events and live tail
//! - Workflow: declarative step lists and model overrides
//! - Orchestrator: step-by-step workflow execution
//! - RunScheduler / BackgroundLoop: claiming and executing queued runs
//! - RunService: the control surface shared by CLI and HTTP

pub mod background;
pub mod database;
pub mod event_log;
pub mod orchestrator;
pub mod project_store;
pub mod run_store;
pub mod scheduler;
pub mod service;
pub mod workflow;

// Re-export commonly used types
pub use background::BackgroundLoop;
pub use database::{Database, StoreError};
pub use event_log::{EventLog, TailItem, TailOptions};
pub use orchestrator::{GenerationSettings, Orchestrator, ProgressSink, StepResult, WorkflowReport};
pub use project_store::ProjectStore;
pub use run_store::{ClaimOutcome, RunFilter, RunStore};
pub use scheduler::{RunScheduler, SchedulerSettings};
pub use service::{CreateProject, CreateRun, RunService, ServiceError, WorkflowSummary};
pub use workflow::{
    apply_model_overrides, ModelOverrides, StepKind, Workflow, WorkflowRegistry, WorkflowStep,
    DEFAULT_WORKFLOW,
};
