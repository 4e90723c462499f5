//! Control surface over the core: run creation, queries, live tail,
//! directives and pause/resume/stop.
//!
//! Shared by the CLI and the HTTP layer. Errors are classified into
//! client-facing categories by `ServiceError`.

use std::path::PathBuf;
use std::sync::Arc;

use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::adapters::{ProviderError, ProviderInfo, ProviderRegistry};
use crate::domain::{kinds, Event, Project, Run, RunOptions, RunStatus, RunType};

use super::database::{Database, StoreError};
use super::event_log::{EventLog, TailItem, TailOptions};
use super::project_store::ProjectStore;
use super::run_store::{new_run, RunFilter, RunStore};
use super::workflow::WorkflowRegistry;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("Provider rejected: {0}")]
    ProviderRejected(#[from] ProviderError),

    #[error("{0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::RunNotFound(_) | StoreError::ProjectNotFound(_) => {
                Self::NotFound(e.to_string())
            }
            StoreError::ProjectExists(_) | StoreError::InvalidTransition { .. } => {
                Self::Conflict(e.to_string())
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

/// Request to create a run
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateRun {
    pub goal: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub run_type: RunType,
    #[serde(default)]
    pub project_id: Option<i64>,
    #[serde(default)]
    pub options: RunOptions,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Request to register a project
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProject {
    pub name: String,
    pub local_path: PathBuf,
}

/// Workflow as listed to clients
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowSummary {
    pub name: String,
    pub version: String,
    pub description: String,
    pub steps: Vec<String>,
}

#[derive(Clone)]
pub struct RunService {
    runs: RunStore,
    events: EventLog,
    projects: ProjectStore,
    providers: ProviderRegistry,
    workflows: Arc<WorkflowRegistry>,
}

impl RunService {
    pub fn new(db: Database, providers: ProviderRegistry, workflows: Arc<WorkflowRegistry>) -> Self {
        Self {
            runs: RunStore::new(db.clone()),
            events: EventLog::new(db.clone()),
            projects: ProjectStore::new(db),
            providers,
            workflows,
        }
    }

    pub fn create_project(&self, request: CreateProject) -> Result<Project, ServiceError> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(ServiceError::InvalidRequest(
                "project name must not be empty".to_string(),
            ));
        }

        let project = self.projects.create(name, request.local_path)?;
        info!(project_id = project.id, name = %project.name, "Project created");
        Ok(project)
    }

    pub fn list_projects(&self) -> Result<Vec<Project>, ServiceError> {
        Ok(self.projects.list()?)
    }

    /// Validate, resolve the provider and persist a QUEUED run.
    ///
    /// Nothing is written when validation or provider resolution fails.
    pub async fn create_run(&self, request: CreateRun) -> Result<Run, ServiceError> {
        let goal = request.goal.trim();
        if goal.is_empty() {
            return Err(ServiceError::InvalidRequest(
                "goal must not be empty".to_string(),
            ));
        }

        if let Some(project_id) = request.project_id {
            self.projects.get(project_id)?;
        }

        let mut options = request.options;
        let requested = if options.dry_run {
            Some(self.providers.offline_provider().to_string())
        } else {
            options.provider.clone()
        };

        if request.run_type.is_orchestrated() || requested.is_some() {
            let resolved = self
                .providers
                .resolve(requested.as_deref(), options.model.as_deref())
                .await?;
            options.provider = Some(resolved.provider);
            options.model = Some(resolved.model);
        }

        let mut run = new_run(goal, request.run_type);
        run.name = request.name.filter(|n| !n.trim().is_empty());
        run.project_id = request.project_id;
        run.options = options;
        run.metadata = request.metadata;

        self.runs.create(&run)?;
        info!(run_id = %run.id, run_type = %run.run_type, "Run queued");
        Ok(run)
    }

    pub fn get_run(&self, id: &Uuid) -> Result<Run, ServiceError> {
        Ok(self.runs.get(id)?)
    }

    pub fn list_runs(&self, filter: &RunFilter) -> Result<Vec<Run>, ServiceError> {
        Ok(self.runs.list(filter)?)
    }

    pub fn list_events(&self, id: &Uuid, after_id: Option<i64>) -> Result<Vec<Event>, ServiceError> {
        self.runs.get(id)?;
        Ok(self.events.list(id, after_id)?)
    }

    /// Live tail of a run's events after `from_id`
    pub fn tail(
        &self,
        id: &Uuid,
        from_id: i64,
        options: TailOptions,
    ) -> Result<impl Stream<Item = Result<TailItem, StoreError>> + Send + 'static, ServiceError> {
        self.runs.get(id)?;
        Ok(self.events.tail(*id, from_id, options))
    }

    /// Record a free-text directive; the run's status is untouched
    pub fn directive(&self, id: &Uuid, text: &str) -> Result<Event, ServiceError> {
        if text.trim().is_empty() {
            return Err(ServiceError::InvalidRequest(
                "directive must not be empty".to_string(),
            ));
        }
        self.runs.get(id)?;
        Ok(self.events.record(id, kinds::DIRECTIVE, text)?)
    }

    pub fn pause(&self, id: &Uuid) -> Result<Run, ServiceError> {
        self.control(id, &[RunStatus::Running], RunStatus::Paused, kinds::RUN_PAUSED, "Run paused")
    }

    pub fn resume(&self, id: &Uuid) -> Result<Run, ServiceError> {
        self.control(id, &[RunStatus::Paused], RunStatus::Running, kinds::RUN_RESUMED, "Run resumed")
    }

    pub fn stop(&self, id: &Uuid) -> Result<Run, ServiceError> {
        self.control(
            id,
            &[RunStatus::Queued, RunStatus::Running, RunStatus::Paused],
            RunStatus::Stopped,
            kinds::RUN_STOPPED,
            "Run stopped",
        )
    }

    fn control(
        &self,
        id: &Uuid,
        from: &[RunStatus],
        to: RunStatus,
        event_type: &str,
        payload: &str,
    ) -> Result<Run, ServiceError> {
        let run = self.runs.transition(id, from, to, event_type, payload)?;
        info!(run_id = %id, status = %to, "Run status changed");
        Ok(run)
    }

    pub async fn providers(&self) -> Vec<ProviderInfo> {
        self.providers.describe().await
    }

    pub fn workflows(&self) -> Vec<WorkflowSummary> {
        self.workflows
            .list()
            .map(|w| WorkflowSummary {
                name: w.name.clone(),
                version: w.version.clone(),
                description: w.description.clone(),
                steps: w.steps.iter().map(|s| s.name.clone()).collect(),
            })
            .collect()
    }
}
