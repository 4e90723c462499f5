//! Run scheduler: claims queued runs and drives them to a terminal state.
//!
//! The scheduler is the only place that turns an execution failure into a
//! persisted run status. Nothing below it writes run-level state.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::FutureExt;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::{ProviderRegistry, ShellRunner};
use crate::domain::{kinds, Run, RunStatus};

use super::database::{Database, StoreError};
use super::event_log::EventLog;
use super::orchestrator::{GenerationSettings, Orchestrator};
use super::project_store::ProjectStore;
use super::run_store::{ClaimOutcome, RunStore};
use super::workflow::{apply_model_overrides, ModelOverrides, WorkflowRegistry, DEFAULT_WORKFLOW};

/// Tunables for run execution
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Base delay between simulated phases
    pub simulation_delay: Duration,

    /// Generation defaults when neither the run nor the step sets them
    pub generation: GenerationSettings,

    /// Environment-level default model per workflow role
    pub role_models: HashMap<String, String>,
}

impl SchedulerSettings {
    pub fn from_config(config: &crate::config::ResolvedConfig) -> Self {
        Self {
            simulation_delay: config.simulation_delay,
            generation: GenerationSettings {
                timeout: config.generation_timeout,
                heartbeat_interval: config.heartbeat_interval,
            },
            role_models: config.role_models.clone(),
        }
    }
}

/// Claims queued runs and executes them
pub struct RunScheduler {
    runs: RunStore,
    events: EventLog,
    projects: ProjectStore,
    providers: ProviderRegistry,
    workflows: Arc<WorkflowRegistry>,
    shell: ShellRunner,
    settings: SchedulerSettings,
}

impl RunScheduler {
    pub fn new(
        db: Database,
        providers: ProviderRegistry,
        workflows: Arc<WorkflowRegistry>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            runs: RunStore::new(db.clone()),
            events: EventLog::new(db.clone()),
            projects: ProjectStore::new(db),
            providers,
            workflows,
            shell: ShellRunner::default(),
            settings,
        }
    }

    pub fn with_shell(mut self, shell: ShellRunner) -> Self {
        self.shell = shell;
        self
    }

    /// Claim and execute one run.
    ///
    /// Returns true only if this call claimed the run and completed it.
    /// Never fails: losing the claim race is a silent `false`, and any
    /// error or panic during execution becomes a FAILED status.
    #[instrument(skip(self), fields(run_id = %run_id))]
    pub async fn execute_run(&self, run_id: Uuid) -> bool {
        let run = match self.runs.claim(&run_id) {
            Ok(ClaimOutcome::Claimed(run)) => run,
            Ok(ClaimOutcome::NotClaimed) => {
                info!("Run already claimed or not queued; skipping");
                return false;
            }
            Ok(ClaimOutcome::ClaimedUnreadable(e)) => {
                error!(error = %e, "Claimed run could not be loaded");
                self.mark_failed(&run_id, &format!("Failed to load claimed run: {e}"));
                return false;
            }
            Err(StoreError::ClaimInvariant { affected, .. }) => {
                error!(
                    affected,
                    "Claim matched more than one row; transaction rolled back"
                );
                return false;
            }
            Err(e) => {
                error!(error = %e, "Claim failed");
                return false;
            }
        };

        info!(goal = %run.goal, run_type = %run.run_type, "Starting run");

        let outcome = AssertUnwindSafe(self.dispatch(&run)).catch_unwind().await;
        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(format!("{e:#}")),
            Err(panic) => Some(panic_message(panic.as_ref())),
        };

        match failure {
            None => self.complete(&run_id),
            Some(reason) => {
                error!(error = %reason, "Run failed");
                self.mark_failed(&run_id, &reason);
                false
            }
        }
    }

    /// Claim and execute up to `max` queued runs, one after another.
    ///
    /// Returns the number of runs this call completed.
    pub async fn process_queued_runs(&self, max: usize) -> usize {
        let queued = match self.runs.queued_ids(max) {
            Ok(ids) => ids,
            Err(e) => {
                error!(error = %e, "Failed to list queued runs");
                return 0;
            }
        };

        if queued.is_empty() {
            return 0;
        }
        info!(count = queued.len(), "Found queued runs");

        let mut completed = 0;
        for run_id in queued {
            if self.execute_run(run_id).await {
                completed += 1;
            }
        }
        completed
    }

    fn complete(&self, run_id: &Uuid) -> bool {
        match self.runs.finalize(
            run_id,
            RunStatus::Completed,
            kinds::RUN_COMPLETED,
            "Run completed successfully",
        ) {
            Ok(true) => {
                info!("Run completed");
                true
            }
            Ok(false) => {
                info!("Run left RUNNING during execution; keeping its status");
                false
            }
            Err(e) => {
                error!(error = %e, "Failed to record completion");
                self.mark_failed(run_id, &format!("Failed to record completion: {e}"));
                false
            }
        }
    }

    /// Best effort; a failure here is logged and dropped
    fn mark_failed(&self, run_id: &Uuid, reason: &str) {
        match self
            .runs
            .finalize(run_id, RunStatus::Failed, kinds::RUN_FAILED, reason)
        {
            Ok(true) => {}
            Ok(false) => info!("Run left RUNNING during execution; not marking FAILED"),
            Err(e) => error!(error = %e, "Failed to mark run as failed"),
        }
    }

    async fn dispatch(&self, run: &Run) -> Result<()> {
        if run.run_type.is_orchestrated() {
            self.execute_workflow(run).await
        } else {
            self.simulate(run).await
        }
    }

    /// Scripted think / plan / execute sequence
    async fn simulate(&self, run: &Run) -> Result<()> {
        let delay = self.settings.simulation_delay;

        tokio::time::sleep(delay).await;
        self.runs.record_progress(
            &run.id,
            1,
            kinds::AGENT_THINKING,
            &format!("Analyzing goal: {}", run.goal),
        )?;

        tokio::time::sleep(delay).await;
        let plan = format!(
            "Plan for '{}':\n1. Understand requirements\n2. Design solution\n3. Implement\n4. Test",
            run.goal
        );
        self.runs
            .record_progress(&run.id, 2, kinds::PLAN_GENERATED, &plan)?;

        tokio::time::sleep(delay).await;
        self.runs.record_progress(
            &run.id,
            3,
            kinds::EXECUTING,
            "Simulating work execution...",
        )?;

        tokio::time::sleep(delay / 2).await;
        self.runs.set_iteration(&run.id, 4)?;

        Ok(())
    }

    async fn execute_workflow(&self, run: &Run) -> Result<()> {
        let name = run
            .options
            .workflow_name
            .as_deref()
            .unwrap_or(DEFAULT_WORKFLOW);

        self.events.record(
            &run.id,
            kinds::WORKFLOW_LOOKUP,
            &format!("Looking up workflow: {name}"),
        )?;

        let Some(workflow) = self.workflows.get(name) else {
            let message = format!("Workflow not found: {name}");
            self.events
                .record(&run.id, kinds::WORKFLOW_NOT_FOUND, &message)?;
            anyhow::bail!(message);
        };

        let project = match run.project_id {
            Some(id) => self.projects.find(id)?,
            None => None,
        };
        let Some(project) = project else {
            let message = match run.project_id {
                Some(id) => format!("Project not found: {id}"),
                None => "Project not found: run has no project".to_string(),
            };
            self.events
                .record(&run.id, kinds::PROJECT_NOT_FOUND, &message)?;
            anyhow::bail!(message);
        };

        let provider = if run.options.dry_run {
            self.providers.offline_provider().to_string()
        } else {
            run.options
                .provider
                .clone()
                .unwrap_or_else(|| self.providers.default_provider().to_string())
        };
        let generator = self
            .providers
            .get(&provider)
            .with_context(|| format!("Provider '{provider}' is not registered"))?;

        let fallback_model = run
            .options
            .model
            .clone()
            .unwrap_or_else(|| generator.default_model().to_string());
        let resolved = apply_model_overrides(
            workflow,
            &ModelOverrides {
                explicit: &run.options.models,
                environment: &self.settings.role_models,
                fallback: Some(&fallback_model),
            },
        );

        self.events.record(
            &run.id,
            kinds::WORKFLOW_START,
            &format!("Starting workflow: {} v{}", resolved.name, resolved.version),
        )?;

        let defaults = self.settings.generation;
        let generation = GenerationSettings {
            timeout: run
                .options
                .timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            heartbeat_interval: run
                .options
                .heartbeat_interval_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.heartbeat_interval),
        };

        let orchestrator = Orchestrator::new(generator, &project.local_path, generation)
            .with_shell(self.shell.clone());

        let events = &self.events;
        let run_id = run.id;
        let sink = move |event_type: &str, message: &str, artifact: Option<&Path>| -> Result<()> {
            match artifact {
                Some(path) => {
                    let note = format!("Artifact: {}", path.display());
                    events.record_all(
                        &run_id,
                        &[(event_type, message), (kinds::ARTIFACT_CREATED, note.as_str())],
                    )?;
                }
                None => {
                    events.record(&run_id, event_type, message)?;
                }
            }
            Ok(())
        };

        let report = orchestrator.execute(&resolved, &sink).await?;

        let summary = report.summary();
        self.events
            .record(&run.id, kinds::WORKFLOW_SUMMARY, &summary.to_string())?;
        if report.steps.iter().any(|s| !s.success) {
            warn!("Workflow finished with failed commands");
        }

        Ok(())
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("Run execution panicked: {detail}")
}
