//! Wiring from resolved configuration to live components.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::adapters::ProviderRegistry;
use crate::config::ResolvedConfig;
use crate::core::{
    BackgroundLoop, Database, RunScheduler, RunService, SchedulerSettings, WorkflowRegistry,
};

/// Everything a front end needs, built once per process
#[derive(Clone)]
pub struct App {
    pub config: ResolvedConfig,
    pub db: Database,
    pub providers: ProviderRegistry,
    pub workflows: Arc<WorkflowRegistry>,
    pub service: RunService,
    pub scheduler: Arc<RunScheduler>,
}

impl App {
    pub fn from_config(config: ResolvedConfig) -> Result<Self> {
        let db = Database::open(config.database.clone()).with_context(|| {
            format!("Failed to open database: {}", config.database.display())
        })?;
        let providers = ProviderRegistry::from_config(&config);
        let workflows = Arc::new(WorkflowRegistry::load_dir(&config.workflows_dir)?);

        info!(
            database = %config.database.display(),
            default_provider = %config.default_provider,
            workflows = workflows.names().len(),
            "Runkeeper initialized"
        );

        Ok(Self::assemble(config, db, providers, workflows))
    }

    /// Build from explicit parts; used when callers supply their own providers
    pub fn assemble(
        config: ResolvedConfig,
        db: Database,
        providers: ProviderRegistry,
        workflows: Arc<WorkflowRegistry>,
    ) -> Self {
        let service = RunService::new(db.clone(), providers.clone(), Arc::clone(&workflows));
        let scheduler = Arc::new(RunScheduler::new(
            db.clone(),
            providers.clone(),
            Arc::clone(&workflows),
            SchedulerSettings::from_config(&config),
        ));

        Self {
            config,
            db,
            providers,
            workflows,
            service,
            scheduler,
        }
    }

    /// Background loop sized from configuration (not yet started)
    pub fn background_loop(&self) -> BackgroundLoop {
        BackgroundLoop::new(
            Arc::clone(&self.scheduler),
            self.config.batch_size,
            self.config.poll_interval,
            self.config.workers,
        )
    }
}
