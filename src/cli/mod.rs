//! Command-line interface for runkeeper.
//!
//! Provides commands for serving the HTTP API, running background
//! workers, managing projects and runs, and following run events.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use uuid::Uuid;

use crate::app::App;
use crate::config::ResolvedConfig;
use crate::core::{CreateProject, CreateRun, RunFilter, TailItem, TailOptions};
use crate::domain::{Run, RunOptions, RunStatus, RunType};
use crate::http::{self, HttpState};

/// runkeeper - Run-tracking service with an append-only event log
#[derive(Parser, Debug)]
#[command(name = "runkeeper")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the HTTP API with a background worker loop
    Serve {
        /// Address to bind to (defaults to the configured bind address)
        #[arg(short, long)]
        bind: Option<String>,

        /// Do not start the background loop
        #[arg(long)]
        no_worker: bool,
    },

    /// Run the background worker loop until interrupted
    Worker,

    /// Process one batch of queued runs, then exit
    Process {
        /// Maximum runs to process (defaults to the configured batch size)
        #[arg(short, long)]
        batch: Option<usize>,
    },

    /// Manage projects
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },

    /// Create and inspect runs
    Run {
        #[command(subcommand)]
        command: RunCommands,
    },

    /// Print a run's events
    Events {
        /// Run ID (UUID)
        run_id: String,

        /// Only events after this id
        #[arg(long)]
        after_id: Option<i64>,
    },

    /// Follow a run's events as they are appended
    Tail {
        /// Run ID (UUID)
        run_id: String,

        /// Start after this event id
        #[arg(long, default_value = "0")]
        after_id: i64,

        /// Keep following after a terminal event
        #[arg(short, long)]
        follow: bool,
    },

    /// Send a free-text directive to a run
    Directive {
        /// Run ID (UUID)
        run_id: String,

        /// Directive text
        text: String,
    },

    /// Pause a running run
    Pause { run_id: String },

    /// Resume a paused run
    Resume { run_id: String },

    /// Stop a run
    Stop { run_id: String },

    /// List providers with health and models
    Providers,

    /// List available workflows
    Workflows,

    /// Show resolved configuration (debug)
    Config,
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommands {
    /// Register a project workspace
    Add {
        /// Unique project name
        name: String,

        /// Workspace directory for workflow runs
        path: PathBuf,
    },

    /// List projects
    List,
}

#[derive(Subcommand, Debug)]
pub enum RunCommands {
    /// Queue a new run
    Create {
        /// Goal text
        goal: String,

        /// Human-readable name
        #[arg(long)]
        name: Option<String>,

        /// How the run is executed
        #[arg(short = 't', long = "type", value_enum, default_value = "agent")]
        run_type: RunKind,

        /// Project ID (required for workflow runs)
        #[arg(short, long)]
        project: Option<i64>,

        /// Provider name
        #[arg(long)]
        provider: Option<String>,

        /// Model name
        #[arg(short, long)]
        model: Option<String>,

        /// Workflow name for workflow runs
        #[arg(short, long)]
        workflow: Option<String>,

        /// Per-role model override, `role=model` (repeatable)
        #[arg(long = "role-model", value_name = "ROLE=MODEL")]
        role_models: Vec<String>,

        /// Text generation timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Use the offline provider
        #[arg(long)]
        dry_run: bool,
    },

    /// List runs, newest first
    List {
        /// Filter by status
        #[arg(short, long)]
        status: Option<String>,

        /// Filter by project ID
        #[arg(short, long)]
        project: Option<i64>,

        /// Maximum number of runs to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Show a run
    Show {
        /// Run ID (UUID)
        run_id: String,
    },
}

/// Run type for CLI (maps to RunType)
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum RunKind {
    Agent,
    Task,
    Workflow,
    Pipeline,
}

impl From<RunKind> for RunType {
    fn from(kind: RunKind) -> Self {
        match kind {
            RunKind::Agent => RunType::Agent,
            RunKind::Task => RunType::Task,
            RunKind::Workflow => RunType::Workflow,
            RunKind::Pipeline => RunType::Pipeline,
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let config = ResolvedConfig::load()?;

        // Config needs no database
        let command = match self.command {
            Commands::Config => {
                show_config(&config);
                return Ok(());
            }
            command => command,
        };

        let app = App::from_config(config)?;

        match command {
            Commands::Serve { bind, no_worker } => serve(&app, bind, no_worker).await,
            Commands::Worker => run_worker(&app).await,
            Commands::Process { batch } => {
                let batch = batch.unwrap_or(app.config.batch_size);
                let completed = app.scheduler.process_queued_runs(batch).await;
                println!("Completed {completed} run(s)");
                Ok(())
            }
            Commands::Project { command } => execute_project(&app, command),
            Commands::Run { command } => execute_run(&app, command).await,
            Commands::Events { run_id, after_id } => {
                let run_id = parse_run_id(&run_id)?;
                for event in app.service.list_events(&run_id, after_id)? {
                    print_event(&event);
                }
                Ok(())
            }
            Commands::Tail {
                run_id,
                after_id,
                follow,
            } => tail(&app, &run_id, after_id, follow).await,
            Commands::Directive { run_id, text } => {
                let event = app.service.directive(&parse_run_id(&run_id)?, &text)?;
                println!("Directive recorded as event {}", event.id);
                Ok(())
            }
            Commands::Pause { run_id } => {
                print_run(&app.service.pause(&parse_run_id(&run_id)?)?);
                Ok(())
            }
            Commands::Resume { run_id } => {
                print_run(&app.service.resume(&parse_run_id(&run_id)?)?);
                Ok(())
            }
            Commands::Stop { run_id } => {
                print_run(&app.service.stop(&parse_run_id(&run_id)?)?);
                Ok(())
            }
            Commands::Providers => {
                for provider in app.service.providers().await {
                    let health = if provider.healthy { "healthy" } else { "unavailable" };
                    println!(
                        "{:<10} {:<12} default: {}",
                        provider.name, health, provider.default_model
                    );
                    for model in provider.models {
                        println!("    {model}");
                    }
                }
                Ok(())
            }
            Commands::Workflows => {
                for workflow in app.service.workflows() {
                    println!("{} v{}", workflow.name, workflow.version);
                    if !workflow.description.is_empty() {
                        println!("    {}", workflow.description);
                    }
                    println!("    steps: {}", workflow.steps.join(" -> "));
                }
                Ok(())
            }
            Commands::Config => {
                show_config(&app.config);
                Ok(())
            }
        }
    }
}

async fn serve(app: &App, bind: Option<String>, no_worker: bool) -> Result<()> {
    let addr = bind.unwrap_or_else(|| app.config.bind.clone());

    let mut background = app.background_loop();
    if !no_worker {
        background.start();
    }

    let state = Arc::new(HttpState {
        service: app.service.clone(),
        scheduler: Arc::clone(&app.scheduler),
        tail: TailOptions::default(),
        worker_running: background.is_running(),
        batch_size: app.config.batch_size,
        poll_interval: app.config.poll_interval,
        cors_origins: app.config.cors_origins.clone(),
    });

    let result = http::serve(&addr, state, shutdown_signal()).await;
    background.stop().await;
    result
}

async fn run_worker(app: &App) -> Result<()> {
    let mut background = app.background_loop();
    background.start();
    eprintln!("Worker running; press Ctrl-C to stop");

    shutdown_signal().await;
    background.stop().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
    }
}

fn execute_project(app: &App, command: ProjectCommands) -> Result<()> {
    match command {
        ProjectCommands::Add { name, path } => {
            let local_path = std::fs::canonicalize(&path)
                .with_context(|| format!("Project path not found: {}", path.display()))?;
            let project = app.service.create_project(CreateProject { name, local_path })?;
            println!("Project {} created: {}", project.id, project.name);
        }
        ProjectCommands::List => {
            let projects = app.service.list_projects()?;
            if projects.is_empty() {
                println!("No projects found");
                return Ok(());
            }

            println!("{:<6} {:<24} {}", "ID", "NAME", "PATH");
            println!("{}", "-".repeat(75));
            for project in projects {
                println!(
                    "{:<6} {:<24} {}",
                    project.id,
                    project.name,
                    project.local_path.display()
                );
            }
        }
    }
    Ok(())
}

async fn execute_run(app: &App, command: RunCommands) -> Result<()> {
    match command {
        RunCommands::Create {
            goal,
            name,
            run_type,
            project,
            provider,
            model,
            workflow,
            role_models,
            timeout,
            dry_run,
        } => {
            let options = RunOptions {
                provider,
                model,
                dry_run,
                workflow_name: workflow,
                models: parse_role_models(&role_models)?,
                timeout_seconds: timeout,
                ..Default::default()
            };

            let run = app
                .service
                .create_run(CreateRun {
                    goal,
                    name,
                    run_type: run_type.into(),
                    project_id: project,
                    options,
                    ..Default::default()
                })
                .await?;
            println!("{}", run.id);
        }
        RunCommands::List {
            status,
            project,
            limit,
        } => {
            let status = status
                .as_deref()
                .map(str::parse::<RunStatus>)
                .transpose()
                .map_err(anyhow::Error::msg)?;
            let runs = app.service.list_runs(&RunFilter {
                status,
                project_id: project,
                limit: Some(limit),
            })?;

            if runs.is_empty() {
                println!("No runs found");
                return Ok(());
            }

            println!("{:<38} {:<10} {:<10} {}", "RUN ID", "TYPE", "STATUS", "GOAL");
            println!("{}", "-".repeat(90));
            for run in runs {
                println!(
                    "{:<38} {:<10} {:<10} {}",
                    run.id,
                    run.run_type,
                    run.status,
                    truncate(&run.goal, 40)
                );
            }
        }
        RunCommands::Show { run_id } => {
            print_run(&app.service.get_run(&parse_run_id(&run_id)?)?);
        }
    }
    Ok(())
}

/// Follow events until a terminal event arrives (or forever with `follow`)
async fn tail(app: &App, run_id: &str, after_id: i64, follow: bool) -> Result<()> {
    let run_id = parse_run_id(run_id)?;
    let mut stream = Box::pin(app.service.tail(&run_id, after_id, TailOptions::default())?);

    while let Some(item) = stream.next().await {
        match item? {
            TailItem::Event(event) => {
                print_event(&event);
                if event.is_terminal() && !follow {
                    break;
                }
            }
            TailItem::KeepAlive => {}
        }
    }
    Ok(())
}

fn parse_run_id(run_id: &str) -> Result<Uuid> {
    Uuid::parse_str(run_id).with_context(|| format!("Invalid run ID: {}", run_id))
}

fn parse_role_models(pairs: &[String]) -> Result<HashMap<String, String>> {
    pairs
        .iter()
        .map(|pair| {
            let (role, model) = pair
                .split_once('=')
                .with_context(|| format!("Expected ROLE=MODEL, got '{pair}'"))?;
            Ok((role.trim().to_string(), model.trim().to_string()))
        })
        .collect()
}

fn print_run(run: &Run) {
    println!("Run ID:    {}", run.id);
    if let Some(name) = &run.name {
        println!("Name:      {}", name);
    }
    println!("Goal:      {}", run.goal);
    println!("Type:      {}", run.run_type);
    println!("Status:    {}", run.status);
    println!("Iteration: {}", run.current_iteration);
    if let Some(project_id) = run.project_id {
        println!("Project:   {}", project_id);
    }
    if let Some(provider) = &run.options.provider {
        println!(
            "Provider:  {} ({})",
            provider,
            run.options.model.as_deref().unwrap_or("default model")
        );
    }
    println!("Created:   {}", run.created_at);
}

fn print_event(event: &crate::domain::Event) {
    println!(
        "[{:>5}] {} {:<20} {}",
        event.id,
        event.created_at.format("%H:%M:%S"),
        event.event_type,
        event.payload
    );
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}

/// Show the resolved configuration (for debugging)
fn show_config(cfg: &ResolvedConfig) {
    println!("Runkeeper Configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:      {}", cfg.home.display());
    println!("  Database:  {}", cfg.database.display());
    println!("  Workflows: {}", cfg.workflows_dir.display());
    println!();
    println!("Scheduler:");
    println!("  Batch size:       {}", cfg.batch_size);
    println!("  Poll interval:    {}s", cfg.poll_interval.as_secs());
    println!("  Workers:          {}", cfg.workers);
    println!("  Simulation delay: {}ms", cfg.simulation_delay.as_millis());
    println!();
    println!("Generation:");
    println!("  Default provider: {}", cfg.default_provider);
    println!("  Ollama URL:       {}", cfg.ollama_base_url);
    println!("  Ollama model:     {}", cfg.ollama_default_model);
    println!("  Timeout:          {}s", cfg.generation_timeout.as_secs());
    println!("  Heartbeat:        {}s", cfg.heartbeat_interval.as_secs());
    if cfg.role_models.is_empty() {
        println!("  Role models:      (none)");
    } else {
        let mut roles: Vec<_> = cfg.role_models.iter().collect();
        roles.sort();
        for (role, model) in roles {
            println!("  Role model:       {} = {}", role, model);
        }
    }
    println!();
    println!("HTTP bind: {}", cfg.bind);
    if cfg.cors_origins.is_empty() {
        println!("CORS origins: (any)");
    } else {
        println!("CORS origins: {}", cfg.cors_origins.join(", "));
    }
}
