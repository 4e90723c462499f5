//! Workflow definitions, the workflow registry and model override
//! resolution.
//!
//! Workflows are defined in YAML (or built in) and consist of ordered
//! steps, each of which generates text, writes a file or runs a command.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Workflow used when a run does not name one
pub const DEFAULT_WORKFLOW: &str = "quarkus-bootstrap-v1";

/// A complete workflow definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    /// Registry key
    pub name: String,

    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub description: String,

    /// Ordered list of steps to execute
    pub steps: Vec<WorkflowStep>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl Workflow {
    /// Load a workflow from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read workflow file: {}", path.display()))?;

        Self::from_yaml(&content)
            .with_context(|| format!("Invalid workflow file: {}", path.display()))
    }

    /// Parse and validate a workflow from YAML content
    pub fn from_yaml(content: &str) -> Result<Self> {
        let workflow: Self =
            serde_yaml::from_str(content).context("Failed to parse workflow YAML")?;
        workflow.validate()?;
        Ok(workflow)
    }

    /// Validate the workflow definition
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("Workflow name cannot be empty");
        }

        if self.steps.is_empty() {
            anyhow::bail!("Workflow '{}' must have at least one step", self.name);
        }

        for (i, step) in self.steps.iter().enumerate() {
            if step.name.trim().is_empty() {
                anyhow::bail!("Step {} has an empty name", i + 1);
            }
            if self.steps[..i].iter().any(|s| s.name == step.name) {
                anyhow::bail!("Duplicate step name '{}'", step.name);
            }
            step.validate()?;
        }

        Ok(())
    }

    pub fn step(&self, name: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.name == name)
    }
}

/// A single step in a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Step name; also the role used for model overrides
    pub name: String,

    #[serde(rename = "type")]
    pub kind: StepKind,

    #[serde(default)]
    pub description: String,

    /// Default model (generate_text)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Prompt (generate_text)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,

    /// Workspace-relative output path (generate_text, write_file)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,

    /// Literal content (write_file)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Command line (shell_command, build_command)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Record the step's output in the run's artifact list
    #[serde(default)]
    pub save_artifact: bool,

    /// Generation timeout for this step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,

    /// Heartbeat cadence for this step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heartbeat_interval_seconds: Option<u64>,
}

impl WorkflowStep {
    /// Logical role for model overrides
    pub fn role(&self) -> String {
        self.name.to_lowercase()
    }

    fn validate(&self) -> Result<()> {
        let missing = |field: &str| {
            anyhow::anyhow!(
                "Step '{}' ({}) requires '{}'",
                self.name,
                self.kind.as_str(),
                field
            )
        };

        match self.kind {
            StepKind::GenerateText => {
                self.prompt.as_ref().ok_or_else(|| missing("prompt"))?;
            }
            StepKind::WriteFile => {
                self.output_file.as_ref().ok_or_else(|| missing("output_file"))?;
                self.content.as_ref().ok_or_else(|| missing("content"))?;
            }
            StepKind::ShellCommand | StepKind::BuildCommand => {
                self.command.as_ref().ok_or_else(|| missing("command"))?;
            }
        }
        Ok(())
    }
}

/// Supported step kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    #[serde(alias = "llm_generate")]
    GenerateText,

    #[serde(alias = "file_write")]
    WriteFile,

    ShellCommand,

    /// Shell command with the build tool prefixed
    #[serde(alias = "maven_command")]
    BuildCommand,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GenerateText => "generate_text",
            Self::WriteFile => "write_file",
            Self::ShellCommand => "shell_command",
            Self::BuildCommand => "build_command",
        }
    }
}

/// Named workflows available to runs
#[derive(Debug, Clone, Default)]
pub struct WorkflowRegistry {
    workflows: BTreeMap<String, Workflow>,
}

impl WorkflowRegistry {
    /// Registry with only the built-in workflows
    pub fn builtin() -> Self {
        let mut registry = Self::default();
        registry.insert(quarkus_bootstrap_v1());
        registry
    }

    /// Built-in workflows plus every `*.yaml` / `*.yml` file in `dir`.
    ///
    /// A missing directory is not an error. Files that fail to parse are
    /// logged and skipped; a file may replace a built-in of the same name.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut registry = Self::builtin();
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "No workflow directory");
            return Ok(registry);
        }

        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read workflow directory: {}", dir.display()))?;

        let mut paths: Vec<_> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                matches!(
                    path.extension().and_then(|ext| ext.to_str()),
                    Some("yaml") | Some("yml")
                )
            })
            .collect();
        paths.sort();

        for path in paths {
            match Workflow::from_file(&path) {
                Ok(workflow) => {
                    info!(workflow = %workflow.name, path = %path.display(), "Loaded workflow");
                    registry.insert(workflow);
                }
                Err(e) => warn!(path = %path.display(), error = %format!("{e:#}"), "Skipping invalid workflow"),
            }
        }

        Ok(registry)
    }

    pub fn insert(&mut self, workflow: Workflow) {
        self.workflows.insert(workflow.name.clone(), workflow);
    }

    pub fn get(&self, name: &str) -> Option<&Workflow> {
        self.workflows.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.workflows.keys().map(String::as_str).collect()
    }

    pub fn list(&self) -> impl Iterator<Item = &Workflow> {
        self.workflows.values()
    }
}

/// Sources for per-step model selection, highest priority first
#[derive(Debug, Clone, Copy)]
pub struct ModelOverrides<'a> {
    /// Per-run overrides (role -> model)
    pub explicit: &'a HashMap<String, String>,

    /// Environment-level role defaults
    pub environment: &'a HashMap<String, String>,

    /// Model for generate steps that declare none (the run's resolved model)
    pub fallback: Option<&'a str>,
}

/// Resolve the model of every generate-text step.
///
/// Priority: explicit run override, then environment role default, then
/// the step's own model, then `fallback`. Timeouts and heartbeat settings
/// pass through untouched. Descriptions of overridden steps are rewritten
/// to mention the new model.
pub fn apply_model_overrides(workflow: &Workflow, overrides: &ModelOverrides<'_>) -> Workflow {
    let explicit = lowercase_keys(overrides.explicit);
    let environment = lowercase_keys(overrides.environment);

    let steps = workflow
        .steps
        .iter()
        .map(|step| {
            if step.kind != StepKind::GenerateText {
                return step.clone();
            }

            let role = step.role();
            let chosen = explicit
                .get(role.as_str())
                .or_else(|| environment.get(role.as_str()))
                .map(|model| model.to_string());

            let mut resolved = step.clone();
            match (chosen, &step.model) {
                (Some(model), Some(original)) if &model != original => {
                    info!(step = %step.name, from = %original, to = %model, "Overriding step model");
                    resolved.description = describe_model(&step.description, &model);
                    resolved.model = Some(model);
                }
                (Some(model), None) => resolved.model = Some(model),
                (None, None) => resolved.model = overrides.fallback.map(str::to_string),
                (_, Some(_)) => {}
            }
            resolved
        })
        .collect();

    Workflow {
        name: workflow.name.clone(),
        version: workflow.version.clone(),
        description: workflow.description.clone(),
        steps,
    }
}

fn lowercase_keys(map: &HashMap<String, String>) -> HashMap<String, &str> {
    map.iter()
        .filter(|(_, model)| !model.trim().is_empty())
        .map(|(role, model)| (role.to_lowercase(), model.as_str()))
        .collect()
}

/// Point a step description at `model`.
///
/// Rewrites phrases like "using Gemma3" to the new model family; when no
/// such phrase exists, appends the model instead.
pub fn describe_model(description: &str, model: &str) -> String {
    static USING_MODEL: LazyLock<Option<Regex>> =
        LazyLock::new(|| Regex::new(r"(?i)using \w+").ok());

    let family = model.split(':').next().unwrap_or(model);
    let rewritten = match USING_MODEL.as_ref() {
        Some(re) => re
            .replace_all(description, format!("using {family}").as_str())
            .into_owned(),
        None => description.to_string(),
    };

    if rewritten == description {
        format!("{description} (model: {model})")
    } else {
        rewritten
    }
}

const PLANNER_PROMPT: &str = "You are a software architect planning a Quarkus project with GraphQL and OpenTelemetry.

Create a detailed project plan that includes:
1. Project structure overview
2. Key dependencies needed (Quarkus, GraphQL, OpenTelemetry, etc.)
3. Main components to implement (GraphQL resources, telemetry configuration)
4. Testing strategy
5. Build and deployment notes

Write the plan in Markdown format with clear sections.";

const CODER_PROMPT: &str = "You are an expert Java developer. Create a complete Maven Quarkus project with:
- Quarkus framework
- GraphQL API support (using quarkus-smallrye-graphql)
- OpenTelemetry integration (using quarkus-opentelemetry)
- A simple GraphQL query endpoint that returns a greeting
- Basic application properties configuration
- Unit tests

Generate a pom.xml file with all necessary dependencies.
Also generate:
1. src/main/java/com/example/GreetingResource.java (GraphQL resource)
2. src/main/resources/application.properties (with telemetry config)
3. src/test/java/com/example/GreetingResourceTest.java (basic test)

Output each file with clear markers like: