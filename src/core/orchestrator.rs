//! Workflow orchestrator.
//!
//! Executes the steps of a workflow strictly in order inside a workspace
//! directory, reporting progress through a `ProgressSink`. The first
//! failing step stops the workflow; the failure is reported as
//! `WORKFLOW_FAILED` and returned to the caller.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::adapters::{
    build_tool_command, GenerateRequest, GenerationEvent, ShellRunner, TextGenerator,
};
use crate::domain::{kinds, Artifact, ArtifactType};

use super::workflow::{StepKind, Workflow, WorkflowStep};

/// Receiver of orchestrator progress: `(event_type, message, artifact)`
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event_type: &str, message: &str, artifact: Option<&Path>) -> Result<()>;
}

impl<F> ProgressSink for F
where
    F: Fn(&str, &str, Option<&Path>) -> Result<()> + Send + Sync,
{
    fn emit(&self, event_type: &str, message: &str, artifact: Option<&Path>) -> Result<()> {
        self(event_type, message, artifact)
    }
}

/// Defaults for generate-text steps that set no values of their own
#[derive(Debug, Clone, Copy)]
pub struct GenerationSettings {
    pub timeout: Duration,
    pub heartbeat_interval: Duration,
}

/// Outcome of one executed step
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub step_number: usize,
    pub name: String,
    pub kind: StepKind,

    /// Generated text, written content or command stdout
    pub output: String,

    /// False for a command that exited non-zero
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Artifact>,
}

/// Result of a completed workflow
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowReport {
    pub workflow_name: String,
    pub workflow_version: String,
    pub steps: Vec<StepResult>,

    /// Artifacts of steps marked `save_artifact`
    pub artifacts: Vec<Artifact>,
}

impl WorkflowReport {
    /// Compact summary recorded once the workflow finishes
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "workflow": self.workflow_name,
            "version": self.workflow_version,
            "steps": self.steps.len(),
            "failed_commands": self.steps.iter().filter(|s| !s.success).count(),
            "artifacts": self.artifacts,
            "message": format!(
                "Workflow completed: {} steps, {} artifacts",
                self.steps.len(),
                self.artifacts.len()
            ),
        })
    }
}

/// Executes workflows against one workspace
pub struct Orchestrator {
    generator: Arc<dyn TextGenerator>,
    shell: ShellRunner,
    workspace: PathBuf,
    generation: GenerationSettings,
}

impl Orchestrator {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        workspace: impl Into<PathBuf>,
        generation: GenerationSettings,
    ) -> Self {
        Self {
            generator,
            shell: ShellRunner::default(),
            workspace: workspace.into(),
            generation,
        }
    }

    pub fn with_shell(mut self, shell: ShellRunner) -> Self {
        self.shell = shell;
        self
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Execute every step of `workflow` in order
    #[instrument(skip_all, fields(workflow = %workflow.name, workspace = %self.workspace.display()))]
    pub async fn execute(&self, workflow: &Workflow, sink: &dyn ProgressSink) -> Result<WorkflowReport> {
        info!(steps = workflow.steps.len(), "Executing workflow");

        match self.execute_steps(workflow, sink).await {
            Ok(report) => Ok(report),
            Err(e) => {
                let message = format!("Workflow execution failed: {e:#}");
                error!(error = %message, "Workflow failed");
                if let Err(emit_err) = sink.emit(kinds::WORKFLOW_FAILED, &message, None) {
                    warn!(error = %emit_err, "Could not record workflow failure");
                }
                Err(e)
            }
        }
    }

    async fn execute_steps(&self, workflow: &Workflow, sink: &dyn ProgressSink) -> Result<WorkflowReport> {
        tokio::fs::create_dir_all(&self.workspace)
            .await
            .with_context(|| format!("Failed to create workspace: {}", self.workspace.display()))?;

        sink.emit(
            kinds::WORKFLOW_STARTED,
            &format!("Starting {} v{}", workflow.name, workflow.version),
            None,
        )?;

        let mut report = WorkflowReport {
            workflow_name: workflow.name.clone(),
            workflow_version: workflow.version.clone(),
            steps: Vec::with_capacity(workflow.steps.len()),
            artifacts: Vec::new(),
        };

        let total = workflow.steps.len();
        for (index, step) in workflow.steps.iter().enumerate() {
            let number = index + 1;
            info!(step = %step.name, "Executing step {}/{}", number, total);
            sink.emit(
                kinds::STEP_STARTED,
                &format!("Step {}: {} - {}", number, step.name, step.description),
                None,
            )?;

            let result = self
                .execute_step(number, step, sink)
                .await
                .with_context(|| format!("Step '{}' failed", step.name))?;

            let artifact_path = result.artifact.as_ref().map(|a| a.path.clone());
            if step.save_artifact {
                if let Some(artifact) = &result.artifact {
                    report.artifacts.push(artifact.clone());
                }
            }
            report.steps.push(result);

            sink.emit(
                kinds::STEP_COMPLETED,
                &format!("Step {} completed: {}", number, step.name),
                artifact_path.as_deref(),
            )?;
        }

        sink.emit(
            kinds::WORKFLOW_COMPLETED,
            &format!(
                "Workflow completed successfully with {} artifacts",
                report.artifacts.len()
            ),
            None,
        )?;

        Ok(report)
    }

    async fn execute_step(
        &self,
        number: usize,
        step: &WorkflowStep,
        sink: &dyn ProgressSink,
    ) -> Result<StepResult> {
        match step.kind {
            StepKind::GenerateText => self.generate_text(number, step, sink).await,
            StepKind::WriteFile => self.write_file(number, step).await,
            StepKind::ShellCommand => {
                let command = required(&step.command, step, "command")?;
                self.run_command(number, step, command.to_string(), sink).await
            }
            StepKind::BuildCommand => {
                let command = required(&step.command, step, "command")?;
                self.run_command(number, step, build_tool_command(command), sink)
                    .await
            }
        }
    }

    async fn generate_text(
        &self,
        number: usize,
        step: &WorkflowStep,
        sink: &dyn ProgressSink,
    ) -> Result<StepResult> {
        let prompt = required(&step.prompt, step, "prompt")?;
        let model = required(&step.model, step, "model")?;

        let request = GenerateRequest {
            prompt: prompt.to_string(),
            model: model.to_string(),
            timeout: step
                .timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(self.generation.timeout),
            heartbeat_interval: step
                .heartbeat_interval_seconds
                .map(Duration::from_secs)
                .unwrap_or(self.generation.heartbeat_interval),
        };

        let progress = |event: GenerationEvent| {
            let event_type = format!("{}{}", kinds::LLM_PREFIX, event.kind());
            if let Err(e) = sink.emit(&event_type, &event.message(), None) {
                warn!(error = %e, event_type = %event_type, "Could not record generation progress");
            }
        };

        let text = self.generator.generate(&request, &progress).await?;

        let artifact = match &step.output_file {
            Some(output_file) => {
                let path = self.write_workspace_file(output_file, &text).await?;
                debug!(path = %path.display(), "Wrote generated content");
                Some(Artifact::new(&step.name, ArtifactType::GeneratedFile, path))
            }
            None => None,
        };

        Ok(StepResult {
            step_number: number,
            name: step.name.clone(),
            kind: step.kind,
            output: text,
            success: true,
            artifact,
        })
    }

    async fn write_file(&self, number: usize, step: &WorkflowStep) -> Result<StepResult> {
        let output_file = required(&step.output_file, step, "output_file")?;
        let content = required(&step.content, step, "content")?;

        let path = self.write_workspace_file(output_file, content).await?;

        Ok(StepResult {
            step_number: number,
            name: step.name.clone(),
            kind: step.kind,
            output: content.to_string(),
            success: true,
            artifact: Some(Artifact::new(&step.name, ArtifactType::WrittenFile, path)),
        })
    }

    async fn run_command(
        &self,
        number: usize,
        step: &WorkflowStep,
        command: String,
        sink: &dyn ProgressSink,
    ) -> Result<StepResult> {
        sink.emit(kinds::SHELL_EXECUTING, &format!("Running: {command}"), None)?;

        let output = self.shell.run(&command, &self.workspace).await?;
        if output.success() {
            info!(command = %command, "Command succeeded");
        } else {
            warn!(command = %command, exit_code = output.exit_code, "Command exited non-zero");
        }

        let artifact = if step.save_artifact {
            let file_name = format!("{}_output.txt", step.name.replace(' ', "_"));
            let path = self.write_workspace_file(&file_name, &output.transcript()).await?;
            Some(Artifact::new(&step.name, ArtifactType::CommandOutput, path))
        } else {
            None
        };

        Ok(StepResult {
            step_number: number,
            name: step.name.clone(),
            kind: step.kind,
            success: output.success(),
            output: output.stdout,
            artifact,
        })
    }

    /// Write `content` to a workspace-relative path, creating parents
    async fn write_workspace_file(&self, relative: &str, content: &str) -> Result<PathBuf> {
        let relative = Path::new(relative);
        let escapes = relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)));
        if escapes {
            anyhow::bail!(
                "Output path '{}' must stay inside the workspace",
                relative.display()
            );
        }

        let path = self.workspace.join(relative);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        tokio::fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write file: {}", path.display()))?;

        Ok(path)
    }
}

fn required<'a>(value: &'a Option<String>, step: &WorkflowStep, field: &str) -> Result<&'a str> {
    value.as_deref().with_context(|| {
        format!(
            "Step '{}' ({}) has no {}",
            step.name,
            step.kind.as_str(),
            field
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::CannedGenerator;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn settings() -> GenerationSettings {
        GenerationSettings {
            timeout: Duration::from_secs(5),
            heartbeat_interval: Duration::ZERO,
        }
    }

    fn write_step(name: &str, output_file: &str) -> WorkflowStep {
        WorkflowStep {
            name: name.to_string(),
            kind: StepKind::WriteFile,
            description: String::new(),
            model: None,
            prompt: None,
            output_file: Some(output_file.to_string()),
            content: Some("hello".to_string()),
            command: None,
            save_artifact: false,
            timeout_seconds: None,
            heartbeat_interval_seconds: None,
        }
    }

    #[tokio::test]
    async fn test_write_file_always_reports_artifact() {
        let temp = TempDir::new().unwrap();
        let orchestrator =
            Orchestrator::new(Arc::new(CannedGenerator::new()), temp.path(), settings());
        let workflow = Workflow {
            name: "write".to_string(),
            version: "1.0.0".to_string(),
            description: String::new(),
            steps: vec![write_step("stamp", "nested/VERSION")],
        };

        let seen = Mutex::new(Vec::new());
        let sink = |event_type: &str, _message: &str, artifact: Option<&Path>| -> Result<()> {
            seen.lock()
                .unwrap()
                .push((event_type.to_string(), artifact.map(Path::to_path_buf)));
            Ok(())
        };

        let report = orchestrator.execute(&workflow, &sink).await.unwrap();

        let written = temp.path().join("nested").join("VERSION");
        assert_eq!(std::fs::read_to_string(&written).unwrap(), "hello");
        // Not saved, but still announced on STEP_COMPLETED
        assert!(report.artifacts.is_empty());
        let seen = seen.lock().unwrap();
        assert!(seen.contains(&(kinds::STEP_COMPLETED.to_string(), Some(written))));
    }

    #[tokio::test]
    async fn test_output_path_cannot_escape_workspace() {
        let temp = TempDir::new().unwrap();
        let orchestrator = Orchestrator::new(
            Arc::new(CannedGenerator::new()),
            temp.path().join("ws"),
            settings(),
        );
        let workflow = Workflow {
            name: "escape".to_string(),
            version: "1.0.0".to_string(),
            description: String::new(),
            steps: vec![write_step("stamp", "../outside.txt")],
        };

        let sink = |_: &str, _: &str, _: Option<&Path>| -> Result<()> { Ok(()) };
        let err = orchestrator.execute(&workflow, &sink).await.unwrap_err();
        assert!(format!("{err:#}").contains("inside the workspace"));
        assert!(!temp.path().join("outside.txt").exists());
    }
}
