//! Artifacts produced by workflow steps.
//!
//! Artifacts are files written into the project workspace and linked to
//! the run's result set.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A file produced by a workflow step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Name of the step that produced this artifact
    pub step_name: String,

    /// Type of artifact
    pub artifact_type: ArtifactType,

    /// Location on disk
    pub path: PathBuf,
}

impl Artifact {
    pub fn new(step_name: impl Into<String>, artifact_type: ArtifactType, path: PathBuf) -> Self {
        Self {
            step_name: step_name.into(),
            artifact_type,
            path,
        }
    }
}

/// Types of artifacts that can be produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    /// Text produced by a generation step
    #[default]
    GeneratedFile,

    /// Literal content written by a write-file step
    WrittenFile,

    /// Transcript of a shell command (command, exit code, stdout, stderr)
    CommandOutput,
}
