//! Domain types for the runkeeper service.
//!
//! This module contains the core data structures:
//! - Run: persisted run record and its lifecycle enums
//! - Event: immutable, ordered progress records
//! - Project: workspace owner for workflow runs
//! - Artifact: step outputs

pub mod artifact;
pub mod events;
pub mod project;
pub mod run;

// Re-export commonly used types
pub use artifact::{Artifact, ArtifactType};
pub use events::{kinds, Event};
pub use project::Project;
pub use run::{Run, RunOptions, RunStatus, RunType};
