//! Adapter interfaces for step executors.
//!
//! A `TextGenerator` is the capability behind generate-text steps; the
//! `ShellRunner` backs shell and build-tool steps. Providers are selected
//! by name through the `ProviderRegistry`.

pub mod canned;
pub mod heartbeat;
pub mod ollama;
pub mod registry;
pub mod shell;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use canned::CannedGenerator;
pub use heartbeat::run_with_progress;
pub use ollama::OllamaGenerator;
pub use registry::{ProviderInfo, ProviderRegistry, ResolvedProvider};
pub use shell::{build_tool_command, ShellError, ShellOutput, ShellRunner, SHELL_TIMEOUT};

/// Errors raised by text-generation providers
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Unknown provider: {0}")]
    Unknown(String),

    #[error("Provider '{0}' is not healthy")]
    Unhealthy(String),

    #[error("Timed out after {}s waiting for a response", .0.as_secs())]
    Timeout(Duration),

    #[error("Provider connection failed: {0}")]
    Connectivity(String),

    #[error("Provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed provider response: {0}")]
    Malformed(String),
}

/// One text-generation call
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub prompt: String,
    pub model: String,

    /// Hard limit for the whole call
    pub timeout: Duration,

    /// Heartbeat cadence while waiting; zero disables heartbeats
    pub heartbeat_interval: Duration,
}

/// Progress notifications emitted during `TextGenerator::generate`
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationEvent {
    Loading { model: String },
    Generating { model: String },
    Heartbeat { elapsed: Duration },
    Done { chars: usize, elapsed: Duration },
    Error { reason: String, elapsed: Duration },
}

impl GenerationEvent {
    /// Event tag, without the `LLM_` prefix
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Loading { .. } => "LOADING_MODEL",
            Self::Generating { .. } => "GENERATING",
            Self::Heartbeat { .. } => "HEARTBEAT",
            Self::Done { .. } => "DONE",
            Self::Error { .. } => "ERROR",
        }
    }

    /// Human-readable description
    pub fn message(&self) -> String {
        match self {
            Self::Loading { model } => format!("Loading model: {model}"),
            Self::Generating { model } => format!("Generating response with {model}..."),
            Self::Heartbeat { elapsed } => {
                format!("Still generating ({:.1}s elapsed)", elapsed.as_secs_f64())
            }
            Self::Done { chars, elapsed } => format!(
                "Generation complete ({chars} chars in {:.1}s)",
                elapsed.as_secs_f64()
            ),
            Self::Error { reason, elapsed } => {
                format!("{reason} (after {:.1}s)", elapsed.as_secs_f64())
            }
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}

/// Callback receiving generation progress
pub type GenerationProgress<'a> = dyn Fn(GenerationEvent) + Send + Sync + 'a;

/// Text-generation capability used by generate-text steps
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Registry key
    fn name(&self) -> &str;

    /// Model used when a run names none
    fn default_model(&self) -> &str;

    /// Cheap liveness check without side effects
    async fn health(&self) -> bool;

    /// Generate text for `request`.
    ///
    /// Emits LOADING_MODEL, GENERATING, zero or more HEARTBEATs and exactly
    /// one DONE or ERROR through `progress` before returning.
    async fn generate(
        &self,
        request: &GenerateRequest,
        progress: &GenerationProgress<'_>,
    ) -> Result<String, ProviderError>;

    /// Best-effort; empty when the backing service is unreachable
    async fn list_models(&self) -> Vec<String>;
}
