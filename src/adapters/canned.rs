//! Offline provider that answers without any backing service.
//!
//! Used for dry runs and local development. Responses are deterministic:
//! a fixed reply if one was configured, otherwise an echo of the model and
//! the first line of the prompt.

use std::time::Duration;

use async_trait::async_trait;

use super::{run_with_progress, GenerateRequest, GenerationProgress, ProviderError, TextGenerator};

pub const NAME: &str = "canned";

#[derive(Debug, Clone, Default)]
pub struct CannedGenerator {
    reply: Option<String>,
    delay: Duration,
}

impl CannedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer with `reply`
    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = Some(reply.into());
        self
    }

    /// Hold every call for `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn respond(&self, request: &GenerateRequest) -> String {
        match &self.reply {
            Some(reply) => reply.clone(),
            None => {
                let first_line = request.prompt.lines().next().unwrap_or_default();
                format!("[{NAME}:{}] {}", request.model, first_line.trim())
            }
        }
    }
}

#[async_trait]
impl TextGenerator for CannedGenerator {
    fn name(&self) -> &str {
        NAME
    }

    fn default_model(&self) -> &str {
        NAME
    }

    async fn health(&self) -> bool {
        true
    }

    async fn generate(
        &self,
        request: &GenerateRequest,
        progress: &GenerationProgress<'_>,
    ) -> Result<String, ProviderError> {
        run_with_progress(request, progress, async {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            Ok(self.respond(request))
        })
        .await
    }

    async fn list_models(&self) -> Vec<String> {
        vec![NAME.to_string()]
    }
}
