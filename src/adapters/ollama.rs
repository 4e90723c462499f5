//! Ollama HTTP provider.
//!
//! Uses the non-streaming `POST /api/generate` endpoint; `GET /api/tags`
//! doubles as the health check and the model listing.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{run_with_progress, GenerateRequest, GenerationProgress, ProviderError, TextGenerator};

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "gemma3:27b";

/// Upper bound for health checks and model listing
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct OllamaGenerator {
    base_url: String,
    default_model: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

impl OllamaGenerator {
    pub fn new(base_url: impl Into<String>, default_model: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        info!(base_url = %base_url, "Ollama provider configured");

        Self {
            base_url,
            default_model: default_model.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn request_generation(&self, request: &GenerateRequest) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(self.url("/api/generate"))
            .json(&serde_json::json!({
                "model": request.model,
                "prompt": request.prompt,
                "stream": false,
            }))
            .send()
            .await
            .map_err(|e| transport_error(e, request.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        match data.get("response").and_then(|v| v.as_str()) {
            Some(text) => Ok(text.to_string()),
            None => Err(ProviderError::Malformed(format!(
                "missing 'response' field in {data}"
            ))),
        }
    }

    async fn fetch_tags(&self) -> Result<TagsResponse, reqwest::Error> {
        self.client
            .get(self.url("/api/tags"))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

fn transport_error(e: reqwest::Error, timeout: Duration) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(timeout)
    } else {
        ProviderError::Connectivity(e.to_string())
    }
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    fn name(&self) -> &str {
        "ollama"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn health(&self) -> bool {
        match self
            .client
            .get(self.url("/api/tags"))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!(error = %e, "Ollama health check failed");
                false
            }
        }
    }

    async fn generate(
        &self,
        request: &GenerateRequest,
        progress: &GenerationProgress<'_>,
    ) -> Result<String, ProviderError> {
        debug!(model = %request.model, "Requesting generation from Ollama");
        let result = run_with_progress(request, progress, self.request_generation(request)).await;

        match &result {
            Ok(text) => info!(model = %request.model, chars = text.len(), "Generation succeeded"),
            Err(e) => warn!(model = %request.model, error = %e, "Generation failed"),
        }
        result
    }

    async fn list_models(&self) -> Vec<String> {
        match self.fetch_tags().await {
            Ok(tags) => tags.models.into_iter().map(|m| m.name).collect(),
            Err(e) => {
                warn!(error = %e, "Could not list Ollama models");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_trimmed() {
        let generator = OllamaGenerator::new("http://gpu-box:11434/", DEFAULT_MODEL);
        assert_eq!(generator.base_url(), "http://gpu-box:11434");
        assert_eq!(generator.url("/api/tags"), "http://gpu-box:11434/api/tags");
        assert_eq!(generator.default_model(), "gemma3:27b");
    }

    #[tokio::test]
    async fn test_unreachable_service() {
        // Port 9 (discard) is not an HTTP server
        let generator = OllamaGenerator::new("http://127.0.0.1:9", DEFAULT_MODEL);
        assert!(!generator.health().await);
        assert!(generator.list_models().await.is_empty());
    }

    #[test]
    fn test_tags_parsing() {
        let tags: TagsResponse =
            serde_json::from_str(r#"{"models":[{"name":"gemma3:27b","size":1},{"name":"qwen3-coder:latest"}]}"#)
                .unwrap();
        let names: Vec<_> = tags.models.into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["gemma3:27b", "qwen3-coder:latest"]);
    }
}
