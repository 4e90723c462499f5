//! Named provider lookup and run-creation time resolution.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use super::{canned, CannedGenerator, OllamaGenerator, ProviderError, TextGenerator};
use crate::config::ResolvedConfig;

/// Provider and model chosen for a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedProvider {
    pub provider: String,
    pub model: String,
}

/// Provider status as reported to clients
#[derive(Debug, Clone, Serialize)]
pub struct ProviderInfo {
    pub name: String,
    pub healthy: bool,
    pub default_model: String,
    pub models: Vec<String>,
}

/// Closed set of generators, keyed by name
#[derive(Clone)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn TextGenerator>>,
    default_provider: String,
}

impl ProviderRegistry {
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: BTreeMap::new(),
            default_provider: default_provider.into().to_lowercase(),
        }
    }

    /// Registry with the built-in providers
    pub fn from_config(config: &ResolvedConfig) -> Self {
        Self::new(&config.default_provider)
            .with(Arc::new(OllamaGenerator::new(
                &config.ollama_base_url,
                &config.ollama_default_model,
            )))
            .with(Arc::new(CannedGenerator::new()))
    }

    /// Register a generator under its own name, replacing any previous one
    pub fn with(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.register(generator);
        self
    }

    pub fn register(&mut self, generator: Arc<dyn TextGenerator>) {
        self.providers
            .insert(generator.name().to_lowercase(), generator);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TextGenerator>> {
        self.providers.get(&name.to_lowercase()).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    pub fn default_provider(&self) -> &str {
        &self.default_provider
    }

    /// Name of the provider that serves dry runs
    pub fn offline_provider(&self) -> &'static str {
        canned::NAME
    }

    /// Pick and validate the provider/model pair for a new run.
    ///
    /// An unspecified provider falls back to the configured default and an
    /// unspecified model to that provider's default model. Unknown or
    /// unhealthy providers are rejected.
    pub async fn resolve(
        &self,
        provider: Option<&str>,
        model: Option<&str>,
    ) -> Result<ResolvedProvider, ProviderError> {
        let name = provider
            .map(str::to_lowercase)
            .unwrap_or_else(|| self.default_provider.clone());

        let generator = self
            .get(&name)
            .ok_or_else(|| ProviderError::Unknown(name.clone()))?;

        if !generator.health().await {
            warn!(provider = %name, "Rejecting unhealthy provider");
            return Err(ProviderError::Unhealthy(name));
        }

        let model = model
            .map(str::to_string)
            .unwrap_or_else(|| generator.default_model().to_string());

        info!(provider = %name, model = %model, "Resolved provider");
        Ok(ResolvedProvider {
            provider: name,
            model,
        })
    }

    /// Health, default model and available models of every provider
    pub async fn describe(&self) -> Vec<ProviderInfo> {
        let mut infos = Vec::with_capacity(self.providers.len());
        for (name, generator) in &self.providers {
            infos.push(ProviderInfo {
                name: name.clone(),
                healthy: generator.health().await,
                default_model: generator.default_model().to_string(),
                models: generator.list_models().await,
            });
        }
        infos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{GenerateRequest, GenerationProgress};
    use async_trait::async_trait;

    struct Down;

    #[async_trait]
    impl TextGenerator for Down {
        fn name(&self) -> &str {
            "down"
        }

        fn default_model(&self) -> &str {
            "none"
        }

        async fn health(&self) -> bool {
            false
        }

        async fn generate(
            &self,
            _request: &GenerateRequest,
            _progress: &GenerationProgress<'_>,
        ) -> Result<String, ProviderError> {
            Err(ProviderError::Connectivity("down".to_string()))
        }

        async fn list_models(&self) -> Vec<String> {
            Vec::new()
        }
    }

    fn registry() -> ProviderRegistry {
        ProviderRegistry::new("canned")
            .with(Arc::new(CannedGenerator::new()))
            .with(Arc::new(Down))
    }

    #[tokio::test]
    async fn test_defaults_fill_in() {
        let resolved = registry().resolve(None, None).await.unwrap();
        assert_eq!(resolved.provider, "canned");
        assert_eq!(resolved.model, "canned");

        let resolved = registry().resolve(Some("Canned"), Some("big")).await.unwrap();
        assert_eq!(resolved.model, "big");
    }

    #[tokio::test]
    async fn test_rejects_unknown_and_unhealthy() {
        let err = registry().resolve(Some("nope"), None).await.unwrap_err();
        assert!(matches!(err, ProviderError::Unknown(name) if name == "nope"));

        let err = registry().resolve(Some("down"), None).await.unwrap_err();
        assert!(matches!(err, ProviderError::Unhealthy(_)));
    }

    #[tokio::test]
    async fn test_describe_lists_every_provider() {
        let infos = registry().describe().await;
        let names: Vec<_> = infos.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["canned", "down"]);
        assert!(infos[0].healthy);
        assert!(!infos[1].healthy);
    }
}
