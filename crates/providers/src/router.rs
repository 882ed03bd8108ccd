//! Provider router: selects the completion and embedding providers based on config.
//!
//! Handles provider creation, caching, and routing requests to the right backend.

use std::collections::HashMap;
use std::sync::Arc;
use mimir_core::error::ProviderError;
use mimir_core::provider::Provider;
use crate::openai_compat::OpenAiCompatProvider;

/// Routes LLM requests to the correct provider.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    completion_provider: String,
    embedding_provider: String,
}

impl ProviderRouter {
    pub fn new(completion_provider: impl Into<String>, embedding_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            completion_provider: completion_provider.into(),
            embedding_provider: embedding_provider.into(),
        }
    }

    /// Register a provider.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Get a specific provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// The provider that answers chat requests.
    pub fn completion(&self) -> Result<Arc<dyn Provider>, ProviderError> {
        self.get(&self.completion_provider)
            .ok_or_else(|| ProviderError::NotConfigured(self.completion_provider.clone()))
    }

    /// The provider that embeds queries and ingested text.
    pub fn embedding(&self) -> Result<Arc<dyn Provider>, ProviderError> {
        self.get(&self.embedding_provider)
            .ok_or_else(|| ProviderError::NotConfigured(self.embedding_provider.clone()))
    }

    /// List all registered provider names.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

/// Build providers from configuration.
pub fn build_from_config(config: &mimir_config::AppConfig) -> ProviderRouter {
    let mut router = ProviderRouter::new(&config.completion.provider, &config.embedding.provider);

    let mut names: Vec<&String> = config.providers.keys().collect();
    for name in [&config.completion.provider, &config.embedding.provider] {
        if !names.contains(&name) {
            names.push(name);
        }
    }

    for name in names {
        let provider_config = config.providers.get(name).cloned().unwrap_or_default();
        let api_key = provider_config
            .api_key
            .clone()
            .or_else(|| config.api_key.clone())
            .unwrap_or_default();
        let base_url = provider_config
            .api_url
            .clone()
            .unwrap_or_else(|| default_base_url(name));

        let provider: Arc<dyn Provider> = if name == "azure" {
            Arc::new(OpenAiCompatProvider::azure(
                &base_url,
                &api_key,
                provider_config.api_version.as_deref(),
            ))
        } else {
            Arc::new(OpenAiCompatProvider::new(name.as_str(), &base_url, &api_key))
        };

        router.register(name.clone(), provider);
    }

    router
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openai" => "https://api.openai.com/v1".into(),
        "azure" => "https://localhost.openai.azure.com".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}
