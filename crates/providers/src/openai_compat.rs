//! OpenAI-compatible provider implementation.
//!
//! Works with OpenAI, Azure OpenAI deployments, and any endpoint exposing the
//! OpenAI `/chat/completions` and `/embeddings` shapes.
//!
//! Azure differs in two places: the model name is a deployment in the URL
//! path, and the key travels in an `api-key` header next to an
//! `api-version` query parameter.

use async_trait::async_trait;
use mimir_core::error::ProviderError;
use mimir_core::message::{Message, Role};
use mimir_core::provider::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Default Azure OpenAI REST API version.
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-02-01";

/// How requests are authenticated and addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStyle {
    /// `Authorization: Bearer <key>`, model in the JSON body
    Bearer,
    /// `api-key: <key>`, model as deployment path segment
    Azure { api_version: String },
}

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    auth: AuthStyle,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider using bearer auth.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .unwrap_or_default();

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            auth: AuthStyle::Bearer,
            client,
        }
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key)
    }

    /// Create an Azure OpenAI provider for a resource endpoint such as
    /// `https://my-resource.openai.azure.com`.
    pub fn azure(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        api_version: Option<&str>,
    ) -> Self {
        Self::new("azure", endpoint, api_key).with_auth(AuthStyle::Azure {
            api_version: api_version.unwrap_or(DEFAULT_AZURE_API_VERSION).to_string(),
        })
    }

    pub fn with_auth(mut self, auth: AuthStyle) -> Self {
        self.auth = auth;
        self
    }

    /// Full URL for an operation (`chat/completions`, `embeddings`).
    fn endpoint(&self, operation: &str, model: &str) -> String {
        match &self.auth {
            AuthStyle::Bearer => format!("{}/{operation}", self.base_url),
            AuthStyle::Azure { api_version } => format!(
                "{}/openai/deployments/{model}/{operation}?api-version={api_version}",
                self.base_url
            ),
        }
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth {
            AuthStyle::Bearer => builder.header("Authorization", format!("Bearer {}", self.api_key)),
            AuthStyle::Azure { .. } => builder.header("api-key", &self.api_key),
        }
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: match m.role {
                    Role::User => "user".into(),
                    Role::Assistant => "assistant".into(),
                    Role::System => "system".into(),
                },
                content: Some(m.content.clone()),
            })
            .collect()
    }

    async fn post(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> std::result::Result<reqwest::Response, ProviderError> {
        let response = self
            .authorize(self.client.post(url))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if status == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(5);
            return Err(ProviderError::RateLimited { retry_after_secs });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status == 404 {
            return Err(ProviderError::ModelNotFound(url.to_string()));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(provider = %self.name, status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl mimir_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let url = self.endpoint("chat/completions", &request.model);

        let mut body = serde_json::json!({
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": false,
        });

        if self.auth == AuthStyle::Bearer {
            body["model"] = serde_json::json!(request.model);
        }

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.stop.is_empty() {
            body["stop"] = serde_json::json!(request.stop);
        }

        debug!(provider = %self.name, model = %request.model, messages = request.messages.len(), "Sending completion request");

        let response = self.post(&url, &body).await?;

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".into()))?;

        let message = Message::assistant(choice.message.content.unwrap_or_default());

        let usage = api_response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(ProviderResponse {
            message,
            usage,
            model: api_response.model.unwrap_or(request.model),
            metadata: serde_json::Map::new(),
        })
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let url = match &self.auth {
            AuthStyle::Bearer => format!("{}/models", self.base_url),
            AuthStyle::Azure { api_version } => {
                format!("{}/openai/models?api-version={api_version}", self.base_url)
            }
        };
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }

    async fn embed(
        &self,
        request: EmbeddingRequest,
    ) -> std::result::Result<EmbeddingResponse, ProviderError> {
        let url = self.endpoint("embeddings", &request.model);

        let mut body = serde_json::json!({
            "input": request.inputs,
            "encoding_format": "float",
        });
        if self.auth == AuthStyle::Bearer {
            body["model"] = serde_json::json!(request.model);
        }

        debug!(
            provider = %self.name,
            model = %request.model,
            count = request.inputs.len(),
            "Sending embedding request"
        );

        let response = self.post(&url, &body).await?;

        let mut api_resp: EmbeddingApiResponse = response.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse embedding response: {e}"))
        })?;

        if api_resp.data.len() != request.inputs.len() {
            return Err(ProviderError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                request.inputs.len(),
                api_resp.data.len()
            )));
        }

        api_resp.data.sort_by_key(|d| d.index);
        let embeddings = api_resp.data.into_iter().map(|d| d.embedding).collect();

        let usage = api_resp.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: 0,
            total_tokens: u.total_tokens,
        });

        Ok(EmbeddingResponse {
            embeddings,
            model: api_resp.model.unwrap_or(request.model),
            usage,
        })
    }
}

// --- Chat API types ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

// --- Embedding API types ---

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    model: Option<String>,
    usage: Option<EmbeddingApiUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiUsage {
    prompt_tokens: u32,
    total_tokens: u32,
}
