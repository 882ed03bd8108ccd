//! Configuration loading, validation, and management for Mimir.
//!
//! Loads configuration from `~/.mimir/config.toml` with environment
//! variable overrides. Validates all settings at startup; the resulting value
//! is immutable and handed to each component at construction.

use mimir_core::Scope;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.mimir/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Face matching settings
    #[serde(default)]
    pub face: FaceConfig,

    /// Session credential settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Role → knowledge source mapping
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Retrieval and context composition
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Answer generation
    #[serde(default)]
    pub completion: CompletionConfig,

    /// Text embeddings for queries and ingested passages
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Persistence
    #[serde(default)]
    pub storage: StorageConfig,

    /// Document ingestion
    #[serde(default)]
    pub ingest: IngestConfig,

    /// HTTP gateway
    #[serde(default)]
    pub gateway: GatewayConfig,
}

fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("face", &self.face)
            .field("session", &self.session)
            .field("sources", &self.sources)
            .field("retrieval", &self.retrieval)
            .field("completion", &self.completion)
            .field("embedding", &self.embedding)
            .field("providers", &self.providers)
            .field("storage", &self.storage)
            .field("ingest", &self.ingest)
            .field("gateway", &self.gateway)
            .finish()
    }
}

// --- face ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceConfig {
    /// Maximum accepted L2 distance between normalised embeddings (inclusive)
    #[serde(default = "default_face_threshold")]
    pub threshold: f32,

    /// A runner-up within this distance of the best match makes the match ambiguous
    #[serde(default = "default_tie_epsilon")]
    pub tie_epsilon: f32,

    /// Base URL of the face detection + embedding service
    #[serde(default = "default_face_service_url")]
    pub service_url: String,

    #[serde(default = "default_face_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_face_threshold() -> f32 {
    0.85
}
fn default_tie_epsilon() -> f32 {
    1e-3
}
fn default_face_service_url() -> String {
    "http://127.0.0.1:8501".into()
}
fn default_face_timeout_ms() -> u64 {
    10_000
}

impl Default for FaceConfig {
    fn default() -> Self {
        Self {
            threshold: default_face_threshold(),
            tie_epsilon: default_tie_epsilon(),
            service_url: default_face_service_url(),
            timeout_ms: default_face_timeout_ms(),
        }
    }
}

// --- session ---

#[derive(Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_validity_minutes")]
    pub validity_minutes: u64,

    /// HMAC secret. When absent a random secret is generated per process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,

    /// Enforce logout by consulting the revocation list during validation
    #[serde(default)]
    pub strict_logout: bool,
}

fn default_validity_minutes() -> u64 {
    24 * 60
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            validity_minutes: default_validity_minutes(),
            secret: None,
            strict_logout: false,
        }
    }
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("validity_minutes", &self.validity_minutes)
            .field("secret", &redact(&self.secret))
            .field("strict_logout", &self.strict_logout)
            .finish()
    }
}

// --- sources ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Fixed id of the common knowledge collection
    #[serde(default = "default_common_collection")]
    pub common_collection: String,

    /// Fixed id of the data-mart collection
    #[serde(default = "default_data_mart_collection")]
    pub data_mart_collection: String,

    /// Ordered role list; each role enables an ordered list of scope tags
    #[serde(default = "default_roles")]
    pub roles: Vec<RoleSources>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSources {
    pub name: String,

    /// Scope tags: `common`, `data-mart`, `role-specific`, `personal`
    #[serde(default)]
    pub scopes: Vec<String>,
}

fn default_common_collection() -> String {
    "common_knowledge_base".into()
}
fn default_data_mart_collection() -> String {
    "data_mart_base".into()
}

fn default_roles() -> Vec<RoleSources> {
    let all: Vec<String> = Scope::ALL.iter().map(|s| s.as_str().to_string()).collect();
    ["Analyst-Gaming", "Analyst-Non-Gaming", "Leadership-Gaming", "Leadership-Non-Gaming"]
        .into_iter()
        .map(|name| RoleSources {
            name: name.into(),
            scopes: all.clone(),
        })
        .collect()
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            common_collection: default_common_collection(),
            data_mart_collection: default_data_mart_collection(),
            roles: default_roles(),
        }
    }
}

impl SourcesConfig {
    pub fn role(&self, name: &str) -> Option<&RoleSources> {
        self.roles.iter().find(|r| r.name == name)
    }

    pub fn role_names(&self) -> Vec<String> {
        self.roles.iter().map(|r| r.name.clone()).collect()
    }
}

// --- retrieval ---

/// Unit in which the context budget is measured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetUnit {
    #[default]
    Characters,
    Tokens,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Passages fetched per collection, not globally
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_context_budget")]
    pub context_budget: usize,

    #[serde(default)]
    pub budget_unit: BudgetUnit,

    /// Word-set Jaccard similarity at or above which two passages are duplicates
    #[serde(default = "default_dedup_threshold")]
    pub dedup_threshold: f32,

    /// Per-collection search timeout; must stay below the completion timeout
    #[serde(default = "default_retrieval_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_top_k() -> usize {
    5
}
fn default_context_budget() -> usize {
    4000
}
fn default_dedup_threshold() -> f32 {
    0.9
}
fn default_retrieval_timeout_ms() -> u64 {
    5_000
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            context_budget: default_context_budget(),
            budget_unit: BudgetUnit::default(),
            dedup_threshold: default_dedup_threshold(),
            timeout_ms: default_retrieval_timeout_ms(),
        }
    }
}

// --- completion / embedding ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    #[serde(default = "default_completion_provider")]
    pub provider: String,

    /// Model name, or deployment name for Azure
    #[serde(default = "default_completion_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Conversation turns (a question and its answer) forwarded with each request
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,

    #[serde(default = "default_completion_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_completion_provider() -> String {
    "azure".into()
}
fn default_completion_model() -> String {
    "gpt-4".into()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_tokens() -> u32 {
    2000
}
fn default_history_turns() -> usize {
    10
}
fn default_completion_timeout_ms() -> u64 {
    60_000
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: default_completion_provider(),
            model: default_completion_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            history_turns: default_history_turns(),
            timeout_ms: default_completion_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,
}

fn default_embedding_provider() -> String {
    "openai".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Azure OpenAI `api-version` query parameter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("api_version", &self.api_version)
            .finish()
    }
}

// --- storage / ingest ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `sqlite` or `memory`
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// Directory holding `mimir.db`; defaults to `~/.mimir/data`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

fn default_storage_backend() -> String {
    "sqlite".into()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            data_dir: None,
        }
    }
}

impl StorageConfig {
    pub fn database_path(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("data"))
            .join("mimir.db")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Characters per chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters shared between consecutive chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

// --- gateway ---

#[derive(Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Shared key for `/admin/*` routes; admin routes are refused when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_key: Option<String>,

    /// Request body limit; photos arrive base64-encoded
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,

    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: usize,

    /// Keep a rolling per-user history when chat callers omit one
    #[serde(default = "default_true")]
    pub keep_history: bool,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_body_limit() -> usize {
    8 * 1024 * 1024
}
fn default_rate_limit() -> usize {
    60
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            admin_key: None,
            body_limit_bytes: default_body_limit(),
            rate_limit_per_minute: default_rate_limit(),
            keep_history: true,
        }
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("port", &self.port)
            .field("host", &self.host)
            .field("admin_key", &redact(&self.admin_key))
            .field("body_limit_bytes", &self.body_limit_bytes)
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("keep_history", &self.keep_history)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.mimir/config.toml).
    ///
    /// Environment overrides:
    /// - `MIMIR_API_KEY`, then `AZURE_OPENAI_API_KEY`, then `OPENAI_API_KEY`
    /// - `MIMIR_SESSION_SECRET`, `MIMIR_ADMIN_KEY`, `MIMIR_DATA_DIR`
    /// - `AZURE_OPENAI_ENDPOINT`, `AZURE_OPENAI_API_VERSION`,
    ///   `AZURE_OPENAI_DEPLOYMENT_NAME`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = var("MIMIR_API_KEY")
                .or_else(|| var("AZURE_OPENAI_API_KEY"))
                .or_else(|| var("OPENAI_API_KEY"));
        }
        if let Some(secret) = var("MIMIR_SESSION_SECRET") {
            self.session.secret = Some(secret);
        }
        if let Some(key) = var("MIMIR_ADMIN_KEY") {
            self.gateway.admin_key = Some(key);
        }
        if let Some(dir) = var("MIMIR_DATA_DIR") {
            self.storage.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(endpoint) = var("AZURE_OPENAI_ENDPOINT") {
            self.providers.entry("azure".into()).or_default().api_url = Some(endpoint);
        }
        if let Some(version) = var("AZURE_OPENAI_API_VERSION") {
            self.providers.entry("azure".into()).or_default().api_version = Some(version);
        }
        if let Some(deployment) = var("AZURE_OPENAI_DEPLOYMENT_NAME") {
            self.completion.model = deployment;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".mimir")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |msg: &str| Err(ConfigError::ValidationError(msg.into()));

        if !(self.face.threshold > 0.0) {
            return fail("face.threshold must be > 0");
        }
        if self.face.tie_epsilon < 0.0 {
            return fail("face.tie_epsilon must be >= 0");
        }
        if self.session.validity_minutes == 0 {
            return fail("session.validity_minutes must be > 0");
        }
        if self.retrieval.top_k == 0 {
            return fail("retrieval.top_k must be > 0");
        }
        if self.retrieval.context_budget == 0 {
            return fail("retrieval.context_budget must be > 0");
        }
        if !(self.retrieval.dedup_threshold > 0.0 && self.retrieval.dedup_threshold <= 1.0) {
            return fail("retrieval.dedup_threshold must be in (0, 1]");
        }
        if self.retrieval.timeout_ms >= self.completion.timeout_ms {
            return fail("retrieval.timeout_ms must be shorter than completion.timeout_ms");
        }
        if self.completion.temperature < 0.0 || self.completion.temperature > 2.0 {
            return fail("completion.temperature must be between 0.0 and 2.0");
        }
        if self.ingest.chunk_size == 0 || self.ingest.chunk_overlap >= self.ingest.chunk_size {
            return fail("ingest.chunk_overlap must be smaller than a non-zero ingest.chunk_size");
        }
        if !matches!(self.storage.backend.as_str(), "sqlite" | "memory") {
            return Err(ConfigError::ValidationError(format!(
                "storage.backend must be 'sqlite' or 'memory', got '{}'",
                self.storage.backend
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for role in &self.sources.roles {
            if role.name.trim().is_empty() {
                return fail("sources.roles entries need a name");
            }
            if !seen.insert(role.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "role '{}' is configured twice",
                    role.name
                )));
            }
            for tag in &role.scopes {
                tag.parse::<Scope>().map_err(|e| {
                    ConfigError::ValidationError(format!("role '{}': {e}", role.name))
                })?;
            }
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some() || self.providers.values().any(|p| p.api_key.is_some())
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            face: FaceConfig::default(),
            session: SessionConfig::default(),
            sources: SourcesConfig::default(),
            retrieval: RetrievalConfig::default(),
            completion: CompletionConfig::default(),
            embedding: EmbeddingConfig::default(),
            providers: HashMap::new(),
            storage: StorageConfig::default(),
            ingest: IngestConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
