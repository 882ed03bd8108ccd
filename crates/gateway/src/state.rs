//! Shared application state and the one place the subsystems are wired.

use dashmap::DashMap;
use mimir_agent::{ChatEngine, Ingestor, SourceRegistry};
use mimir_config::AppConfig;
use mimir_core::error::{Error, StoreError};
use mimir_core::face::FaceAnalyzer;
use mimir_core::identity::IdentityStore;
use mimir_core::knowledge::KnowledgeIndex;
use mimir_core::message::Message;
use mimir_core::provider::Provider;
use mimir_providers::HttpFaceAnalyzer;
use mimir_security::{AuditLogger, AuthService};
use mimir_store::{InMemoryIdentityStore, InMemoryKnowledgeIndex, SqliteStore};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Users with a rolling history before the oldest is evicted.
const MAX_HISTORIES: usize = 10_000;

/// The two persistent stores behind one backend choice.
#[derive(Clone)]
pub struct Stores {
    pub identities: Arc<dyn IdentityStore>,
    pub knowledge: Arc<dyn KnowledgeIndex>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            identities: Arc::new(InMemoryIdentityStore::new()),
            knowledge: Arc::new(InMemoryKnowledgeIndex::new()),
        }
    }

    /// `memory` or `sqlite` per `[storage]`.
    pub async fn from_config(config: &AppConfig) -> Result<Self, StoreError> {
        match config.storage.backend.as_str() {
            "memory" => Ok(Self::in_memory()),
            _ => {
                let path = config.storage.database_path();
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| StoreError::Storage(format!("Cannot create {}: {e}", parent.display())))?;
                }
                let store = Arc::new(SqliteStore::new(&format!("sqlite://{}", path.display())).await?);
                Ok(Self {
                    identities: store.clone(),
                    knowledge: store,
                })
            }
        }
    }
}

/// Shared state for every route.
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub engine: Arc<ChatEngine>,
    pub ingestor: Arc<Ingestor>,
    pub admin_key: Option<String>,
    pub keep_history: bool,
    /// Messages kept per user: two per completed turn
    pub history_limit: usize,
    pub histories: DashMap<String, VecDeque<Message>>,
    pub start_time: chrono::DateTime<chrono::Utc>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Wire every subsystem from configuration: stores, face service,
    /// completion and embedding providers.
    pub async fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let stores = Stores::from_config(config).await?;
        let faces: Arc<dyn FaceAnalyzer> = Arc::new(HttpFaceAnalyzer::new(
            &config.face.service_url,
            Duration::from_millis(config.face.timeout_ms),
        ));
        let router = mimir_providers::router::build_from_config(config);
        let completion = router.completion()?;
        let embedder = router.embedding()?;
        Ok(Self::assemble(config, stores, faces, completion, embedder))
    }

    /// Wire the subsystems around already built stores and services.
    pub fn assemble(
        config: &AppConfig,
        stores: Stores,
        faces: Arc<dyn FaceAnalyzer>,
        completion: Arc<dyn Provider>,
        embedder: Arc<dyn Provider>,
    ) -> Self {
        let audit = Arc::new(AuditLogger::tracing());
        let registry = Arc::new(SourceRegistry::new(&config.sources));
        let auth = Arc::new(
            AuthService::from_config(config, faces, stores.identities, stores.knowledge.clone())
                .with_audit(audit.clone()),
        );
        let engine = Arc::new(ChatEngine::from_config(
            config,
            auth.clone(),
            registry.clone(),
            stores.knowledge.clone(),
            completion,
            embedder.clone(),
        ));
        let ingestor = Arc::new(
            Ingestor::new(
                stores.knowledge,
                registry,
                embedder,
                config.embedding.model.clone(),
                &config.ingest,
            )
            .with_audit(audit),
        );

        info!(
            roles = config.sources.roles.len(),
            backend = %config.storage.backend,
            "Application state assembled"
        );
        Self {
            auth,
            engine,
            ingestor,
            admin_key: config.gateway.admin_key.clone(),
            keep_history: config.gateway.keep_history,
            history_limit: config.completion.history_turns * 2,
            histories: DashMap::new(),
            start_time: chrono::Utc::now(),
        }
    }

    pub fn history(&self, user_id: &str) -> Vec<Message> {
        self.histories
            .get(user_id)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Append one completed turn, keeping the newest `history_limit` messages.
    pub fn record_turn(&self, user_id: &str, query: &str, answer: &str) {
        if !self.keep_history {
            return;
        }
        if self.histories.len() >= MAX_HISTORIES && !self.histories.contains_key(user_id) {
            let oldest = self
                .histories
                .iter()
                .filter_map(|e| e.value().back().map(|m| (e.key().clone(), m.timestamp)))
                .min_by_key(|(_, ts)| *ts)
                .map(|(k, _)| k);
            if let Some(key) = oldest {
                self.histories.remove(&key);
            }
        }

        let mut history = self.histories.entry(user_id.to_string()).or_default();
        history.push_back(Message::user(query));
        history.push_back(Message::assistant(answer));
        while history.len() > self.history_limit {
            history.pop_front();
        }
    }

    pub fn forget(&self, user_id: &str) {
        self.histories.remove(user_id);
    }
}
