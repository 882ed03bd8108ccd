//! Document ingestion into knowledge collections.
//!
//! Text is split, embedded in batches, then appended. Embedding happens
//! before the collection's writer lock is taken; the lock covers only the
//! append, and each collection has its own.

use crate::sources::{SourceRegistry, source_label};
use dashmap::DashMap;
use mimir_config::IngestConfig;
use mimir_core::error::{Error, StoreError};
use mimir_core::knowledge::{KnowledgeIndex, Passage, Scope};
use mimir_core::provider::{EmbeddingRequest, Provider};
use mimir_security::{AuditEvent, AuditLogger, AuditOutcome};
use mimir_store::{format_record, personal_collection, role_collection, split_text};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

const EMBED_BATCH: usize = 64;

/// Where an upload lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestTarget {
    Common,
    DataMart,
    Role(String),
    Personal(String),
}

impl IngestTarget {
    pub fn scope(&self) -> Scope {
        match self {
            Self::Common => Scope::Common,
            Self::DataMart => Scope::DataMart,
            Self::Role(_) => Scope::RoleSpecific,
            Self::Personal(_) => Scope::Personal,
        }
    }

    pub fn collection_id(&self, registry: &SourceRegistry) -> String {
        match self {
            Self::Common => registry.common_collection().to_string(),
            Self::DataMart => registry.data_mart_collection().to_string(),
            Self::Role(role) => role_collection(role),
            Self::Personal(user_id) => personal_collection(user_id),
        }
    }

    /// `scope` plus the owner that role and personal scopes need.
    pub fn from_scope(scope: Scope, owner: Option<&str>) -> Result<Self, Error> {
        let owned = || {
            owner
                .filter(|o| !o.trim().is_empty())
                .map(str::to_string)
                .ok_or_else(|| Error::Config {
                    message: format!("scope '{scope}' needs an owner"),
                })
        };
        Ok(match scope {
            Scope::Common => Self::Common,
            Scope::DataMart => Self::DataMart,
            Scope::RoleSpecific => Self::Role(owned()?),
            Scope::Personal => Self::Personal(owned()?),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub collection_id: String,
    pub passages: usize,
}

pub struct Ingestor {
    index: Arc<dyn KnowledgeIndex>,
    registry: Arc<SourceRegistry>,
    embedder: Arc<dyn Provider>,
    embedding_model: String,
    chunk_size: usize,
    chunk_overlap: usize,
    locks: DashMap<String, Arc<Mutex<()>>>,
    audit: Option<Arc<AuditLogger>>,
}

impl std::fmt::Debug for Ingestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ingestor")
            .field("index", &self.index.name())
            .field("embedding_model", &self.embedding_model)
            .field("chunk_size", &self.chunk_size)
            .field("chunk_overlap", &self.chunk_overlap)
            .finish()
    }
}

impl Ingestor {
    pub fn new(
        index: Arc<dyn KnowledgeIndex>,
        registry: Arc<SourceRegistry>,
        embedder: Arc<dyn Provider>,
        embedding_model: impl Into<String>,
        config: &IngestConfig,
    ) -> Self {
        Self {
            index,
            registry,
            embedder,
            embedding_model: embedding_model.into(),
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            locks: DashMap::new(),
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn index(&self) -> &Arc<dyn KnowledgeIndex> {
        &self.index
    }

    fn lock_for(&self, collection_id: &str) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.entry(collection_id.to_string()).or_default().value())
    }

    /// Drop the writer lock entry once no other writer holds a handle to it.
    fn release(&self, collection_id: &str, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.locks.remove_if(collection_id, |_, l| Arc::strong_count(l) == 1);
    }

    /// Append pre-embedded `(text, embedding)` pairs.
    pub async fn ingest_passages(
        &self,
        target: &IngestTarget,
        document: &str,
        pairs: Vec<(String, Vec<f32>)>,
    ) -> Result<IngestReport, Error> {
        let collection_id = target.collection_id(&self.registry);
        let label = source_label(target.scope(), &collection_id, document);
        let passages: Vec<Passage> = pairs
            .into_iter()
            .filter(|(text, embedding)| !text.trim().is_empty() && !embedding.is_empty())
            .map(|(text, embedding)| Passage::new(collection_id.as_str(), text, embedding, label.as_str()))
            .collect();

        let added = if passages.is_empty() {
            0
        } else {
            let lock = self.lock_for(&collection_id);
            let appended = {
                let _guard = lock.lock().await;
                self.index.append(&collection_id, passages).await
            };
            self.release(&collection_id, lock);
            appended?
        };

        info!(collection = %collection_id, document, passages = added, "Document ingested");
        if let Some(audit) = &self.audit {
            audit.log(
                AuditEvent::DocumentIngested {
                    collection: collection_id.clone(),
                    passages: added,
                },
                target_actor(target),
                document,
                AuditOutcome::Success,
                None,
            );
        }
        Ok(IngestReport {
            collection_id,
            passages: added,
        })
    }

    /// Split, embed and append a text document.
    pub async fn ingest_text(&self, target: &IngestTarget, document: &str, text: &str) -> Result<IngestReport, Error> {
        let chunks = split_text(text, self.chunk_size, self.chunk_overlap);
        let mut pairs = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(EMBED_BATCH) {
            let response = self
                .embedder
                .embed(EmbeddingRequest {
                    model: self.embedding_model.clone(),
                    inputs: batch.to_vec(),
                })
                .await?;
            if response.embeddings.len() != batch.len() {
                return Err(StoreError::InvalidRecord(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    response.embeddings.len()
                ))
                .into());
            }
            pairs.extend(batch.iter().cloned().zip(response.embeddings));
        }
        self.ingest_passages(target, document, pairs).await
    }

    /// Render a structured record and ingest it into the data mart.
    pub async fn ingest_record(&self, data_type: &str, data: &Map<String, Value>) -> Result<IngestReport, Error> {
        let text = format_record(data_type, data);
        self.ingest_text(&IngestTarget::DataMart, data_type, &text).await
    }

    pub async fn clear_collection(&self, collection_id: &str) -> Result<usize, Error> {
        let lock = self.lock_for(collection_id);
        let removed = {
            let _guard = lock.lock().await;
            self.index.delete_collection(collection_id).await
        };
        self.release(collection_id, lock);
        let removed = removed?;
        if let Some(audit) = &self.audit {
            audit.log(
                AuditEvent::CollectionCleared {
                    collection: collection_id.to_string(),
                },
                "admin",
                collection_id,
                AuditOutcome::Success,
                Some(format!("passages={removed}")),
            );
        }
        Ok(removed)
    }
}

fn target_actor(target: &IngestTarget) -> &str {
    match target {
        IngestTarget::Personal(user_id) => user_id.as_str(),
        _ => "admin",
    }
}
