//! In-memory backends, useful for testing and ephemeral deployments.
//!
//! Both stores shard their records over a `DashMap`, so writers to one
//! identity or one collection never block readers of another. A collection's
//! passages sit behind their own `RwLock`; the map guard is released before
//! that lock is awaited.

use crate::vector;
use async_trait::async_trait;
use dashmap::DashMap;
use mimir_core::error::StoreError;
use mimir_core::identity::{IdentityStore, UserIdentity};
use mimir_core::knowledge::{CollectionStats, KnowledgeIndex, Passage, RetrievalResult};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Identities keyed by user id.
#[derive(Default)]
pub struct InMemoryIdentityStore {
    identities: DashMap<String, UserIdentity>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn upsert(&self, mut identity: UserIdentity) -> Result<UserIdentity, StoreError> {
        if identity.user_id.is_empty() {
            return Err(StoreError::InvalidRecord("user_id is empty".into()));
        }
        identity.reference_embedding = vector::normalize(&identity.reference_embedding);

        let stored = self
            .identities
            .entry(identity.user_id.clone())
            .and_modify(|existing| {
                let created_at = existing.created_at;
                *existing = identity.clone();
                existing.created_at = created_at;
            })
            .or_insert(identity)
            .clone();
        Ok(stored)
    }

    async fn get(&self, user_id: &str) -> Result<Option<UserIdentity>, StoreError> {
        Ok(self.identities.get(user_id).map(|e| e.value().clone()))
    }

    async fn remove(&self, user_id: &str) -> Result<bool, StoreError> {
        Ok(self.identities.remove(user_id).is_some())
    }

    async fn snapshot(&self) -> Result<Vec<UserIdentity>, StoreError> {
        let mut all: Vec<UserIdentity> = self.identities.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        Ok(all)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.identities.len())
    }

    async fn clear(&self) -> Result<usize, StoreError> {
        let removed = self.identities.len();
        self.identities.clear();
        Ok(removed)
    }
}

type Collection = Arc<RwLock<Vec<Passage>>>;

/// Passages grouped by collection id.
#[derive(Default)]
pub struct InMemoryKnowledgeIndex {
    collections: DashMap<String, Collection>,
}

impl InMemoryKnowledgeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn collection(&self, collection_id: &str) -> Option<Collection> {
        self.collections.get(collection_id).map(|c| Arc::clone(c.value()))
    }
}

fn stats(collection_id: &str, passages: &[Passage]) -> CollectionStats {
    CollectionStats {
        collection_id: collection_id.to_string(),
        passage_count: passages.len(),
        dimension: passages.first().map(|p| p.embedding.len()),
    }
}

#[async_trait]
impl KnowledgeIndex for InMemoryKnowledgeIndex {
    fn name(&self) -> &str {
        "memory"
    }

    async fn search(
        &self,
        collection_id: &str,
        query_embedding: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievalResult>, StoreError> {
        let Some(collection) = self.collection(collection_id) else {
            return Ok(Vec::new());
        };
        let passages = collection.read().await;
        Ok(vector::rank_passages(passages.iter(), query_embedding, k))
    }

    async fn append(&self, collection_id: &str, passages: Vec<Passage>) -> Result<usize, StoreError> {
        if passages.iter().any(|p| p.collection_id != collection_id) {
            return Err(StoreError::InvalidRecord(format!(
                "passage does not belong to collection '{collection_id}'"
            )));
        }
        let collection = Arc::clone(
            self.collections
                .entry(collection_id.to_string())
                .or_default()
                .value(),
        );
        let added = passages.len();
        collection.write().await.extend(passages);
        debug!(collection = collection_id, added, "Appended passages");
        Ok(added)
    }

    async fn delete_collection(&self, collection_id: &str) -> Result<usize, StoreError> {
        match self.collections.remove(collection_id) {
            Some((_, collection)) => Ok(collection.read().await.len()),
            None => Ok(0),
        }
    }

    async fn collection_stats(&self, collection_id: &str) -> Result<Option<CollectionStats>, StoreError> {
        let Some(collection) = self.collection(collection_id) else {
            return Ok(None);
        };
        let passages = collection.read().await;
        Ok(Some(stats(collection_id, &passages)))
    }

    async fn list_collections(&self) -> Result<Vec<CollectionStats>, StoreError> {
        let handles: Vec<(String, Collection)> = self
            .collections
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();

        let mut all = Vec::with_capacity(handles.len());
        for (id, collection) in handles {
            let passages = collection.read().await;
            if !passages.is_empty() {
                all.push(stats(&id, &passages));
            }
        }
        all.sort_by(|a, b| a.collection_id.cmp(&b.collection_id));
        Ok(all)
    }
}
