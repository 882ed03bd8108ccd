//! Knowledge collections, passages and the similarity index over them.
//!
//! A collection is identified by a string id and classified by a [`Scope`].
//! Passages are immutable once appended; they disappear only when their
//! collection is deleted.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use crate::error::StoreError;

/// Classification of a knowledge collection. The set is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scope {
    /// Shared knowledge visible to every role
    Common,
    /// Rendered structured business data
    DataMart,
    /// One collection per literal role name
    RoleSpecific,
    /// One collection per user id
    Personal,
}

impl Scope {
    pub const ALL: [Scope; 4] = [Scope::Common, Scope::DataMart, Scope::RoleSpecific, Scope::Personal];

    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Common => "common",
            Scope::DataMart => "data-mart",
            Scope::RoleSpecific => "role-specific",
            Scope::Personal => "personal",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "common" => Ok(Scope::Common),
            "data-mart" | "datamart" => Ok(Scope::DataMart),
            "role-specific" | "role" => Ok(Scope::RoleSpecific),
            "personal" | "user" => Ok(Scope::Personal),
            other => Err(format!("unknown scope tag '{other}'")),
        }
    }
}

/// A chunk of ingested text with its embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passage {
    pub passage_id: String,
    pub collection_id: String,
    pub text: String,

    #[serde(skip)]
    pub embedding: Vec<f32>,

    /// Attribution label, e.g. `personal:user_docs_u1/policy.txt#0`
    pub source_label: String,
}

impl Passage {
    /// A new passage with a fresh id.
    pub fn new(
        collection_id: impl Into<String>,
        text: impl Into<String>,
        embedding: Vec<f32>,
        source_label: impl Into<String>,
    ) -> Self {
        Self {
            passage_id: Uuid::new_v4().to_string(),
            collection_id: collection_id.into(),
            text: text.into(),
            embedding,
            source_label: source_label.into(),
        }
    }
}

/// A passage scored against one query. Ephemeral, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResult {
    pub passage: Passage,
    pub similarity_score: f32,
    pub collection_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionStats {
    pub collection_id: String,
    pub passage_count: usize,
    /// Embedding dimension of the stored passages, if any are stored
    pub dimension: Option<usize>,
}

/// Per-collection nearest-neighbour index.
///
/// Similarity is cosine in every implementation so scores from different
/// collections are comparable after merging.
#[async_trait]
pub trait KnowledgeIndex: Send + Sync {
    fn name(&self) -> &str;

    /// Top-`k` passages by descending similarity; equal scores ordered by
    /// passage id. A missing or empty collection yields an empty list.
    async fn search(
        &self,
        collection_id: &str,
        query_embedding: &[f32],
        k: usize,
    ) -> std::result::Result<Vec<RetrievalResult>, StoreError>;

    /// Append passages to a collection, creating it if needed.
    async fn append(&self, collection_id: &str, passages: Vec<Passage>) -> std::result::Result<usize, StoreError>;

    /// Delete a collection with all its passages, returning how many were removed.
    async fn delete_collection(&self, collection_id: &str) -> std::result::Result<usize, StoreError>;

    async fn collection_stats(&self, collection_id: &str) -> std::result::Result<Option<CollectionStats>, StoreError>;

    /// Every non-empty collection, ordered by id.
    async fn list_collections(&self) -> std::result::Result<Vec<CollectionStats>, StoreError>;
}
