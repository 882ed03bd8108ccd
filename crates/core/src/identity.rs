//! Registered identities and the store that holds them.
//!
//! Each identity maps a user id to a reference face embedding and the access
//! role that decides which knowledge sources a session may see. The store is
//! read-mostly: matching takes a [`snapshot`](IdentityStore::snapshot), and
//! only explicit (re-)registration replaces an embedding.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::error::StoreError;

/// A registered user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserIdentity {
    /// Unique user identifier (usually an e-mail address)
    pub user_id: String,

    pub display_name: String,

    /// Access role; one of the roles configured under `[sources]`
    pub role: String,

    /// L2-normalised reference embedding
    #[serde(skip)]
    pub reference_embedding: Vec<f32>,

    pub created_at: DateTime<Utc>,
}

impl UserIdentity {
    pub fn new(
        user_id: impl Into<String>,
        display_name: impl Into<String>,
        role: impl Into<String>,
        reference_embedding: Vec<f32>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            role: role.into(),
            reference_embedding,
            created_at: Utc::now(),
        }
    }
}

/// Persistent mapping from user id to identity.
///
/// Implementations normalise reference embeddings on write and serialise
/// writes per record, never behind one global lock.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "memory").
    fn name(&self) -> &str;

    /// Insert or replace an identity. A replaced identity keeps its original
    /// `created_at`. Returns the identity as stored.
    async fn upsert(&self, identity: UserIdentity) -> std::result::Result<UserIdentity, StoreError>;

    async fn get(&self, user_id: &str) -> std::result::Result<Option<UserIdentity>, StoreError>;

    /// Remove one identity; `false` if it did not exist.
    async fn remove(&self, user_id: &str) -> std::result::Result<bool, StoreError>;

    /// A consistent copy of every identity, ordered by user id.
    async fn snapshot(&self) -> std::result::Result<Vec<UserIdentity>, StoreError>;

    async fn count(&self) -> std::result::Result<usize, StoreError>;

    /// Remove every identity, returning how many were removed.
    async fn clear(&self) -> std::result::Result<usize, StoreError>;
}
