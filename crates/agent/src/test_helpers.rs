//! Shared stand-ins for the completion service, the embedding service and
//! the knowledge index.

use async_trait::async_trait;
use mimir_core::error::{ProviderError, StoreError};
use mimir_core::knowledge::{CollectionStats, KnowledgeIndex, Passage, RetrievalResult};
use mimir_core::message::Message;
use mimir_core::provider::{EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, ProviderResponse, Usage};
use mimir_security::{AuthService, FaceMatcher, MatchPolicy, SessionIssuer};
use mimir_store::{InMemoryIdentityStore, InMemoryKnowledgeIndex};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const EMBED_DIM: usize = 32;

/// Bag-of-words embedding: each lowercase word bumps one hashed bucket.
pub fn embed_text(text: &str) -> Vec<f32> {
    let mut v = vec![0.0; EMBED_DIM];
    for word in text.split_whitespace() {
        let word = word.to_lowercase();
        let bucket = word
            .bytes()
            .fold(2166136261u32, |h, b| (h ^ u32::from(b)).wrapping_mul(16777619));
        v[bucket as usize % EMBED_DIM] += 1.0;
    }
    v
}

/// Returns scripted completions in order and embeds with [`embed_text`].
pub struct ScriptedProvider {
    answers: Mutex<VecDeque<Result<String, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
    embed_failure: Option<ProviderError>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new(answers: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            requests: Mutex::new(Vec::new()),
            embed_failure: None,
            delay: None,
        }
    }

    pub fn answering(text: &str) -> Self {
        Self::new(vec![Ok(text.to_string())])
    }

    pub fn failing_embeddings(mut self, error: ProviderError) -> Self {
        self.embed_failure = Some(error);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self
            .answers
            .lock()
            .unwrap()
            .pop_front()
            .expect("ScriptedProvider: no more answers");
        next.map(|text| ProviderResponse {
            message: Message::assistant(text),
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            model: "mock-model".into(),
            metadata: serde_json::Map::new(),
        })
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
        if let Some(e) = &self.embed_failure {
            return Err(e.clone());
        }
        Ok(EmbeddingResponse {
            embeddings: request.inputs.iter().map(|t| embed_text(t)).collect(),
            model: request.model,
            usage: None,
        })
    }
}

/// One collection per entry; labels are `<collection>#<n>`.
pub async fn seeded_index(collections: Vec<(&str, Vec<&str>)>) -> Arc<InMemoryKnowledgeIndex> {
    let index = Arc::new(InMemoryKnowledgeIndex::new());
    for (collection, texts) in collections {
        let passages = texts
            .iter()
            .enumerate()
            .map(|(i, text)| Passage::new(collection, *text, embed_text(text), format!("{collection}#{i}")))
            .collect();
        index.append(collection, passages).await.unwrap();
    }
    index
}

/// Wraps an index; named collections fail or stall.
pub struct FlakyIndex {
    inner: Arc<InMemoryKnowledgeIndex>,
    failing: HashSet<String>,
    slow: HashMap<String, Duration>,
}

impl FlakyIndex {
    pub fn new(inner: Arc<InMemoryKnowledgeIndex>) -> Self {
        Self {
            inner,
            failing: HashSet::new(),
            slow: HashMap::new(),
        }
    }

    pub fn failing(mut self, collection: &str) -> Self {
        self.failing.insert(collection.to_string());
        self
    }

    pub fn slow(mut self, collection: &str, delay: Duration) -> Self {
        self.slow.insert(collection.to_string(), delay);
        self
    }
}

#[async_trait]
impl KnowledgeIndex for FlakyIndex {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn search(&self, collection_id: &str, query: &[f32], k: usize) -> Result<Vec<RetrievalResult>, StoreError> {
        if self.failing.contains(collection_id) {
            return Err(StoreError::Storage("index offline".into()));
        }
        if let Some(delay) = self.slow.get(collection_id) {
            tokio::time::sleep(*delay).await;
        }
        self.inner.search(collection_id, query, k).await
    }

    async fn append(&self, collection_id: &str, passages: Vec<Passage>) -> Result<usize, StoreError> {
        self.inner.append(collection_id, passages).await
    }

    async fn delete_collection(&self, collection_id: &str) -> Result<usize, StoreError> {
        self.inner.delete_collection(collection_id).await
    }

    async fn collection_stats(&self, collection_id: &str) -> Result<Option<CollectionStats>, StoreError> {
        self.inner.collection_stats(collection_id).await
    }

    async fn list_collections(&self) -> Result<Vec<CollectionStats>, StoreError> {
        self.inner.list_collections().await
    }
}

/// Auth service over in-memory stores, any role accepted.
pub fn auth_service(knowledge: Arc<dyn KnowledgeIndex>) -> Arc<AuthService> {
    Arc::new(AuthService::new(
        Arc::new(NoFaces),
        Arc::new(InMemoryIdentityStore::new()),
        knowledge,
        FaceMatcher::new(MatchPolicy {
            threshold: 0.85,
            tie_epsilon: 1e-3,
        }),
        SessionIssuer::new(b"test-secret".to_vec(), 3600),
    ))
}

/// Register `user_id` with a one-hot face and log in with it.
pub async fn login(auth: &AuthService, user_id: &str, role: &str, slot: usize) -> String {
    let mut face = vec![0.0; 8];
    face[slot % 8] = 1.0;
    auth.register_embedding(user_id, user_id, role, face.clone()).await.unwrap();
    auth.authenticate_embedding(&face).await.unwrap().token
}

struct NoFaces;

#[async_trait]
impl mimir_core::face::FaceAnalyzer for NoFaces {
    fn name(&self) -> &str {
        "none"
    }

    async fn analyze(
        &self,
        _image: &[u8],
    ) -> Result<Option<mimir_core::face::FaceObservation>, mimir_core::error::FaceServiceError> {
        Ok(None)
    }
}
