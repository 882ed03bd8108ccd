//! End-to-end tests for Mimir.
//!
//! These exercise the full path from a face embedding to a cited answer:
//! registration, login, session validation, role-scoped retrieval over
//! several collections, composition and answer generation.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mimir_agent::IngestTarget;
use mimir_config::{AppConfig, RoleSources};
use mimir_core::error::{FaceServiceError, ProviderError, SessionError, StoreError};
use mimir_core::face::{FaceAnalyzer, FaceObservation};
use mimir_core::knowledge::{CollectionStats, KnowledgeIndex, Passage, RetrievalResult};
use mimir_core::message::Message;
use mimir_core::provider::{EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, ProviderResponse, Usage};
use mimir_gateway::{AppState, RouterLimits, Stores, build_router};
use mimir_store::{InMemoryIdentityStore, InMemoryKnowledgeIndex, SqliteStore};

// ── Mocks ────────────────────────────────────────────────────────────────

/// Interprets the photo bytes as the embedding.
struct RawFaces;

#[async_trait]
impl FaceAnalyzer for RawFaces {
    fn name(&self) -> &str {
        "raw"
    }

    async fn analyze(&self, image: &[u8]) -> Result<Option<FaceObservation>, FaceServiceError> {
        if image.is_empty() {
            return Ok(None);
        }
        Ok(Some(FaceObservation {
            bounding_box: None,
            embedding: image.iter().map(|b| f32::from(*b)).collect(),
        }))
    }
}

const TOPICS: [&str; 4] = ["policy", "revenue", "holiday", "roadmap"];

fn topic_embedding(text: &str) -> Vec<f32> {
    let text = text.to_lowercase();
    TOPICS
        .iter()
        .map(|t| text.matches(t).count() as f32 + 0.05)
        .collect()
}

/// Scripted completion service that records what it was sent.
struct ScriptedProvider {
    answer: String,
    fail: bool,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn answering(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            fail: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn last_request(&self) -> ProviderRequest {
        self.requests.lock().unwrap().last().cloned().expect("no completion request")
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        if self.fail {
            return Err(ProviderError::Timeout("completion".into()));
        }
        Ok(ProviderResponse {
            message: Message::assistant(&self.answer),
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
        Ok(EmbeddingResponse {
            embeddings: request.inputs.iter().map(|t| topic_embedding(t)).collect(),
            model: request.model,
            usage: None,
        })
    }
}

/// Knowledge index whose named collections are offline.
struct OutageIndex {
    inner: InMemoryKnowledgeIndex,
    offline: HashSet<String>,
}

#[async_trait]
impl KnowledgeIndex for OutageIndex {
    fn name(&self) -> &str {
        "outage"
    }

    async fn search(&self, collection_id: &str, query: &[f32], k: usize) -> Result<Vec<RetrievalResult>, StoreError> {
        if self.offline.contains(collection_id) {
            return Err(StoreError::Storage("connection refused".into()));
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

// ── Setup ────────────────────────────────────────────────────────────────

const E1: [f32; 4] = [0.9, 0.1, 0.3, 0.2];
const E2: [f32; 4] = [0.1, 0.9, 0.1, 0.6];

fn config() -> AppConfig {
    let mut config = AppConfig::default();
    config.session.secret = Some("e2e-secret".into());
    config.sources.roles = vec![
        RoleSources {
            name: "auditor".into(),
            scopes: vec!["common".into(), "data-mart".into(), "personal".into()],
        },
        RoleSources {
            name: "analyst".into(),
            scopes: vec!["common".into(), "role-specific".into()],
        },
        RoleSources {
            name: "guest".into(),
            scopes: vec![],
        },
    ];
    config
}

fn assemble(config: &AppConfig, stores: Stores, provider: Arc<ScriptedProvider>) -> AppState {
    AppState::assemble(config, stores, Arc::new(RawFaces), provider.clone(), provider)
}

fn pairs(texts: &[&str]) -> Vec<(String, Vec<f32>)> {
    texts.iter().map(|t| (t.to_string(), topic_embedding(t))).collect()
}

// ── Scenarios ────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_face_login_then_chat_cites_personal_document() {
    let provider = Arc::new(ScriptedProvider::answering("Your policy requires approval for remote work."));
    let state = assemble(&config(), Stores::in_memory(), provider.clone());

    state.auth.register_embedding("u1", "User One", "auditor", E1.to_vec()).await.unwrap();

    let probe = [0.88, 0.12, 0.31, 0.19];
    let credential = state.auth.authenticate_embedding(&probe).await.unwrap();
    assert_eq!(credential.user_id, "u1");
    assert_eq!(credential.role, "auditor");

    state
        .ingestor
        .ingest_passages(
            &IngestTarget::Personal("u1".into()),
            "policy.txt",
            pairs(&["The remote work policy requires manager approval."]),
        )
        .await
        .unwrap();

    let response = state
        .engine
        .chat(&credential.token, "summarize my uploaded policy doc", &[])
        .await
        .unwrap();

    assert_eq!(response.cited_sources, vec!["personal:user_docs_u1/policy.txt"]);
    assert!(response.skipped_sources.is_empty());
    assert!(!response.configuration_gap);
    assert_eq!(response.answer, "Your policy requires approval for remote work.");

    let system = &provider.last_request().messages[0].content;
    assert!(system.contains("[personal:user_docs_u1/policy.txt] The remote work policy requires manager approval."));
}

#[tokio::test]
async fn e2e_probe_matches_its_own_identity_only() {
    let state = assemble(&config(), Stores::in_memory(), Arc::new(ScriptedProvider::answering("ok")));
    state.auth.register_embedding("a", "Alice", "auditor", E1.to_vec()).await.unwrap();
    state.auth.register_embedding("b", "Bob", "analyst", E2.to_vec()).await.unwrap();

    let a = state.auth.authenticate_embedding(&E1).await.unwrap();
    assert_eq!(a.user_id, "a");
    let b = state.auth.authenticate_embedding(&E2).await.unwrap();
    assert_eq!(b.user_id, "b");
    assert_eq!(b.role, "analyst");
}

#[tokio::test]
async fn e2e_one_offline_collection_is_skipped_and_flagged() {
    let config = config();
    let knowledge = Arc::new(OutageIndex {
        inner: InMemoryKnowledgeIndex::new(),
        offline: HashSet::from([config.sources.common_collection.clone()]),
    });
    let stores = Stores {
        identities: Arc::new(InMemoryIdentityStore::new()),
        knowledge,
    };
    let state = assemble(&config, stores, Arc::new(ScriptedProvider::answering("Revenue and policy summary.")));

    state.ingestor.ingest_passages(&IngestTarget::Common, "handbook", pairs(&["Holiday policy for staff."])).await.unwrap();
    state.ingestor.ingest_passages(&IngestTarget::DataMart, "q3", pairs(&["Q3 revenue grew."])).await.unwrap();
    state
        .ingestor
        .ingest_passages(&IngestTarget::Personal("u1".into()), "notes", pairs(&["My revenue policy notes."]))
        .await
        .unwrap();

    state.auth.register_embedding("u1", "User One", "auditor", E1.to_vec()).await.unwrap();
    let token = state.auth.authenticate_embedding(&E1).await.unwrap().token;

    let response = state.engine.chat(&token, "revenue policy", &[]).await.unwrap();

    let mut cited = response.cited_sources.clone();
    cited.sort();
    assert_eq!(cited, vec!["data-mart:data_mart_base/q3", "personal:user_docs_u1/notes"]);
    assert_eq!(response.skipped_sources.len(), 1);
    assert_eq!(response.skipped_sources[0].collection_id, "common_knowledge_base");
    assert_eq!(response.sources_used.len(), 3);
}

#[tokio::test]
async fn e2e_role_without_sources_answers_from_history() {
    let provider = Arc::new(ScriptedProvider::answering("As you said earlier, Friday."));
    let state = assemble(&config(), Stores::in_memory(), provider.clone());
    state.auth.register_embedding("g", "Guest", "guest", E2.to_vec()).await.unwrap();
    let token = state.auth.authenticate_embedding(&E2).await.unwrap().token;

    let history = vec![
        Message::user("The offsite is on Friday."),
        Message::assistant("Noted."),
    ];
    let response = state.engine.chat(&token, "When is the offsite?", &history).await.unwrap();

    assert!(response.configuration_gap);
    assert!(response.cited_sources.is_empty());
    assert_eq!(response.answer, "As you said earlier, Friday.");
    let sent = provider.last_request();
    assert!(sent.messages.iter().any(|m| m.content == "The offsite is on Friday."));
}

#[tokio::test]
async fn e2e_session_round_trip_and_expiry() {
    let state = assemble(&config(), Stores::in_memory(), Arc::new(ScriptedProvider::answering("ok")));
    state.auth.register_embedding("an", "Ana", "analyst", E2.to_vec()).await.unwrap();
    let credential = state.auth.authenticate_embedding(&E2).await.unwrap();

    let user = state.auth.validate(&credential.token).unwrap();
    assert_eq!(user.user_id, "an");
    assert_eq!(user.role, "analyst");

    let after_expiry = credential.expires_at.timestamp() + 1;
    assert_eq!(
        state.auth.validate_at(&credential.token, after_expiry).unwrap_err(),
        SessionError::Expired
    );
}

#[tokio::test]
async fn e2e_strict_logout_revokes_session() {
    let mut config = config();
    config.session.strict_logout = true;
    let state = assemble(&config, Stores::in_memory(), Arc::new(ScriptedProvider::answering("ok")));
    state.auth.register_embedding("u1", "User One", "auditor", E1.to_vec()).await.unwrap();
    let token = state.auth.authenticate_embedding(&E1).await.unwrap().token;

    state.auth.logout(&token).unwrap();
    let err = state.engine.chat(&token, "anything", &[]).await.unwrap_err();
    assert_eq!(err.code(), "session_revoked");
}

#[tokio::test]
async fn e2e_completion_outage_is_retryable() {
    let provider = Arc::new(ScriptedProvider {
        answer: String::new(),
        fail: true,
        requests: Mutex::new(Vec::new()),
    });
    let state = assemble(&config(), Stores::in_memory(), provider);
    state.auth.register_embedding("u1", "User One", "auditor", E1.to_vec()).await.unwrap();
    let token = state.auth.authenticate_embedding(&E1).await.unwrap().token;

    let err = state.engine.chat(&token, "anything", &[]).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(err.code(), "upstream_unavailable");
}

#[tokio::test]
async fn e2e_http_flow_over_sqlite() {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    let mut config = config();
    config.gateway.admin_key = Some("e2e-admin".into());
    let sqlite = Arc::new(SqliteStore::new("sqlite::memory:").await.unwrap());
    let stores = Stores {
        identities: sqlite.clone(),
        knowledge: sqlite,
    };
    let state = Arc::new(assemble(&config, stores, Arc::new(ScriptedProvider::answering("Approved travel only."))));
    let app = build_router(
        state,
        RouterLimits {
            body_limit_bytes: 1024 * 1024,
            requests_per_minute: 100,
        },
    );

    async fn call(app: &axum::Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null))
    }

    fn post(uri: &str, headers: &[(&str, &str)], body: serde_json::Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    let face = STANDARD.encode([200u8, 10, 60, 40]);
    let (status, _) = call(
        &app,
        post(
            "/admin/register_user",
            &[("X-Admin-Key", "e2e-admin")],
            serde_json::json!({"email": "u1", "name": "User One", "role": "auditor", "image": face}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, login) = call(&app, post("/user/login", &[], serde_json::json!({"image": face}))).await;
    assert_eq!(status, StatusCode::OK);
    let bearer = format!("Bearer {}", login["token"].as_str().unwrap());

    let (status, _) = call(
        &app,
        post(
            "/user/upload",
            &[("Authorization", bearer.as_str())],
            serde_json::json!({"filename": "travel.txt", "content": "Travel policy: approved trips only."}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, chat) = call(
        &app,
        post(
            "/user/chat",
            &[("Authorization", bearer.as_str())],
            serde_json::json!({"user_input": "summarize my uploaded policy doc"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(chat["answer"], "Approved travel only.");
    assert_eq!(chat["cited_sources"][0], "personal:user_docs_u1/travel.txt");
}
