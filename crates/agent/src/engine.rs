//! The chat pipeline: session → sources → retrieval → composition → answer.
//!
//! Each request walks the stages strictly forward and ends in `Answered` or
//! `Failed`. Only an unavailable source is recovered locally; a session or
//! completion failure ends the request.

use crate::composer::{ComposedContext, ContextComposer};
use crate::generator::AnswerGenerator;
use crate::retriever::{Retrieval, Retriever, SkippedSource};
use crate::sources::{SourceDescriptor, SourceRegistry};
use mimir_config::AppConfig;
use mimir_core::error::ChatError;
use mimir_core::knowledge::KnowledgeIndex;
use mimir_core::message::Message;
use mimir_core::provider::{EmbeddingRequest, Provider};
use mimir_core::session::AuthenticatedUser;
use mimir_security::AuthService;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum ChatStage {
    Authenticated,
    SourcesResolved,
    Retrieved { partial: bool },
    Composed,
    Answered,
    Failed,
}

impl ChatStage {
    fn rank(&self) -> u8 {
        match self {
            Self::Authenticated => 0,
            Self::SourcesResolved => 1,
            Self::Retrieved { .. } => 2,
            Self::Composed => 3,
            Self::Answered | Self::Failed => 4,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.rank() == 4
    }
}

/// Forward-only record of the stages one request passed through.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StageTrail(Vec<ChatStage>);

impl StageTrail {
    /// Ignores (and logs) any move that is not strictly forward.
    pub fn advance(&mut self, stage: ChatStage) {
        if let Some(last) = self.0.last() {
            if last.is_terminal() || stage.rank() <= last.rank() {
                warn!(from = ?last, to = ?stage, "Ignoring backward stage transition");
                return;
            }
        }
        self.0.push(stage);
    }

    pub fn current(&self) -> Option<ChatStage> {
        self.0.last().copied()
    }

    pub fn stages(&self) -> &[ChatStage] {
        &self.0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub answer: String,
    pub cited_sources: Vec<String>,
    pub skipped_sources: Vec<SkippedSource>,
    /// Collections resolved for the session
    pub sources_used: Vec<String>,
    /// The role enables no sources; the answer rests on history alone
    pub configuration_gap: bool,
    pub user_id: String,
    pub role: String,
    pub stages: StageTrail,
}

#[derive(Debug, Clone, Serialize)]
pub struct AvailableSources {
    pub user_role: String,
    pub sources: Vec<SourceDescriptor>,
}

pub struct ChatEngine {
    auth: Arc<AuthService>,
    registry: Arc<SourceRegistry>,
    retriever: Retriever,
    composer: ContextComposer,
    generator: AnswerGenerator,
    embedder: Arc<dyn Provider>,
    embedding_model: String,
}

impl std::fmt::Debug for ChatEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatEngine")
            .field("retriever", &self.retriever)
            .field("composer", &self.composer)
            .field("generator", &self.generator)
            .field("embedder", &self.embedder.name())
            .field("embedding_model", &self.embedding_model)
            .finish()
    }
}

impl ChatEngine {
    pub fn new(
        auth: Arc<AuthService>,
        registry: Arc<SourceRegistry>,
        retriever: Retriever,
        composer: ContextComposer,
        generator: AnswerGenerator,
        embedder: Arc<dyn Provider>,
        embedding_model: impl Into<String>,
    ) -> Self {
        Self {
            auth,
            registry,
            retriever,
            composer,
            generator,
            embedder,
            embedding_model: embedding_model.into(),
        }
    }

    pub fn from_config(
        config: &AppConfig,
        auth: Arc<AuthService>,
        registry: Arc<SourceRegistry>,
        index: Arc<dyn KnowledgeIndex>,
        completion: Arc<dyn Provider>,
        embedder: Arc<dyn Provider>,
    ) -> Self {
        Self::new(
            auth,
            registry,
            Retriever::from_config(index, &config.retrieval),
            ContextComposer::from_config(&config.retrieval),
            AnswerGenerator::new(completion, &config.completion),
            embedder,
            config.embedding.model.clone(),
        )
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    pub async fn chat(&self, token: &str, query: &str, history: &[Message]) -> Result<ChatResponse, ChatError> {
        let user = self.auth.validate(token)?;
        self.chat_as(&user, query, history).await
    }

    /// The pipeline for an already validated session.
    pub async fn chat_as(
        &self,
        user: &AuthenticatedUser,
        query: &str,
        history: &[Message],
    ) -> Result<ChatResponse, ChatError> {
        let mut stages = StageTrail::default();
        stages.advance(ChatStage::Authenticated);

        let sources = self.registry.resolve(&user.role, &user.user_id);
        let configuration_gap = sources.is_empty();
        if configuration_gap {
            debug!(role = %user.role, "Role enables no sources; answering from history");
        }
        stages.advance(ChatStage::SourcesResolved);

        let retrieval = if sources.is_empty() {
            Retrieval::default()
        } else {
            match self.embed_query(query).await {
                Ok(embedding) => self.retriever.retrieve_all(&sources, &embedding).await,
                Err(reason) => {
                    warn!(reason = %reason, "Query embedding failed; every source unavailable");
                    Retrieval::all_unavailable(&sources, &reason)
                }
            }
        };
        stages.advance(ChatStage::Retrieved {
            partial: retrieval.is_partial(),
        });

        let context: ComposedContext = self.composer.compose(&retrieval.result_sets(), &retrieval.skipped);
        stages.advance(ChatStage::Composed);

        let generated = match self.generator.generate(&user.role, &context, history, query).await {
            Ok(generated) => generated,
            Err(e) => {
                stages.advance(ChatStage::Failed);
                warn!(user_id = %user.user_id, stages = ?stages.stages(), error = %e, "Chat failed");
                return Err(e);
            }
        };
        stages.advance(ChatStage::Answered);

        info!(
            user_id = %user.user_id,
            role = %user.role,
            passages = context.items.len(),
            skipped = context.skipped_sources.len(),
            "Chat answered"
        );
        Ok(ChatResponse {
            answer: generated.answer,
            cited_sources: generated.cited_sources,
            skipped_sources: context.skipped_sources,
            sources_used: sources.into_iter().map(|s| s.collection_id).collect(),
            configuration_gap,
            user_id: user.user_id.clone(),
            role: user.role.clone(),
            stages,
        })
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, String> {
        let request = EmbeddingRequest {
            model: self.embedding_model.clone(),
            inputs: vec![query.to_string()],
        };
        match tokio::time::timeout(self.retriever.timeout(), self.embedder.embed(request)).await {
            Ok(Ok(response)) => response
                .embeddings
                .into_iter()
                .next()
                .filter(|e| !e.is_empty())
                .ok_or_else(|| "embedding service returned no vector".to_string()),
            Ok(Err(e)) => Err(format!("query embedding failed: {e}")),
            Err(_) => Err("query embedding timed out".to_string()),
        }
    }

    pub fn list_available_sources(&self, token: &str) -> Result<AvailableSources, ChatError> {
        let user = self.auth.validate(token)?;
        Ok(self.sources_for_user(&user))
    }

    pub fn sources_for_user(&self, user: &AuthenticatedUser) -> AvailableSources {
        AvailableSources {
            user_role: user.role.clone(),
            sources: self.registry.describe(&user.role),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use mimir_config::{RoleSources, SourcesConfig};
    use mimir_core::error::{ProviderError, SessionError};
    use mimir_core::knowledge::Passage;
    use mimir_store::InMemoryKnowledgeIndex;
    use std::time::Duration;

    fn sources_config() -> SourcesConfig {
        SourcesConfig {
            common_collection: "common_kb".into(),
            data_mart_collection: "mart".into(),
            roles: vec![
                RoleSources {
                    name: "analyst".into(),
                    scopes: vec!["common".into(), "data-mart".into(), "personal".into()],
                },
                RoleSources {
                    name: "guest".into(),
                    scopes: vec![],
                },
            ],
        }
    }

    struct Harness {
        engine: ChatEngine,
        auth: Arc<AuthService>,
        provider: Arc<ScriptedProvider>,
    }

    fn harness(index: Arc<dyn KnowledgeIndex>, provider: ScriptedProvider) -> Harness {
        let config = AppConfig::default();
        let provider = Arc::new(provider);
        let auth = auth_service(index.clone());
        let engine = ChatEngine::new(
            auth.clone(),
            Arc::new(SourceRegistry::new(&sources_config())),
            Retriever::new(index, 5, Duration::from_secs(1)),
            ContextComposer::from_config(&config.retrieval),
            AnswerGenerator::new(provider.clone(), &config.completion),
            provider.clone(),
            "test-embed",
        );
        Harness { engine, auth, provider }
    }

    async fn three_collections() -> Arc<InMemoryKnowledgeIndex> {
        seeded_index(vec![
            ("common_kb", vec!["revenue handbook chapter"]),
            ("mart", vec!["revenue metrics table"]),
            ("user_docs_u1", vec!["revenue notes personal"]),
        ])
        .await
    }

    #[tokio::test]
    async fn answers_with_citations_from_every_source() {
        let h = harness(three_collections().await, ScriptedProvider::answering("Revenue is up."));
        let token = login(&h.auth, "u1", "analyst", 0).await;

        let response = h.engine.chat(&token, "revenue", &[]).await.unwrap();
        assert_eq!(response.answer, "Revenue is up.");
        assert_eq!(response.cited_sources.len(), 3);
        assert!(response.skipped_sources.is_empty());
        assert_eq!(response.sources_used, vec!["common_kb", "mart", "user_docs_u1"]);
        assert!(!response.configuration_gap);
        assert_eq!(
            response.stages.stages(),
            &[
                ChatStage::Authenticated,
                ChatStage::SourcesResolved,
                ChatStage::Retrieved { partial: false },
                ChatStage::Composed,
                ChatStage::Answered,
            ]
        );
    }

    #[tokio::test]
    async fn one_of_three_unavailable_is_flagged_and_not_cited() {
        let index = Arc::new(FlakyIndex::new(three_collections().await).failing("mart"));
        let h = harness(index, ScriptedProvider::answering("Partial answer."));
        let token = login(&h.auth, "u1", "analyst", 0).await;

        let response = h.engine.chat(&token, "revenue", &[]).await.unwrap();
        let mut cited = response.cited_sources.clone();
        cited.sort();
        assert_eq!(cited, vec!["common_kb#0", "user_docs_u1#0"]);
        assert_eq!(response.skipped_sources.len(), 1);
        assert_eq!(response.skipped_sources[0].collection_id, "mart");
        assert!(response.stages.stages().contains(&ChatStage::Retrieved { partial: true }));
    }

    #[tokio::test]
    async fn empty_collections_answer_from_history_only() {
        let h = harness(seeded_index(vec![]).await, ScriptedProvider::answering("From our chat: blue."));
        let token = login(&h.auth, "u1", "analyst", 0).await;
        let history = vec![Message::user("my favourite colour is blue"), Message::assistant("Noted.")];

        let response = h.engine.chat(&token, "what is my favourite colour?", &history).await.unwrap();
        assert_eq!(response.answer, "From our chat: blue.");
        assert!(response.cited_sources.is_empty());
        assert!(response.skipped_sources.is_empty());

        let sent = &h.provider.requests()[0];
        assert_eq!(sent.messages.len(), 4);
        assert_eq!(sent.messages[1].content, "my favourite colour is blue");
    }

    #[tokio::test]
    async fn role_without_sources_is_a_configuration_gap() {
        let h = harness(three_collections().await, ScriptedProvider::answering("ok"));
        let token = login(&h.auth, "g1", "guest", 1).await;

        let response = h.engine.chat(&token, "revenue", &[]).await.unwrap();
        assert!(response.configuration_gap);
        assert!(response.sources_used.is_empty());
        assert!(response.cited_sources.is_empty());
    }

    #[tokio::test]
    async fn embedding_failure_degrades_to_all_sources_skipped() {
        let provider = ScriptedProvider::answering("no context").failing_embeddings(ProviderError::Network("down".into()));
        let h = harness(three_collections().await, provider);
        let token = login(&h.auth, "u1", "analyst", 0).await;

        let response = h.engine.chat(&token, "revenue", &[]).await.unwrap();
        assert_eq!(response.skipped_sources.len(), 3);
        assert!(response.cited_sources.is_empty());
    }

    #[tokio::test]
    async fn upstream_failure_is_retryable_error() {
        let provider = ScriptedProvider::new(vec![Err(ProviderError::Timeout("slow".into()))]);
        let h = harness(three_collections().await, provider);
        let token = login(&h.auth, "u1", "analyst", 0).await;

        let err = h.engine.chat(&token, "revenue", &[]).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.code(), "upstream_unavailable");
    }

    #[tokio::test]
    async fn bad_session_is_rejected_before_any_work() {
        let h = harness(three_collections().await, ScriptedProvider::new(vec![]));
        let err = h.engine.chat("not-a-token", "revenue", &[]).await.unwrap_err();
        assert!(matches!(err, ChatError::Session(SessionError::Invalid(_))));
        assert!(h.provider.requests().is_empty());
    }

    #[tokio::test]
    async fn personal_passage_added_mid_session_is_visible() {
        let index = three_collections().await;
        let h = harness(index.clone(), ScriptedProvider::new(vec![Ok("a".into()), Ok("b".into())]));
        let token = login(&h.auth, "u1", "analyst", 0).await;

        let before = h.engine.chat(&token, "travel policy", &[]).await.unwrap();
        index
            .append(
                "user_docs_u1",
                vec![Passage::new("user_docs_u1", "travel policy", embed_text("travel policy"), "personal:travel.txt")],
            )
            .await
            .unwrap();
        let after = h.engine.chat(&token, "travel policy", &[]).await.unwrap();

        assert!(!before.cited_sources.contains(&"personal:travel.txt".to_string()));
        assert_eq!(after.cited_sources[0], "personal:travel.txt");
    }

    #[tokio::test]
    async fn punctuation_twins_never_share_personal_documents() {
        let index = seeded_index(vec![]).await;
        let owner_collection = mimir_store::personal_collection("bob.smith@corp.com");
        index
            .append(
                &owner_collection,
                vec![Passage::new(
                    &owner_collection,
                    "secret salary letter",
                    embed_text("secret salary letter"),
                    "personal:salary.txt",
                )],
            )
            .await
            .unwrap();
        let h = harness(index, ScriptedProvider::new(vec![Ok("twin".into()), Ok("owner".into())]));

        let twin = login(&h.auth, "bob_smith@corp_com", "analyst", 0).await;
        let response = h.engine.chat(&twin, "secret salary letter", &[]).await.unwrap();
        assert!(response.cited_sources.is_empty());
        assert_ne!(response.sources_used[2], owner_collection);

        let owner = login(&h.auth, "bob.smith@corp.com", "analyst", 1).await;
        let response = h.engine.chat(&owner, "secret salary letter", &[]).await.unwrap();
        assert_eq!(response.cited_sources, vec!["personal:salary.txt"]);
    }

    #[tokio::test]
    async fn lists_sources_for_session_role() {
        let h = harness(three_collections().await, ScriptedProvider::new(vec![]));
        let token = login(&h.auth, "u1", "analyst", 0).await;

        let available = h.engine.list_available_sources(&token).unwrap();
        assert_eq!(available.user_role, "analyst");
        let labels: Vec<_> = available.sources.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["common_knowledge", "data_mart", "user_documents"]);
    }

    #[test]
    fn stage_trail_rejects_backward_moves() {
        let mut trail = StageTrail::default();
        trail.advance(ChatStage::Authenticated);
        trail.advance(ChatStage::Composed);
        trail.advance(ChatStage::SourcesResolved);
        trail.advance(ChatStage::Failed);
        trail.advance(ChatStage::Answered);
        assert_eq!(
            trail.stages(),
            &[ChatStage::Authenticated, ChatStage::Composed, ChatStage::Failed]
        );
        assert_eq!(trail.current(), Some(ChatStage::Failed));
    }
}
