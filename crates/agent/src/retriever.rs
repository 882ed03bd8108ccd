//! Per-collection similarity search, fanned out and joined.
//!
//! Every enabled collection is searched concurrently with its own timeout.
//! A collection that errors or times out is reported as unavailable; the
//! others are unaffected.

use crate::sources::ResolvedSource;
use futures::future::join_all;
use mimir_config::RetrievalConfig;
use mimir_core::error::SourceError;
use mimir_core::knowledge::{KnowledgeIndex, RetrievalResult};
use mimir_store::vector::compare_results;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Results for one collection.
#[derive(Debug, Clone, Serialize)]
pub struct SourceResults {
    pub source: ResolvedSource,
    pub results: Vec<RetrievalResult>,
}

/// A collection that could not be searched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedSource {
    pub collection_id: String,
    pub reason: String,
}

impl From<SourceError> for SkippedSource {
    fn from(error: SourceError) -> Self {
        match error {
            SourceError::SourceUnavailable { collection, reason } => Self {
                collection_id: collection,
                reason,
            },
        }
    }
}

/// The joined outcome of one fan-out, in source order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Retrieval {
    pub succeeded: Vec<SourceResults>,
    pub skipped: Vec<SkippedSource>,
}

impl Retrieval {
    pub fn is_partial(&self) -> bool {
        !self.skipped.is_empty()
    }

    /// Every source skipped for the same reason.
    pub fn all_unavailable(sources: &[ResolvedSource], reason: &str) -> Self {
        Self {
            succeeded: Vec::new(),
            skipped: sources
                .iter()
                .map(|s| SkippedSource {
                    collection_id: s.collection_id.clone(),
                    reason: reason.to_string(),
                })
                .collect(),
        }
    }

    pub fn result_sets(&self) -> Vec<Vec<RetrievalResult>> {
        self.succeeded.iter().map(|s| s.results.clone()).collect()
    }
}

#[derive(Clone)]
pub struct Retriever {
    index: Arc<dyn KnowledgeIndex>,
    top_k: usize,
    timeout: Duration,
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("index", &self.index.name())
            .field("top_k", &self.top_k)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Retriever {
    pub fn new(index: Arc<dyn KnowledgeIndex>, top_k: usize, timeout: Duration) -> Self {
        Self { index, top_k, timeout }
    }

    pub fn from_config(index: Arc<dyn KnowledgeIndex>, config: &RetrievalConfig) -> Self {
        Self::new(index, config.top_k, Duration::from_millis(config.timeout_ms))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Top `k` passages of one collection, best first. A missing collection
    /// yields an empty list.
    pub async fn retrieve(
        &self,
        collection_id: &str,
        query_embedding: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievalResult>, SourceError> {
        let unavailable = |reason: String| SourceError::SourceUnavailable {
            collection: collection_id.to_string(),
            reason,
        };

        let search = self.index.search(collection_id, query_embedding, k);
        let mut results = match tokio::time::timeout(self.timeout, search).await {
            Ok(Ok(results)) => results,
            Ok(Err(e)) => return Err(unavailable(e.to_string())),
            Err(_) => return Err(unavailable(format!("timed out after {}ms", self.timeout.as_millis()))),
        };
        results.sort_by(compare_results);
        results.truncate(k);
        Ok(results)
    }

    /// Search every source concurrently and wait for all of them.
    pub async fn retrieve_all(&self, sources: &[ResolvedSource], query_embedding: &[f32]) -> Retrieval {
        let searches = sources
            .iter()
            .map(|source| self.retrieve(&source.collection_id, query_embedding, self.top_k));
        let outcomes = join_all(searches).await;

        let mut retrieval = Retrieval::default();
        for (source, outcome) in sources.iter().zip(outcomes) {
            match outcome {
                Ok(results) => {
                    debug!(collection = %source.collection_id, hits = results.len(), "Collection searched");
                    retrieval.succeeded.push(SourceResults {
                        source: source.clone(),
                        results,
                    });
                }
                Err(e) => {
                    warn!(error = %e, "Skipping unavailable source");
                    retrieval.skipped.push(e.into());
                }
            }
        }
        retrieval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use mimir_core::knowledge::Scope;

    fn source(scope: Scope, id: &str) -> ResolvedSource {
        ResolvedSource {
            scope,
            collection_id: id.into(),
        }
    }

    #[tokio::test]
    async fn k_is_per_collection() {
        let index = seeded_index(vec![
            ("big", vec!["alpha one", "alpha two", "alpha three", "alpha four"]),
            ("small", vec!["alpha five"]),
        ])
        .await;
        let retriever = Retriever::new(index, 2, Duration::from_secs(1));
        let query = embed_text("alpha");

        let retrieval = retriever
            .retrieve_all(&[source(Scope::Common, "big"), source(Scope::Personal, "small")], &query)
            .await;
        assert_eq!(retrieval.succeeded[0].results.len(), 2);
        assert_eq!(retrieval.succeeded[1].results.len(), 1);
        assert!(!retrieval.is_partial());
    }

    #[tokio::test]
    async fn missing_collection_is_empty_not_error() {
        let index = seeded_index(vec![]).await;
        let retriever = Retriever::new(index, 5, Duration::from_secs(1));
        let results = retriever.retrieve("user_docs_nobody", &embed_text("x"), 5).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn results_are_best_first() {
        let index = seeded_index(vec![("c", vec!["gaming revenue", "holiday rota", "gaming revenue growth"])]).await;
        let retriever = Retriever::new(index, 3, Duration::from_secs(1));
        let results = retriever.retrieve("c", &embed_text("gaming revenue"), 3).await.unwrap();
        assert_eq!(results[0].passage.text, "gaming revenue");
        assert!(results.windows(2).all(|w| w[0].similarity_score >= w[1].similarity_score));
    }

    #[tokio::test]
    async fn failing_collection_is_skipped_others_kept() {
        let inner = seeded_index(vec![("a", vec!["alpha"]), ("b", vec!["alpha beta"]), ("c", vec!["alpha gamma"])]).await;
        let index = Arc::new(FlakyIndex::new(inner).failing("b"));
        let retriever = Retriever::new(index, 5, Duration::from_secs(1));
        let sources = [
            source(Scope::Common, "a"),
            source(Scope::DataMart, "b"),
            source(Scope::Personal, "c"),
        ];

        let retrieval = retriever.retrieve_all(&sources, &embed_text("alpha")).await;
        assert!(retrieval.is_partial());
        assert_eq!(retrieval.skipped.len(), 1);
        assert_eq!(retrieval.skipped[0].collection_id, "b");
        let ok: Vec<_> = retrieval.succeeded.iter().map(|s| s.source.collection_id.as_str()).collect();
        assert_eq!(ok, vec!["a", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_collection_times_out() {
        let inner = seeded_index(vec![("fast", vec!["alpha"]), ("slow", vec!["alpha"])]).await;
        let index = Arc::new(FlakyIndex::new(inner).slow("slow", Duration::from_secs(30)));
        let retriever = Retriever::new(index, 5, Duration::from_millis(100));

        let retrieval = retriever
            .retrieve_all(&[source(Scope::Common, "fast"), source(Scope::Common, "slow")], &embed_text("alpha"))
            .await;
        assert_eq!(retrieval.succeeded.len(), 1);
        assert!(retrieval.skipped[0].reason.contains("timed out"));
    }
}
