//! Merging per-collection results into one bounded, ranked context.
//!
//! # Determinism
//!
//! Composition is a pure function of its inputs: the pool is totally
//! ordered (score, then collection id, then passage id) and nothing depends
//! on time or randomness, so identical inputs serialize to identical bytes.

use crate::retriever::SkippedSource;
use mimir_config::{BudgetUnit, RetrievalConfig};
use mimir_core::knowledge::RetrievalResult;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Heuristic: 1 token ≈ 4 characters, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

#[derive(Debug, Clone, Serialize)]
pub struct ComposedContext {
    /// Retained passages, best first
    pub items: Vec<RetrievalResult>,
    pub consumed: usize,
    pub budget: usize,
    pub unit: BudgetUnit,
    pub duplicates_dropped: usize,
    /// Passages left out because the budget was reached
    pub truncated: usize,
    pub skipped_sources: Vec<SkippedSource>,
}

impl ComposedContext {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Distinct source labels in context order.
    pub fn source_labels(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.items
            .iter()
            .filter(|r| seen.insert(r.passage.source_label.as_str()))
            .map(|r| r.passage.source_label.clone())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct ContextComposer {
    budget: usize,
    unit: BudgetUnit,
    dedup_threshold: f32,
}

impl ContextComposer {
    pub fn new(budget: usize, unit: BudgetUnit, dedup_threshold: f32) -> Self {
        Self {
            budget,
            unit,
            dedup_threshold,
        }
    }

    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self::new(config.context_budget, config.budget_unit, config.dedup_threshold)
    }

    fn size(&self, text: &str) -> usize {
        match self.unit {
            BudgetUnit::Characters => text.chars().count(),
            BudgetUnit::Tokens => estimate_tokens(text),
        }
    }

    pub fn compose(&self, per_collection: &[Vec<RetrievalResult>], skipped: &[SkippedSource]) -> ComposedContext {
        let mut pool: Vec<&RetrievalResult> = per_collection.iter().flatten().collect();
        pool.sort_by(|a, b| pool_order(a, b));

        let mut kept_words: Vec<BTreeSet<String>> = Vec::new();
        let mut unique = Vec::with_capacity(pool.len());
        let mut duplicates_dropped = 0;
        for result in pool {
            let words = word_set(&result.passage.text);
            if kept_words.iter().any(|k| jaccard(k, &words) >= self.dedup_threshold) {
                duplicates_dropped += 1;
                continue;
            }
            kept_words.push(words);
            unique.push(result);
        }

        let mut items = Vec::new();
        let mut consumed = 0;
        let mut truncated = 0;
        for (i, result) in unique.iter().enumerate() {
            let size = self.size(&result.passage.text);
            if consumed + size > self.budget {
                truncated = unique.len() - i;
                break;
            }
            consumed += size;
            items.push((*result).clone());
        }

        ComposedContext {
            items,
            consumed,
            budget: self.budget,
            unit: self.unit,
            duplicates_dropped,
            truncated,
            skipped_sources: skipped.to_vec(),
        }
    }
}

fn pool_order(a: &RetrievalResult, b: &RetrievalResult) -> Ordering {
    b.similarity_score
        .total_cmp(&a.similarity_score)
        .then_with(|| a.collection_id.cmp(&b.collection_id))
        .then_with(|| a.passage.passage_id.cmp(&b.passage.passage_id))
}

fn word_set(text: &str) -> BTreeSet<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f32 {
    let union = a.union(b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(b).count() as f32 / union as f32
}
