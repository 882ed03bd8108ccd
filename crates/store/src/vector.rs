//! Vector similarity and ranking utilities.
//!
//! Pure-Rust implementations of:
//! - L2 normalisation and Euclidean distance (face matching)
//! - Cosine similarity and top-k ranking (passage retrieval)

use mimir_core::knowledge::{Passage, RetrievalResult};
use std::cmp::Ordering;

/// Scale a vector to unit length. Zero vectors are returned unchanged.
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let norm = v.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    if norm < 1e-10 {
        return v.to_vec();
    }
    v.iter().map(|x| ((*x as f64) / norm) as f32).collect()
}

/// Euclidean distance, or `None` when the dimensions differ.
pub fn l2_distance(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let sum: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = *x as f64 - *y as f64;
            d * d
        })
        .sum();
    Some(sum.sqrt() as f32)
}

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if either vector is zero-length or empty.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Descending score, then ascending passage id.
pub fn compare_results(a: &RetrievalResult, b: &RetrievalResult) -> Ordering {
    b.similarity_score
        .partial_cmp(&a.similarity_score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.passage.passage_id.cmp(&b.passage.passage_id))
}

/// Rank passages by cosine similarity to a query embedding and keep the top `k`.
///
/// Passages whose embedding dimension differs from the query are skipped.
pub fn rank_passages<'a>(
    passages: impl IntoIterator<Item = &'a Passage>,
    query_embedding: &[f32],
    k: usize,
) -> Vec<RetrievalResult> {
    let mut scored: Vec<RetrievalResult> = passages
        .into_iter()
        .filter(|p| p.embedding.len() == query_embedding.len())
        .map(|p| RetrievalResult {
            similarity_score: cosine_similarity(&p.embedding, query_embedding),
            collection_id: p.collection_id.clone(),
            passage: p.clone(),
        })
        .collect();

    scored.sort_by(compare_results);
    scored.truncate(k);
    scored
}

/// Serialize an embedding vector to little-endian bytes.
pub fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Inverse of [`embedding_to_blob`]; trailing partial floats are ignored.
pub fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
