//! Text embedding interface and vector similarity.

use crate::MemoryError;
use async_trait::async_trait;
use autoagents_llm::LLMProvider;
use autoagents_llm::embedding::EmbeddingProvider;
use std::fmt;
use std::sync::Arc;

/// Turns texts into embedding vectors, one per input, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, MemoryError>;

    /// Embed a single text.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        self.embed(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| MemoryError::Embedding("embedder returned no vectors".to_string()))
    }
}

/// Embedder backed by an LLM provider's embedding endpoint.
#[derive(Clone)]
pub struct LlmEmbedder {
    provider: Arc<dyn LLMProvider>,
}

impl LlmEmbedder {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }
}

impl fmt::Debug for LlmEmbedder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmEmbedder").finish_non_exhaustive()
    }
}

#[async_trait]
impl Embedder for LlmEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, MemoryError> {
        let expected = texts.len();
        let vectors = self
            .provider
            .embed(texts)
            .await
            .map_err(|err| MemoryError::Embedding(err.to_string()))?;
        if vectors.len() != expected {
            return Err(MemoryError::Embedding(format!(
                "expected {expected} vectors, got {}",
                vectors.len()
            )));
        }
        Ok(vectors)
    }
}

/// Cosine similarity of two vectors; 0 when either is zero or lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Rank `(item, vector)` pairs against a query vector, highest first.
pub(crate) fn rank_by_similarity<'a, T>(
    query: &[f32],
    items: impl IntoIterator<Item = (&'a T, &'a [f32])>,
    limit: usize,
) -> Vec<(&'a T, f32)>
where
    T: 'a,
{
    let mut scored = items
        .into_iter()
        .map(|(item, vector)| (item, cosine_similarity(query, vector)))
        .collect::<Vec<_>>();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(limit);
    scored
}

#[cfg(test)]
mod tests {
    use super::{cosine_similarity, rank_by_similarity};
    use pretty_assertions::assert_eq;

    #[test]
    fn cosine_of_parallel_vectors_is_one() {
        let score = cosine_similarity(&[1.0, 2.0], &[2.0, 4.0]);
        assert!((score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_handles_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn ranking_orders_by_score_and_truncates() {
        let items = [
            ("far", vec![0.0, 1.0]),
            ("near", vec![1.0, 0.0]),
            ("mid", vec![1.0, 1.0]),
        ];
        let ranked = rank_by_similarity(
            &[1.0, 0.0],
            items.iter().map(|(name, vector)| (name, vector.as_slice())),
            2,
        );
        let names = ranked.iter().map(|(name, _)| **name).collect::<Vec<_>>();
        assert_eq!(names, vec!["near", "mid"]);
    }
}
