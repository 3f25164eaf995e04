//! Relevance-filtered semantic search over a fixed document corpus.

use crate::embed::rank_by_similarity;
use crate::{Embedder, MemoryError};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A corpus document, scored when returned from a search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalDocument {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl RetrievalDocument {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            score: None,
        }
    }
}

/// Embedded corpus with nearest-neighbour search and a similarity cut-off.
pub struct RetrievalGateway {
    documents: Vec<(RetrievalDocument, Vec<f32>)>,
    embedder: Arc<dyn Embedder>,
    threshold: f32,
    top_k: usize,
}

impl RetrievalGateway {
    /// Embed the corpus once and build the gateway.
    pub async fn build(
        corpus: Vec<String>,
        embedder: Arc<dyn Embedder>,
        threshold: f32,
        top_k: usize,
    ) -> Result<Self, MemoryError> {
        let vectors = if corpus.is_empty() {
            Vec::new()
        } else {
            embedder.embed(corpus.clone()).await?
        };
        let documents = corpus
            .into_iter()
            .map(RetrievalDocument::new)
            .zip(vectors)
            .collect::<Vec<_>>();
        info!(
            "built retrieval corpus (documents={}, threshold={}, top_k={})",
            documents.len(),
            threshold,
            top_k
        );
        Ok(Self {
            documents,
            embedder,
            threshold,
            top_k,
        })
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Nearest documents to `query` that pass the similarity threshold.
    pub async fn search(&self, query: &str) -> Result<Vec<RetrievalDocument>, MemoryError> {
        if self.documents.is_empty() {
            return Ok(Vec::new());
        }
        let query_vector = self.embedder.embed_one(query).await?;
        let candidates = rank_by_similarity(
            &query_vector,
            self.documents
                .iter()
                .map(|(document, vector)| (document, vector.as_slice())),
            self.top_k,
        )
        .into_iter()
        .map(|(document, score)| RetrievalDocument {
            content: document.content.clone(),
            score: Some(score),
        })
        .collect::<Vec<_>>();
        let total = candidates.len();
        let kept = filter_documents(candidates, self.threshold);
        debug!(
            "knowledge search (candidates={}, kept={})",
            total,
            kept.len()
        );
        Ok(kept)
    }
}

/// Drop documents scoring below `threshold`, preserving order.
pub fn filter_documents(documents: Vec<RetrievalDocument>, threshold: f32) -> Vec<RetrievalDocument> {
    documents
        .into_iter()
        .filter(|document| document.score.is_some_and(|score| score >= threshold))
        .collect()
}
