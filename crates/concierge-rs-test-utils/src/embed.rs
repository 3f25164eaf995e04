use async_trait::async_trait;
use concierge_rs_memory::{Embedder, MemoryError};

/// Deterministic embedder with one dimension per keyword.
#[derive(Debug, Clone)]
pub struct KeywordEmbedder {
    keywords: Vec<String>,
}

impl KeywordEmbedder {
    pub fn new(keywords: &[&str]) -> Self {
        Self {
            keywords: keywords.iter().map(|kw| kw.to_string()).collect(),
        }
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let text = text.to_lowercase();
        self.keywords
            .iter()
            .map(|kw| if text.contains(kw.as_str()) { 1.0 } else { 0.0 })
            .collect()
    }
}

impl Default for KeywordEmbedder {
    fn default() -> Self {
        Self::new(&[
            "pizza", "shipping", "password", "return", "payment", "support", "store", "gift",
            "technical",
        ])
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, MemoryError> {
        Ok(texts.iter().map(|text| self.vector(text)).collect())
    }
}
